//! Per-subject units that can run in a child process.
//!
//! With [`IsolationPolicy::ChildProcess`] the current executable is started
//! again as `<exe> worker <task-json>`; the child runs [`serve`] and prints a
//! single JSON reply as the last line of its standard output. Everything
//! the child allocates is returned to the system when it exits.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use burn::tensor::backend::Backend;
use lesionkit_registration::{AntsCliEngine, TransformPaths};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::SubjectSpec;
use crate::config::IsolationPolicy;
use crate::drivers::{registration, similarity};
use crate::error::{PipelineError, Result};
use crate::report::SimilarityRow;

/// Subcommand the CLI reserves for worker children.
pub const WORKER_SUBCOMMAND: &str = "worker";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum WorkerTask {
    /// Estimate and persist the transforms of one subject.
    Register {
        subject: SubjectSpec,
        template: PathBuf,
        engine: AntsCliEngine,
    },
    /// DWI-DWI and DWI-FLAIR similarity of one subject.
    Similarity { subject: SubjectSpec, dataset: String },
}

impl WorkerTask {
    pub fn subject(&self) -> &str {
        match self {
            Self::Register { subject, .. } | Self::Similarity { subject, .. } => &subject.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerOutput {
    Registered(TransformPaths),
    Similarity(Vec<SimilarityRow>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerReply {
    Ok(WorkerOutput),
    Err(String),
}

/// Run `task` in this process.
pub fn execute<B: Backend>(task: &WorkerTask, device: &B::Device) -> Result<WorkerOutput> {
    match task {
        WorkerTask::Register {
            subject,
            template,
            engine,
        } => {
            let template = lesionkit_io::read_nifti::<B, _>(template, device)?;
            let paths = registration::register_subject::<B, _>(subject, &template, engine, device)?;
            Ok(WorkerOutput::Registered(paths))
        }
        WorkerTask::Similarity { subject, dataset } => {
            let rows = similarity::measure_subject::<B>(subject, dataset, device)?;
            Ok(WorkerOutput::Similarity(rows))
        }
    }
}

/// Entry point of a worker child: decode, execute, encode the reply.
pub fn serve<B: Backend>(payload: &str, device: &B::Device) -> String {
    let reply = match serde_json::from_str::<WorkerTask>(payload) {
        Ok(task) => match execute::<B>(&task, device) {
            Ok(output) => WorkerReply::Ok(output),
            Err(err) => WorkerReply::Err(err.to_string()),
        },
        Err(err) => WorkerReply::Err(format!("invalid worker task: {err}")),
    };
    serde_json::to_string(&reply).unwrap_or_else(|err| format!(r#"{{"err":"{err}"}}"#))
}

fn spawn(task: &WorkerTask) -> Result<WorkerOutput> {
    let exe = std::env::current_exe()?;
    let payload = serde_json::to_string(task)?;
    debug!(subject = task.subject(), exe = %exe.display(), "spawning worker");

    let output = Command::new(&exe)
        .arg(WORKER_SUBCOMMAND)
        .arg(&payload)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let reply = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| {
            PipelineError::worker(format!(
                "worker for {} exited with {} without a reply",
                task.subject(),
                output.status
            ))
        })?;
    match serde_json::from_str::<WorkerReply>(reply) {
        Ok(WorkerReply::Ok(output)) => Ok(output),
        Ok(WorkerReply::Err(msg)) => Err(PipelineError::worker(format!("{}: {msg}", task.subject()))),
        Err(err) => Err(PipelineError::worker(format!(
            "worker for {} exited with {}: unreadable reply ({err})",
            task.subject(),
            output.status
        ))),
    }
}

/// Run `task` under `isolation`.
pub fn dispatch<B: Backend>(task: &WorkerTask, isolation: IsolationPolicy, device: &B::Device) -> Result<WorkerOutput> {
    match isolation {
        IsolationPolicy::InProcess => execute::<B>(task, device),
        IsolationPolicy::ChildProcess => spawn(task),
    }
}
