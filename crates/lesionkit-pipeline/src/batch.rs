//! Running one unit of work per subject.
//!
//! Subjects share nothing, so a batch is a plain map over the catalog,
//! sequential or on the rayon pool. With `fail_fast` the first error aborts
//! the batch; otherwise failures are collected and the batch continues.

use indicatif::{ParallelProgressIterator, ProgressBar, ProgressIterator, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info};

use crate::catalog::SubjectSpec;
use crate::error::Result;

/// How a batch walks its subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub parallel: bool,
    pub fail_fast: bool,
    /// Draw a progress bar on stderr.
    pub progress: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            fail_fast: true,
            progress: true,
        }
    }
}

impl BatchOptions {
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }
}

/// Something a batch can name in logs and failure reports.
pub trait BatchItem {
    fn id(&self) -> &str;
}

impl BatchItem for SubjectSpec {
    fn id(&self) -> &str {
        &self.name
    }
}

impl BatchItem for String {
    fn id(&self) -> &str {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectFailure {
    pub subject: String,
    pub error: String,
}

/// Outcome of a batch that did not abort.
#[derive(Debug)]
pub struct BatchSummary<T> {
    /// Results of the subjects that succeeded, in catalog order.
    pub results: Vec<T>,
    pub failures: Vec<SubjectFailure>,
}

impl<T> BatchSummary<T> {
    pub fn succeeded(&self) -> usize {
        self.results.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

fn progress_bar(len: usize, message: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.to_string());
    pb
}

/// Apply `task` to every item of `specs`.
pub fn run_batch<I, T, F>(name: &str, specs: &[I], options: BatchOptions, task: F) -> Result<BatchSummary<T>>
where
    I: BatchItem + Sync,
    T: Send,
    F: Fn(&I) -> Result<T> + Sync,
{
    info!(batch = name, subjects = specs.len(), parallel = options.parallel, "starting batch");
    let pb = progress_bar(specs.len(), name, options.progress);

    let run = |spec: &I| -> (String, Result<T>) {
        let outcome = task(spec);
        if let Err(err) = &outcome {
            error!(batch = name, subject = spec.id(), error = %err, "subject failed");
        }
        (spec.id().to_string(), outcome)
    };

    let outcomes: Vec<(String, Result<T>)> = if options.fail_fast {
        let tag = |(subject, outcome): (String, Result<T>)| outcome.map(|value| (subject, Ok(value)));
        if options.parallel {
            specs
                .par_iter()
                .progress_with(pb.clone())
                .map(|spec| tag(run(spec)))
                .collect::<Result<Vec<_>>>()?
        } else {
            specs
                .iter()
                .progress_with(pb.clone())
                .map(|spec| tag(run(spec)))
                .collect::<Result<Vec<_>>>()?
        }
    } else if options.parallel {
        specs.par_iter().progress_with(pb.clone()).map(run).collect()
    } else {
        specs.iter().progress_with(pb.clone()).map(run).collect()
    };
    pb.finish_and_clear();

    let mut summary = BatchSummary {
        results: Vec::with_capacity(outcomes.len()),
        failures: Vec::new(),
    };
    for (subject, outcome) in outcomes {
        match outcome {
            Ok(value) => summary.results.push(value),
            Err(err) => summary.failures.push(SubjectFailure {
                subject,
                error: err.to_string(),
            }),
        }
    }
    info!(
        batch = name,
        succeeded = summary.succeeded(),
        failed = summary.failures.len(),
        "batch finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{LabelSource, Modality};
    use crate::error::PipelineError;
    use std::path::PathBuf;

    fn specs(n: usize) -> Vec<SubjectSpec> {
        (0..n)
            .map(|i| SubjectSpec {
                name: format!("case{i:02}"),
                flair: PathBuf::from(format!("case{i:02}/flair.nii.gz")),
                dwi: PathBuf::from(format!("case{i:02}/dwi.nii.gz")),
                label: PathBuf::from(format!("case{i:02}/label.nii.gz")),
                bet_mask: None,
                label_source: LabelSource::Volume { modality: Modality::Flair },
                allow_empty_label: false,
            })
            .collect()
    }

    fn odd_fails(spec: &SubjectSpec) -> Result<usize> {
        let index: usize = spec.name[4..].parse().map_err(|_| PipelineError::precondition("bad name"))?;
        if index % 2 == 1 {
            Err(PipelineError::numerical(format!("odd subject {index}")))
        } else {
            Ok(index)
        }
    }

    fn quiet() -> BatchOptions {
        BatchOptions::default().with_progress(false)
    }

    #[test]
    fn test_fail_fast_aborts() {
        let err = run_batch("test", &specs(4), quiet(), odd_fails).unwrap_err();
        assert!(matches!(err, PipelineError::Numerical(_)));
    }

    #[test]
    fn test_collects_failures_when_not_fail_fast() {
        for parallel in [false, true] {
            let options = quiet().with_fail_fast(false).with_parallel(parallel);
            let summary = run_batch("test", &specs(5), options, odd_fails).unwrap();
            assert_eq!(summary.results, vec![0, 2, 4]);
            let failed: Vec<&str> = summary.failures.iter().map(|f| f.subject.as_str()).collect();
            assert_eq!(failed, vec!["case01", "case03"]);
            assert!(!summary.is_complete());
        }
    }

    #[test]
    fn test_parallel_keeps_catalog_order() {
        let options = quiet().with_parallel(true);
        let summary = run_batch("test", &specs(16), options, |spec| Ok(spec.name.clone())).unwrap();
        let expected: Vec<String> = (0..16).map(|i| format!("case{i:02}")).collect();
        assert_eq!(summary.results, expected);
        assert!(summary.is_complete());
    }
}
