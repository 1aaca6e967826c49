use std::path::{Path, PathBuf};

/// One volume of a subject: either a path waiting to be read or the
/// loaded data together with the path it came from.
///
/// The path is fixed when the subject is constructed and survives every
/// transition, so `free` can always restore the unloaded state.
#[derive(Debug, Clone)]
pub enum Slot<T> {
    Unloaded(Option<PathBuf>),
    Loaded { path: Option<PathBuf>, volume: T },
}

impl<T> Slot<T> {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self::Unloaded(path)
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Unloaded(path) | Self::Loaded { path, .. } => path.as_deref(),
        }
    }

    pub fn volume(&self) -> Option<&T> {
        match self {
            Self::Unloaded(_) => None,
            Self::Loaded { volume, .. } => Some(volume),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }

    fn take_path(&mut self) -> Option<PathBuf> {
        match std::mem::replace(self, Self::Unloaded(None)) {
            Self::Unloaded(path) | Self::Loaded { path, .. } => path,
        }
    }

    /// Store `volume`, replacing any previous one.
    pub(crate) fn set(&mut self, volume: T) {
        let path = self.take_path();
        *self = Self::Loaded { path, volume };
    }

    /// Drop the volume and keep the path.
    pub(crate) fn clear(&mut self) {
        let path = self.take_path();
        *self = Self::Unloaded(path);
    }
}
