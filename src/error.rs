// ============================================================
// Library Error Type
// ============================================================
// Every fallible operation below the application layer returns
// Result<T, ReaderError>. Nothing is recovered locally: an error
// aborts the remaining pipeline and surfaces to the caller, which
// wraps it with anyhow context in Layers 1 and 2.

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::traits::ReaderState;

pub type Result<T> = std::result::Result<T, ReaderError>;

#[derive(Error, Debug)]
pub enum ReaderError {
    /// A dataset, embedding or checkpoint path does not exist.
    #[error("File not found: '{0}'")]
    FileNotFound(PathBuf),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed embedding file, dataset schema mismatch, bad span, etc.
    #[error("Format error in '{path}': {message}")]
    Format { path: PathBuf, message: String },

    /// Registry lookup with a name that no reader is registered under.
    #[error("Unknown reader '{name}' (known readers: {known})")]
    UnknownReader { name: String, known: String },

    /// An operation was invoked in the wrong lifecycle state,
    /// e.g. `train` before `setup`, or `setup` twice.
    #[error("Cannot {operation} a reader in state {state:?}")]
    SetupOrder { operation: &'static str, state: ReaderState },

    #[error("Loss diverged to {loss} at epoch {epoch}, iteration {iteration}")]
    NumericDivergence { epoch: usize, iteration: usize, loss: f64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cannot persist or restore model weights: {0}")]
    Persist(String),

    #[error("Tensor data error: {0}")]
    Tensor(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReaderError {
    /// Map an io::Error to FileNotFound when that is what it is.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            ReaderError::FileNotFound(path)
        } else {
            ReaderError::Io { path, source }
        }
    }

    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ReaderError::Format { path: path.into(), message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_io_error_becomes_file_not_found() {
        let err = ReaderError::io(
            "missing.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, ReaderError::FileNotFound(p) if p == PathBuf::from("missing.txt")));
    }

    #[test]
    fn test_other_io_errors_are_kept() {
        let err = ReaderError::io(
            "locked.txt",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, ReaderError::Io { .. }));
    }
}
