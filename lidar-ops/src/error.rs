use std::{io, path::PathBuf};

pub type OpsResult<T> = Result<T, OpsError>;

/// Failures raised while reading or decoding a sample file.
#[derive(Debug, thiserror::Error)]
pub enum OpsError {
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode '{}': {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
}

impl OpsError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
