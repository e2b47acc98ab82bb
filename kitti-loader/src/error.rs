use lidar_ops::OpsError;
use std::path::PathBuf;

/// A failure to load one sample.
///
/// Sample failures never poison the loader. The producer recovers according
/// to the configured failure policy.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("sample '{tag}': {source}")]
    Io {
        tag: String,
        #[source]
        source: OpsError,
    },
    #[error("sample '{tag}': failed to decode '{}': {reason}", path.display())]
    Decode {
        tag: String,
        path: PathBuf,
        reason: String,
    },
    #[error("index {index} is out of range for {len} samples")]
    OutOfRange { index: usize, len: usize },
}

impl SampleError {
    pub fn from_ops(tag: &str, err: OpsError) -> Self {
        match err {
            OpsError::Decode { path, reason } => Self::Decode {
                tag: tag.to_owned(),
                path,
                reason,
            },
            err @ OpsError::Io { .. } => Self::Io {
                tag: tag.to_owned(),
                source: err,
            },
        }
    }
}
