use std::path::PathBuf;

use facegate_vision::VisionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("cannot decode image: {0}")]
    Image(#[from] image::ImageError),

    /// No encoding database at this path. Run enrollment first.
    #[error("encoding database not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("encoding database at {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("invalid identity folder name {0:?}")]
    InvalidIdentity(String),

    #[error("serializing encodings: {0}")]
    Serialize(#[from] postcard::Error),

    #[error(transparent)]
    Vision(#[from] VisionError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Caused by the caller's input rather than by this service.
    pub fn is_bad_input(&self) -> bool {
        matches!(self, Error::Base64(_) | Error::Image(_))
    }
}
