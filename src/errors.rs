use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for background removal.
///
/// Each variant carries the context of the step that failed (which file, which
/// operation), so callers can report failures without parsing strings.
/// A missing mask is not an error: see
/// [`BackgroundRemover::remove_background`](crate::BackgroundRemover::remove_background).
#[derive(Error, Debug)]
pub enum BgRemoveError {
    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, BgRemoveError>;

impl BgRemoveError {
    pub(crate) fn model<E>(operation: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Model {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// Renders the error together with its whole `source()` chain on one line.
    pub fn report(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Fallback for callsites without path context. Code that knows the path and
/// operation should build [`BgRemoveError::FileSystem`] directly.
impl From<std::io::Error> for BgRemoveError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for BgRemoveError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<ort::Error> for BgRemoveError {
    fn from(err: ort::Error) -> Self {
        Self::model("ort operation", err)
    }
}

/// Shape errors come out of tensor handling around inference, so they are
/// reported as model errors.
impl From<ndarray::ShapeError> for BgRemoveError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::model("tensor shape conversion", err)
    }
}
