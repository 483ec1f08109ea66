//! Pipeline error taxonomy
//!
//! Typed errors for the operations callers need to branch on (duplicate
//! enqueue, guarded status transitions, encode failure classification).
//! Internal plumbing uses `anyhow` as elsewhere in the crate.

use thiserror::Error;
use uuid::Uuid;

use crate::status::VideoStatus;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// An active (queued or processing) job already exists for this video.
    #[error("an active transcode job already exists for video {0}")]
    DuplicateJob(Uuid),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: VideoStatus,
        to: VideoStatus,
    },

    #[error("video {0} not found")]
    VideoNotFound(Uuid),

    #[error("transcode job {0} not found")]
    JobNotFound(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// How an encode failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeErrorKind {
    /// The input is unreadable or invalid. No resolution can succeed and
    /// retrying will not help.
    SourceCorrupt,
    /// Infrastructure problem (encoder binary missing, disk full). The
    /// job should be requeued and tried again later.
    Transient,
    /// This one resolution failed to encode; others may still succeed.
    ResolutionFailed,
}

impl EncodeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodeErrorKind::SourceCorrupt => "source corrupt",
            EncodeErrorKind::Transient => "transient",
            EncodeErrorKind::ResolutionFailed => "resolution failed",
        }
    }
}

/// Failure reported by an encoder invocation.
#[derive(Debug, Error)]
#[error("encode failed ({}): {}", .kind.as_str(), .message)]
pub struct EncodeError {
    pub kind: EncodeErrorKind,
    pub message: String,
}

impl EncodeError {
    pub fn new(kind: EncodeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn source_corrupt(message: impl Into<String>) -> Self {
        Self::new(EncodeErrorKind::SourceCorrupt, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(EncodeErrorKind::Transient, message)
    }

    pub fn resolution_failed(message: impl Into<String>) -> Self {
        Self::new(EncodeErrorKind::ResolutionFailed, message)
    }
}
