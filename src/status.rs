//! Video lifecycle state machine
//!
//! Status is never assigned freely: every change goes through
//! [`VideoStatus::transition`], which rejects anything outside the allowed
//! edges. The happy path is uploaded -> queued -> processing -> processed.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Processing status of a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum VideoStatus {
    Uploaded,
    Queued,
    Processing,
    Processed,
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploaded => "uploaded",
            VideoStatus::Queued => "queued",
            VideoStatus::Processing => "processing",
            VideoStatus::Processed => "processed",
            VideoStatus::Failed => "failed",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "uploaded" => Some(VideoStatus::Uploaded),
            "queued" => Some(VideoStatus::Queued),
            "processing" => Some(VideoStatus::Processing),
            "processed" => Some(VideoStatus::Processed),
            "failed" => Some(VideoStatus::Failed),
            _ => None,
        }
    }

    /// Whether automatic processing is finished for this status.
    ///
    /// `processed` is terminal even when some resolutions failed: the
    /// pipeline does not re-attempt missing renditions on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Processed | VideoStatus::Failed)
    }

    /// Check whether a status change is allowed.
    pub fn can_transition(self, to: VideoStatus) -> bool {
        match (self, to) {
            // Enqueue after upload
            (VideoStatus::Uploaded, VideoStatus::Queued) => true,
            // Worker claims the job
            (VideoStatus::Queued, VideoStatus::Processing) => true,
            // At least one variant encoded
            (VideoStatus::Processing, VideoStatus::Processed) => true,
            // Zero variants encoded, or source unreadable
            (VideoStatus::Processing, VideoStatus::Failed) => true,
            // Lease expiry or transient encoder error puts the job back
            (VideoStatus::Processing, VideoStatus::Queued) => true,
            // Manual retry only
            (VideoStatus::Failed, VideoStatus::Queued) => true,
            _ => false,
        }
    }

    /// Validate and apply a status change.
    pub fn transition(self, to: VideoStatus) -> Result<VideoStatus, PipelineError> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(PipelineError::InvalidTransition { from: self, to })
        }
    }
}

impl std::fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const ALL: [VideoStatus; 5] = [
        VideoStatus::Uploaded,
        VideoStatus::Queued,
        VideoStatus::Processing,
        VideoStatus::Processed,
        VideoStatus::Failed,
    ];

    #[test]
    fn test_happy_path() {
        assert!(VideoStatus::Uploaded.can_transition(VideoStatus::Queued));
        assert!(VideoStatus::Queued.can_transition(VideoStatus::Processing));
        assert!(VideoStatus::Processing.can_transition(VideoStatus::Processed));
        assert!(VideoStatus::Processing.can_transition(VideoStatus::Failed));
    }

    #[test]
    fn test_requeue_paths() {
        // Manual retry from failed, lease/transient requeue from processing
        assert!(VideoStatus::Failed.can_transition(VideoStatus::Queued));
        assert!(VideoStatus::Processing.can_transition(VideoStatus::Queued));
    }

    #[test]
    fn test_no_skipping_states() {
        assert!(!VideoStatus::Uploaded.can_transition(VideoStatus::Processing));
        assert!(!VideoStatus::Uploaded.can_transition(VideoStatus::Processed));
        assert!(!VideoStatus::Queued.can_transition(VideoStatus::Processed));
        assert!(!VideoStatus::Queued.can_transition(VideoStatus::Failed));
    }

    #[test]
    fn test_processed_is_terminal() {
        for to in ALL {
            assert!(!VideoStatus::Processed.can_transition(to), "processed -> {to}");
        }
        assert!(VideoStatus::Processed.is_terminal());
        assert!(VideoStatus::Failed.is_terminal());
        assert!(!VideoStatus::Processing.is_terminal());
    }

    #[test]
    fn test_transition_error_carries_both_states() {
        let err = VideoStatus::Uploaded
            .transition(VideoStatus::Processed)
            .unwrap_err();
        assert_matches!(
            err,
            PipelineError::InvalidTransition {
                from: VideoStatus::Uploaded,
                to: VideoStatus::Processed,
            }
        );
    }

    #[test]
    fn test_label_round_trip() {
        for status in ALL {
            assert_eq!(VideoStatus::from_label(status.as_str()), Some(status));
        }
        assert_eq!(VideoStatus::from_label("pending"), None);
    }
}
