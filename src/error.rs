//! Error types for the submission pipeline.

use thiserror::Error;

/// Failure modes of the moderation gateway.
///
/// Every variant is terminal for the call that produced it; the submission
/// pipeline treats all of them as "moderation unavailable" and fails closed.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("moderation credential is not configured")]
    MissingCredential,

    #[error("moderation deadline exceeded")]
    DeadlineExceeded,

    #[error("moderation retries exhausted (last status {status})")]
    RetriesExhausted { status: u16 },

    #[error("moderation request failed: {status}. Body: {body}")]
    Terminal { status: u16, body: String },

    #[error("malformed moderation response: {0}")]
    MalformedResponse(String),

    #[error("moderation transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Upload validation and storage failures.
///
/// Display strings are user-facing; the coordinator surfaces them verbatim.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Only JPG, PNG, or WEBP images are allowed.")]
    Extension,

    #[error("Image must be 5MB or smaller.")]
    TooLarge,

    #[error("Failed to store the uploaded image.")]
    Io(#[from] std::io::Error),
}

impl ArtifactError {
    /// Short machine-readable label for the violated rule.
    pub fn reason(&self) -> &'static str {
        match self {
            ArtifactError::Extension => "extension",
            ArtifactError::TooLarge => "size",
            ArtifactError::Io(_) => "storage",
        }
    }
}

/// Persistence failures from either storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

/// Outcome taxonomy of a submission attempt.
///
/// One variant per user-distinguishable failure; success is the committed
/// report id. Lower-level error types never cross this boundary, and the
/// Display strings are the messages shown to submitters.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Moderation service is unavailable. Please try again in a moment.")]
    ModerationUnavailable,

    #[error("Your description contains unsafe content and cannot be submitted.")]
    ContentRejected { category: Option<String> },

    #[error(transparent)]
    ArtifactInvalid(#[from] ArtifactError),

    #[error("Something went wrong saving your report. Please try again.")]
    PersistenceFailed,
}

impl SubmitError {
    /// Stable label for logs and API responses.
    pub fn outcome(&self) -> &'static str {
        match self {
            SubmitError::ModerationUnavailable => "moderation_unavailable",
            SubmitError::ContentRejected { .. } => "content_rejected",
            SubmitError::ArtifactInvalid(_) => "artifact_invalid",
            SubmitError::PersistenceFailed => "persistence_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_reasons_are_stable() {
        assert_eq!(ArtifactError::Extension.reason(), "extension");
        assert_eq!(ArtifactError::TooLarge.reason(), "size");
    }

    #[test]
    fn submit_error_messages_are_user_facing() {
        let rejected = SubmitError::ContentRejected {
            category: Some("harassment".to_string()),
        };
        assert!(rejected.to_string().contains("unsafe content"));

        let unavailable = SubmitError::ModerationUnavailable;
        assert!(unavailable.to_string().contains("try again"));

        let invalid: SubmitError = ArtifactError::TooLarge.into();
        assert_eq!(invalid.to_string(), "Image must be 5MB or smaller.");
        assert_eq!(invalid.outcome(), "artifact_invalid");
    }
}
