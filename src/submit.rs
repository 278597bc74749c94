//! Submission pipeline
//!
//! The single state machine governing "can this report be published, and if
//! so, record it and reward its author - entirely or not at all". Steps run
//! strictly in order: moderation gate, artifact staging, atomic commit. A step
//! that fails stops the pipeline; later steps never run.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::artifact::FsArtifactStore;
use crate::error::SubmitError;
use crate::models::{NewReport, NewSubmission, ReportStatus};
use crate::moderation::ContentModeration;
use crate::storage::ReportStore;

pub struct SubmitService {
    moderation: Arc<dyn ContentModeration>,
    artifacts: FsArtifactStore,
    store: Arc<dyn ReportStore>,
    reward: i64,
}

impl SubmitService {
    pub fn new(
        moderation: Arc<dyn ContentModeration>,
        artifacts: FsArtifactStore,
        store: Arc<dyn ReportStore>,
        reward: i64,
    ) -> Self {
        Self {
            moderation,
            artifacts,
            store,
            reward,
        }
    }

    /// Points credited per accepted report.
    pub fn reward(&self) -> i64 {
        self.reward
    }

    /// Run one submission through the pipeline.
    ///
    /// Every failure maps to one `SubmitError` variant; collaborator error
    /// types never cross this boundary. Success returns the new report's id.
    pub async fn submit(&self, submission: NewSubmission) -> Result<i64, SubmitError> {
        // Gate: never publish content the moderation service flagged, or that
        // it could not be reached to classify.
        let verdict = match self.moderation.check(&submission.description).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(error = %e, "moderation unavailable, failing closed");
                return Err(SubmitError::ModerationUnavailable);
            }
        };

        if !verdict.allowed {
            info!(
                user_id = %submission.user_id,
                category = verdict.category.as_deref().unwrap_or("unspecified"),
                "submission rejected by moderation"
            );
            return Err(SubmitError::ContentRejected {
                category: verdict.category,
            });
        }

        // Stage: save the upload only after moderation passed. The file lands
        // on disk before the transaction opens, so a commit failure below can
        // leave it unreferenced.
        let mut image_url = None;
        if let Some(photo) = submission.photo.as_ref().filter(|p| !p.bytes.is_empty()) {
            image_url = Some(self.artifacts.save(photo).await?);
        }

        // Commit: report insert and point credit as one unit.
        let report = NewReport {
            description: submission.description,
            status: ReportStatus::Approved,
            created_at: Utc::now(),
            user_id: submission.user_id,
            latitude: submission.latitude,
            longitude: submission.longitude,
            image_url: image_url.clone(),
        };

        match self.store.commit_submission(report, self.reward).await {
            Ok(report_id) => {
                info!(report_id, reward = self.reward, "report committed");
                Ok(report_id)
            }
            Err(e) => {
                match &image_url {
                    Some(path) => warn!(
                        error = %e,
                        artifact = %path,
                        "commit failed after artifact staging; stored file is unreferenced"
                    ),
                    None => warn!(error = %e, "commit failed"),
                }
                Err(SubmitError::PersistenceFailed)
            }
        }
    }
}
