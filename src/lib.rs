//! Civic Reports - citizen infrastructure issue reporting
//!
//! Citizens report infrastructure problems (potholes, broken signage, ...)
//! tied to a location. Every submission runs through a moderated pipeline
//! before anything is persisted.
//!
//! # How it works
//!
//! 1. The description is checked against an external content-safety API under
//!    a bounded retry/backoff/timeout policy; if the check cannot complete,
//!    the submission fails closed.
//! 2. An optional photo is validated (type, size) and stored under a
//!    generated name.
//! 3. The report row and a 10-point credit to the submitter's balance are
//!    written as one atomic unit - both or neither.
//! 4. A leaderboard ranks contributors by points with a deterministic
//!    tie-break (identifier ascending, then most recent activity).
//!
//! Two storage backends implement the same contract: embedded SQLite for
//! local use and tests, PostgreSQL for server deployments.

pub mod artifact;
pub mod config;
pub mod error;
pub mod leaderboard;
pub mod migrations;
pub mod models;
pub mod moderation;
pub mod pg_storage;
pub mod server;
pub mod storage;
pub mod submit;

pub use artifact::FsArtifactStore;
pub use error::{ArtifactError, ModerationError, StoreError, SubmitError};
pub use leaderboard::{LeaderboardService, DEFAULT_TOP_N};
pub use models::{
    ImageUpload, LeaderboardEntry, NewSubmission, PointsAccount, Report, ReportStatus,
};
pub use moderation::{ContentModeration, ModerationVerdict, OpenAiModeration, RetryPolicy};
pub use pg_storage::PgStorage;
pub use storage::{DateSort, ReportQuery, ReportStore, SqliteStorage, Visibility};
pub use submit::SubmitService;
