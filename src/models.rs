//! Domain types for reports, point balances, and the leaderboard projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum accepted description length, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 300;

/// Report lifecycle status. Moderation-approved submissions are stored as
/// `Approved` and immediately visible; `Pending`/`Rejected` belong to an
/// external review workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "Pending",
            ReportStatus::Approved => "Approved",
            ReportStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ReportStatus::Pending),
            "Approved" => Ok(ReportStatus::Approved),
            "Rejected" => Ok(ReportStatus::Rejected),
            other => Err(format!("unknown report status {other:?}")),
        }
    }
}

/// One user-submitted issue, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub description: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image_url: Option<String>,
}

/// A report about to be inserted; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub description: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image_url: Option<String>,
}

/// Per-submitter point balance; at most one row per submitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsAccount {
    pub user_id: String,
    pub current_points: i64,
    pub lifetime_points: i64,
    pub last_updated: DateTime<Utc>,
}

/// Derived leaderboard row; recomputed on every read, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub points: i64,
    pub updated_at: DateTime<Utc>,
}

/// Raw uploaded image as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Input to one submission attempt.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub description: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub user_id: String,
    pub photo: Option<ImageUpload>,
}

/// Form-level description check applied before the pipeline runs.
pub fn validate_description(description: &str) -> Result<(), String> {
    if description.trim().is_empty() {
        return Err("Please enter a description.".to_string());
    }
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(format!(
            "Description must be {MAX_DESCRIPTION_CHARS} characters or fewer."
        ));
    }
    Ok(())
}

/// Coordinate bounds check; either coordinate may be absent.
pub fn validate_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<(), String> {
    if let Some(lat) = latitude {
        if !(-90.0..=90.0).contains(&lat) {
            return Err("Latitude must be between -90 and 90.".to_string());
        }
    }
    if let Some(lon) = longitude {
        if !(-180.0..=180.0).contains(&lon) {
            return Err("Longitude must be between -180 and 180.".to_string());
        }
    }
    Ok(())
}
