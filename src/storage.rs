//! Embedded SQLite storage for reports and point balances
//!
//! Also defines the [`ReportStore`] contract shared with the PostgreSQL
//! backend. The submission write path is a single transaction: the report
//! insert and the point-balance upsert commit together or not at all.

use std::str::FromStr;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::error::StoreError;
use crate::migrations::Migrator;
use crate::models::{NewReport, PointsAccount, Report, ReportStatus};

/// Which rows a reports query may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Approved reports only.
    Public,
    /// Every report regardless of status.
    Admin,
}

/// Date ordering for the latest-reports query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateSort {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Filters for the latest-reports read.
#[derive(Debug, Clone)]
pub struct ReportQuery {
    pub visibility: Visibility,
    pub keyword: Option<String>,
    pub sort: DateSort,
}

impl ReportQuery {
    pub fn public() -> Self {
        Self {
            visibility: Visibility::Public,
            keyword: None,
            sort: DateSort::NewestFirst,
        }
    }

    pub fn admin() -> Self {
        Self {
            visibility: Visibility::Admin,
            keyword: None,
            sort: DateSort::NewestFirst,
        }
    }
}

/// Persistence contract implemented by both storage backends.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Atomically insert a report and credit the submitter's point balance.
    ///
    /// The point row is created on first use and incremented in place after
    /// that; `report.created_at` doubles as the balance's last-updated stamp.
    /// On any failure the whole unit rolls back and neither write is visible.
    async fn commit_submission(&self, report: NewReport, reward: i64) -> Result<i64, StoreError>;

    async fn report(&self, id: i64) -> Result<Option<Report>, StoreError>;

    async fn latest_reports(&self, query: ReportQuery) -> Result<Vec<Report>, StoreError>;

    async fn points_account(&self, user_id: &str) -> Result<Option<PointsAccount>, StoreError>;

    async fn points_accounts(&self) -> Result<Vec<PointsAccount>, StoreError>;
}

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn new(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        info!("SQLite storage ready");
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Migrator::new().run(&conn)
    }
}

#[async_trait]
impl ReportStore for SqliteStorage {
    async fn commit_submission(&self, report: NewReport, reward: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO reports (description, status, created_at, user_id, latitude, longitude, image_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                report.description,
                report.status.as_str(),
                report.created_at.to_rfc3339(),
                report.user_id,
                report.latitude,
                report.longitude,
                report.image_url,
            ],
        )?;
        let report_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO user_points (user_id, current_points, lifetime_points, last_updated)
             VALUES (?1, ?2, ?2, ?3)
             ON CONFLICT (user_id) DO UPDATE SET
                 current_points = current_points + excluded.current_points,
                 lifetime_points = lifetime_points + excluded.lifetime_points,
                 last_updated = excluded.last_updated",
            params![report.user_id, reward, report.created_at.to_rfc3339()],
        )?;

        tx.commit()?;
        Ok(report_id)
    }

    async fn report(&self, id: i64) -> Result<Option<Report>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let row = conn
            .query_row(
                "SELECT id, description, status, created_at, user_id, latitude, longitude, image_url
                 FROM reports WHERE id = ?1",
                params![id],
                raw_report,
            )
            .optional()?;

        row.map(RawReport::into_report).transpose()
    }

    async fn latest_reports(&self, query: ReportQuery) -> Result<Vec<Report>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from(
            "SELECT id, description, status, created_at, user_id, latitude, longitude, image_url FROM reports",
        );

        let mut conditions: Vec<String> = Vec::new();
        let mut args: Vec<String> = Vec::new();

        if query.visibility == Visibility::Public {
            args.push(ReportStatus::Approved.as_str().to_string());
            conditions.push(format!("status = ?{}", args.len()));
        }
        if let Some(keyword) = &query.keyword {
            args.push(format!("%{keyword}%"));
            conditions.push(format!("description LIKE ?{}", args.len()));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(match query.sort {
            DateSort::NewestFirst => " ORDER BY created_at DESC, id DESC",
            DateSort::OldestFirst => " ORDER BY created_at ASC, id ASC",
        });

        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> =
            args.iter().map(|a| a as &dyn rusqlite::ToSql).collect();
        let rows = stmt
            .query_map(&params[..], raw_report)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(RawReport::into_report).collect()
    }

    async fn points_account(&self, user_id: &str) -> Result<Option<PointsAccount>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let row = conn
            .query_row(
                "SELECT user_id, current_points, lifetime_points, last_updated
                 FROM user_points WHERE user_id = ?1",
                params![user_id],
                raw_account,
            )
            .optional()?;

        row.map(RawAccount::into_account).transpose()
    }

    async fn points_accounts(&self) -> Result<Vec<PointsAccount>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT user_id, current_points, lifetime_points, last_updated FROM user_points",
        )?;
        let rows = stmt
            .query_map([], raw_account)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(RawAccount::into_account).collect()
    }
}

/// Row image before status/timestamp decoding.
struct RawReport {
    id: i64,
    description: String,
    status: String,
    created_at: String,
    user_id: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    image_url: Option<String>,
}

impl RawReport {
    fn into_report(self) -> Result<Report, StoreError> {
        Ok(Report {
            id: self.id,
            description: self.description,
            status: ReportStatus::from_str(&self.status).map_err(StoreError::Corrupt)?,
            created_at: parse_timestamp(&self.created_at)?,
            user_id: self.user_id,
            latitude: self.latitude,
            longitude: self.longitude,
            image_url: self.image_url,
        })
    }
}

fn raw_report(row: &Row<'_>) -> rusqlite::Result<RawReport> {
    Ok(RawReport {
        id: row.get(0)?,
        description: row.get(1)?,
        status: row.get(2)?,
        created_at: row.get(3)?,
        user_id: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
        image_url: row.get(7)?,
    })
}

struct RawAccount {
    user_id: String,
    current_points: i64,
    lifetime_points: i64,
    last_updated: String,
}

impl RawAccount {
    fn into_account(self) -> Result<PointsAccount, StoreError> {
        Ok(PointsAccount {
            user_id: self.user_id,
            current_points: self.current_points,
            lifetime_points: self.lifetime_points,
            last_updated: parse_timestamp(&self.last_updated)?,
        })
    }
}

fn raw_account(row: &Row<'_>) -> rusqlite::Result<RawAccount> {
    Ok(RawAccount {
        user_id: row.get(0)?,
        current_points: row.get(1)?,
        lifetime_points: row.get(2)?,
        last_updated: row.get(3)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_report(user_id: &str, description: &str, at: DateTime<Utc>) -> NewReport {
        NewReport {
            description: description.to_string(),
            status: ReportStatus::Approved,
            created_at: at,
            user_id: user_id.to_string(),
            latitude: Some(45.52),
            longitude: Some(-122.68),
            image_url: None,
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn commit_inserts_report_and_creates_points_row() {
        let store = SqliteStorage::in_memory().unwrap();

        let id = store
            .commit_submission(new_report("alice", "pothole on 5th", ts(0)), 10)
            .await
            .unwrap();

        let report = store.report(id).await.unwrap().unwrap();
        assert_eq!(report.description, "pothole on 5th");
        assert_eq!(report.status, ReportStatus::Approved);
        assert_eq!(report.user_id, "alice");
        assert_eq!(report.latitude, Some(45.52));

        let account = store.points_account("alice").await.unwrap().unwrap();
        assert_eq!(account.current_points, 10);
        assert_eq!(account.lifetime_points, 10);
        assert_eq!(account.last_updated, ts(0));
    }

    #[tokio::test]
    async fn repeat_submissions_increment_the_same_row() {
        let store = SqliteStorage::in_memory().unwrap();

        let first = store
            .commit_submission(new_report("alice", "pothole", ts(0)), 10)
            .await
            .unwrap();
        let second = store
            .commit_submission(new_report("alice", "broken sign", ts(60)), 10)
            .await
            .unwrap();
        assert_ne!(first, second);

        let account = store.points_account("alice").await.unwrap().unwrap();
        assert_eq!(account.current_points, 20);
        assert_eq!(account.lifetime_points, 20);
        assert_eq!(account.last_updated, ts(60));

        assert_eq!(store.points_accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_partial_state() {
        let store = SqliteStorage::in_memory().unwrap();

        // Violates the non-empty description constraint inside the transaction.
        let result = store
            .commit_submission(new_report("alice", "", ts(0)), 10)
            .await;
        assert!(result.is_err());

        assert!(store.points_account("alice").await.unwrap().is_none());
        assert!(store
            .latest_reports(ReportQuery::admin())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn public_query_sees_approved_reports_only() {
        let store = SqliteStorage::in_memory().unwrap();

        store
            .commit_submission(new_report("alice", "approved pothole", ts(0)), 10)
            .await
            .unwrap();
        let mut pending = new_report("bob", "pending sinkhole", ts(10));
        pending.status = ReportStatus::Pending;
        store.commit_submission(pending, 10).await.unwrap();

        let public = store.latest_reports(ReportQuery::public()).await.unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].description, "approved pothole");

        let all = store.latest_reports(ReportQuery::admin()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn keyword_and_sort_shape_the_listing() {
        let store = SqliteStorage::in_memory().unwrap();

        store
            .commit_submission(new_report("alice", "pothole on 5th", ts(0)), 10)
            .await
            .unwrap();
        store
            .commit_submission(new_report("bob", "broken streetlight", ts(60)), 10)
            .await
            .unwrap();
        store
            .commit_submission(new_report("carol", "another pothole", ts(120)), 10)
            .await
            .unwrap();

        let newest = store.latest_reports(ReportQuery::public()).await.unwrap();
        assert_eq!(newest[0].description, "another pothole");
        assert_eq!(newest[2].description, "pothole on 5th");

        let oldest = store
            .latest_reports(ReportQuery {
                sort: DateSort::OldestFirst,
                ..ReportQuery::public()
            })
            .await
            .unwrap();
        assert_eq!(oldest[0].description, "pothole on 5th");

        let potholes = store
            .latest_reports(ReportQuery {
                keyword: Some("pothole".to_string()),
                ..ReportQuery::public()
            })
            .await
            .unwrap();
        assert_eq!(potholes.len(), 2);
    }

    #[tokio::test]
    async fn missing_rows_read_back_as_none() {
        let store = SqliteStorage::in_memory().unwrap();
        assert!(store.report(42).await.unwrap().is_none());
        assert!(store.points_account("nobody").await.unwrap().is_none());
        assert!(store.points_accounts().await.unwrap().is_empty());
    }
}
