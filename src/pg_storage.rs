//! PostgreSQL storage for reports and point balances
//!
//! Server-mode backend behind the same [`ReportStore`] contract as the
//! embedded SQLite store. Connects with DATABASE_URL and applies the embedded
//! schema migration on startup.

use anyhow::Result;
use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use tracing::info;

use crate::error::StoreError;
use crate::models::{NewReport, PointsAccount, Report, ReportStatus};
use crate::storage::{DateSort, ReportQuery, ReportStore, Visibility};

/// Database pool configuration
const DB_POOL_MAX_SIZE: usize = 20;
const DB_QUERY_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct PgStorage {
    pool: Pool,
}

impl PgStorage {
    /// Create storage from DATABASE_URL
    pub async fn new(database_url: &str) -> Result<Self> {
        use deadpool_postgres::{ManagerConfig, PoolConfig, RecyclingMethod};
        use std::time::Duration;

        let mut config = Config::new();
        config.url = Some(database_url.to_string());

        config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        config.pool = Some(PoolConfig {
            max_size: DB_POOL_MAX_SIZE,
            timeouts: deadpool_postgres::Timeouts {
                wait: Some(Duration::from_secs(DB_QUERY_TIMEOUT_SECS)),
                create: Some(Duration::from_secs(10)),
                recycle: Some(Duration::from_secs(30)),
            },
            ..Default::default()
        });

        let pool = config.create_pool(Some(Runtime::Tokio1), NoTls)?;

        // Test connection
        let client = pool.get().await?;
        client
            .execute(
                &format!("SET statement_timeout = '{}s'", DB_QUERY_TIMEOUT_SECS),
                &[],
            )
            .await?;

        info!(
            "Connected to PostgreSQL (pool_size: {}, query_timeout: {}s)",
            DB_POOL_MAX_SIZE, DB_QUERY_TIMEOUT_SECS
        );

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run embedded migrations
    async fn run_migrations(&self) -> Result<()> {
        let client = self.pool.get().await?;

        let exists: bool = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_name = 'schema_migrations')",
                &[],
            )
            .await?
            .get(0);

        if !exists {
            let migration_sql = include_str!("../migrations/001_schema.sql");
            client.batch_execute(migration_sql).await?;
            info!("Applied migration 001_schema");
        }

        Ok(())
    }
}

#[async_trait]
impl ReportStore for PgStorage {
    async fn commit_submission(&self, report: NewReport, reward: i64) -> Result<i64, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let status = report.status.as_str();
        let row = tx
            .query_one(
                "INSERT INTO reports (description, status, created_at, user_id, latitude, longitude, image_url)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 RETURNING id",
                &[
                    &report.description,
                    &status,
                    &report.created_at,
                    &report.user_id,
                    &report.latitude,
                    &report.longitude,
                    &report.image_url,
                ],
            )
            .await?;
        let report_id: i64 = row.get(0);

        tx.execute(
            "INSERT INTO user_points (user_id, current_points, lifetime_points, last_updated)
             VALUES ($1, $2, $2, $3)
             ON CONFLICT (user_id) DO UPDATE SET
                 current_points = user_points.current_points + EXCLUDED.current_points,
                 lifetime_points = user_points.lifetime_points + EXCLUDED.lifetime_points,
                 last_updated = EXCLUDED.last_updated",
            &[&report.user_id, &reward, &report.created_at],
        )
        .await?;

        tx.commit().await?;
        Ok(report_id)
    }

    async fn report(&self, id: i64) -> Result<Option<Report>, StoreError> {
        let client = self.pool.get().await?;

        let row = client
            .query_opt(
                "SELECT id, description, status, created_at, user_id, latitude, longitude, image_url
                 FROM reports WHERE id = $1",
                &[&id],
            )
            .await?;

        row.map(row_to_report).transpose()
    }

    async fn latest_reports(&self, query: ReportQuery) -> Result<Vec<Report>, StoreError> {
        let client = self.pool.get().await?;

        let mut sql = String::from(
            "SELECT id, description, status, created_at, user_id, latitude, longitude, image_url FROM reports",
        );

        let status = ReportStatus::Approved.as_str();
        let pattern = query.keyword.as_ref().map(|kw| format!("%{kw}%"));

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if query.visibility == Visibility::Public {
            params.push(&status);
            conditions.push(format!("status = ${}", params.len()));
        }
        if let Some(pattern) = &pattern {
            params.push(pattern);
            conditions.push(format!("description ILIKE ${}", params.len()));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(match query.sort {
            DateSort::NewestFirst => " ORDER BY created_at DESC, id DESC",
            DateSort::OldestFirst => " ORDER BY created_at ASC, id ASC",
        });

        let rows = client.query(sql.as_str(), &params).await?;
        rows.into_iter().map(row_to_report).collect()
    }

    async fn points_account(&self, user_id: &str) -> Result<Option<PointsAccount>, StoreError> {
        let client = self.pool.get().await?;

        let row = client
            .query_opt(
                "SELECT user_id, current_points, lifetime_points, last_updated
                 FROM user_points WHERE user_id = $1",
                &[&user_id],
            )
            .await?;

        Ok(row.map(row_to_account))
    }

    async fn points_accounts(&self) -> Result<Vec<PointsAccount>, StoreError> {
        let client = self.pool.get().await?;

        let rows = client
            .query(
                "SELECT user_id, current_points, lifetime_points, last_updated FROM user_points",
                &[],
            )
            .await?;

        Ok(rows.into_iter().map(row_to_account).collect())
    }
}

fn row_to_report(row: tokio_postgres::Row) -> Result<Report, StoreError> {
    let status: String = row.get(2);
    Ok(Report {
        id: row.get(0),
        description: row.get(1),
        status: status.parse::<ReportStatus>().map_err(StoreError::Corrupt)?,
        created_at: row.get(3),
        user_id: row.get(4),
        latitude: row.get(5),
        longitude: row.get(6),
        image_url: row.get(7),
    })
}

fn row_to_account(row: tokio_postgres::Row) -> PointsAccount {
    PointsAccount {
        user_id: row.get(0),
        current_points: row.get(1),
        lifetime_points: row.get(2),
        last_updated: row.get(3),
    }
}
