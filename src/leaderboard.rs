//! Leaderboard ranking over point balances.
//!
//! Every read recomputes a fresh projection; callers get an owned vector and
//! cannot affect other readers. Ordering is fully deterministic: points
//! descending, submitter ascending, last-updated descending.

use std::sync::Arc;

use crate::error::StoreError;
use crate::models::{LeaderboardEntry, PointsAccount};
use crate::storage::ReportStore;

/// Fallback size when the caller asks for a non-positive count.
pub const DEFAULT_TOP_N: usize = 25;

pub struct LeaderboardService {
    store: Arc<dyn ReportStore>,
}

impl LeaderboardService {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    /// Top `n` contributors; `n <= 0` falls back to the default of 25.
    pub async fn top(&self, n: i64) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let accounts = self.store.points_accounts().await?;
        Ok(rank(accounts, n))
    }
}

/// Rank point balances: points descending, then submitter identifier
/// ascending (case-insensitive, raw identifier between case-variants), then
/// last-updated descending as the final tie-break.
pub fn rank(accounts: Vec<PointsAccount>, n: i64) -> Vec<LeaderboardEntry> {
    let n = if n <= 0 { DEFAULT_TOP_N } else { n as usize };

    let mut entries: Vec<LeaderboardEntry> = accounts
        .into_iter()
        .map(|account| LeaderboardEntry {
            user_id: account.user_id,
            points: account.current_points,
            updated_at: account.last_updated,
        })
        .collect();

    entries.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| a.user_id.to_lowercase().cmp(&b.user_id.to_lowercase()))
            .then_with(|| a.user_id.cmp(&b.user_id))
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
    entries.truncate(n);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewReport, ReportStatus};
    use crate::storage::SqliteStorage;
    use chrono::{DateTime, TimeZone, Utc};

    fn account(user_id: &str, points: i64, updated_at: DateTime<Utc>) -> PointsAccount {
        PointsAccount {
            user_id: user_id.to_string(),
            current_points: points,
            lifetime_points: points,
            last_updated: updated_at,
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn ranks_by_points_then_name_then_recency() {
        let ranked = rank(
            vec![
                account("Briana", 50, ts(0)),
                account("alex", 50, ts(10)),
                account("Chris", 80, ts(5)),
            ],
            25,
        );

        assert_eq!(ranked[0].user_id, "Chris");
        assert_eq!(ranked[1].user_id, "alex");
        assert_eq!(ranked[2].user_id, "Briana");
    }

    #[test]
    fn name_tie_break_is_case_insensitive() {
        let ranked = rank(
            vec![account("bob", 50, ts(0)), account("Alice", 50, ts(0))],
            25,
        );
        assert_eq!(ranked[0].user_id, "Alice");
        assert_eq!(ranked[1].user_id, "bob");
    }

    #[test]
    fn equal_sort_keys_fall_back_to_newest_update() {
        let ranked = rank(
            vec![account("erin", 50, ts(0)), account("erin", 50, ts(100))],
            25,
        );
        assert_eq!(ranked[0].updated_at, ts(100));
        assert_eq!(ranked[1].updated_at, ts(0));
    }

    #[test]
    fn non_positive_n_uses_the_default() {
        let accounts: Vec<PointsAccount> =
            (0..40).map(|i| account(&format!("user{i:02}"), i, ts(i))).collect();

        assert_eq!(rank(accounts.clone(), 0).len(), DEFAULT_TOP_N);
        assert_eq!(rank(accounts.clone(), -3).len(), DEFAULT_TOP_N);
        assert_eq!(rank(accounts.clone(), 10).len(), 10);
        assert_eq!(rank(accounts, 100).len(), 40);
    }

    #[test]
    fn ranking_is_idempotent() {
        let accounts = vec![
            account("dana", 30, ts(0)),
            account("erin", 30, ts(50)),
            account("frank", 90, ts(25)),
        ];
        assert_eq!(rank(accounts.clone(), 25), rank(accounts, 25));
    }

    #[test]
    fn service_reads_fresh_projection_per_call() {
        let store = Arc::new(SqliteStorage::in_memory().unwrap());
        let service = LeaderboardService::new(store.clone());

        let report = NewReport {
            description: "cracked curb".to_string(),
            status: ReportStatus::Approved,
            created_at: ts(0),
            user_id: "erin".to_string(),
            latitude: None,
            longitude: None,
            image_url: None,
        };
        tokio_test::block_on(store.commit_submission(report, 10)).unwrap();

        let first = tokio_test::block_on(service.top(25)).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].points, 10);

        let report = NewReport {
            description: "missing sign".to_string(),
            status: ReportStatus::Approved,
            created_at: ts(60),
            user_id: "erin".to_string(),
            latitude: None,
            longitude: None,
            image_url: None,
        };
        tokio_test::block_on(store.commit_submission(report, 10)).unwrap();

        let second = tokio_test::block_on(service.top(25)).unwrap();
        assert_eq!(second[0].points, 20);
        // The earlier projection is untouched.
        assert_eq!(first[0].points, 10);
    }
}
