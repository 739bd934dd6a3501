//! Usage accounting for the skymeter gateway
//!
//! The check-then-increment quota protocol. Every authentication attempt
//! runs as one SQLite IMMEDIATE transaction: load the account, reset the
//! counter if the stored date is stale, then conditionally increment with
//! `requests_today < limit` guarding the UPDATE itself. The writer lock is
//! held across the whole sequence, so two concurrent requests on the same
//! account can never both pass the check at `limit - 1` -- admissions within
//! a calendar day cannot exceed the plan ceiling, regardless of callers.
//!
//! Deny paths do not increment: a request at the ceiling returns the counter
//! unchanged and the account recovers fully at the next day rollover.
//!
//! Stale-date resets go through the single [`reset_usage`] primitive. The
//! read-only status path also triggers it (merely checking status after
//! midnight zeroes the counter); that policy is intentional and changing it
//! means changing one function.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use skymeter_core::{AccountStatus, GatewayError, Result};
use skymeter_storage::GatewayBackend;
use std::sync::Arc;
use tracing::debug;

use crate::plans::limit_for_on;

/// Quota metadata for an admitted request, used for response headers.
#[derive(Debug, Clone)]
pub struct QuotaCharge {
    pub plan: String,
    pub limit: i64,
    /// Requests admitted today, including this one
    pub used: i64,
}

impl QuotaCharge {
    pub fn remaining(&self) -> i64 {
        (self.limit - self.used).max(0)
    }
}

/// Reset the daily counter for a new calendar date.
///
/// Counter and date move together in one statement so a stale counter can
/// never survive under a fresh date. Every rollover in the system -- the
/// authentication path and the read-only status path alike -- goes through
/// here.
fn reset_usage(conn: &Connection, key: &str, today: NaiveDate) -> Result<()> {
    conn.execute(
        "UPDATE accounts SET requests_today = 0, usage_date = ?1 WHERE key = ?2",
        params![today, key],
    )?;
    Ok(())
}

/// The usage accounting engine. Sole writer of `requests_today` and
/// `usage_date`.
pub struct UsageLedger<B: GatewayBackend> {
    backend: Arc<B>,
}

impl<B: GatewayBackend> Clone for UsageLedger<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: GatewayBackend> UsageLedger<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Atomically check the caller's quota and count this request.
    ///
    /// Returns the charge on admission, `InvalidKey` for an unknown key,
    /// and `QuotaExceeded` (without counting) at or over the ceiling.
    pub fn check_and_count(&self, key: &str) -> Result<QuotaCharge> {
        self.check_and_count_on(key, Utc::now().date_naive())
    }

    /// [`check_and_count`](Self::check_and_count) with an injected calendar
    /// date, for rollover tests.
    pub fn check_and_count_on(&self, key: &str, today: NaiveDate) -> Result<QuotaCharge> {
        let mut conn = self.backend.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row: Option<(String, i64, NaiveDate)> = tx
            .query_row(
                "SELECT plan, requests_today, usage_date FROM accounts WHERE key = ?1",
                [key],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((plan, mut used, usage_date)) = row else {
            return Err(GatewayError::InvalidKey);
        };

        // Yesterday's count must not gate today's first request
        if usage_date != today {
            reset_usage(&tx, key, today)?;
            used = 0;
        }

        let limit = limit_for_on(&tx, &plan)?;

        // The guard in the UPDATE is what makes over-admission impossible
        // even if the preceding read went stale
        let admitted = tx.execute(
            "UPDATE accounts SET requests_today = requests_today + 1
             WHERE key = ?1 AND requests_today < ?2",
            params![key, limit],
        )? == 1;

        tx.commit()?;

        if admitted {
            Ok(QuotaCharge {
                plan,
                limit,
                used: used + 1,
            })
        } else {
            debug!(key, plan = %plan, limit, "request denied, daily limit reached");
            Err(GatewayError::QuotaExceeded { plan, limit })
        }
    }

    /// Read an account's quota position without counting a request.
    ///
    /// Still applies the stale-date reset before reporting, per the
    /// module-level policy note.
    pub fn status(&self, key: &str) -> Result<Option<AccountStatus>> {
        self.status_on(key, Utc::now().date_naive())
    }

    /// [`status`](Self::status) with an injected calendar date.
    pub fn status_on(&self, key: &str, today: NaiveDate) -> Result<Option<AccountStatus>> {
        let mut conn = self.backend.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row: Option<(String, String, i64, NaiveDate)> = tx
            .query_row(
                "SELECT email, plan, requests_today, usage_date FROM accounts WHERE key = ?1",
                [key],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;
        let Some((email, plan, mut used, usage_date)) = row else {
            return Ok(None);
        };

        if usage_date != today {
            reset_usage(&tx, key, today)?;
            used = 0;
        }

        let limit = limit_for_on(&tx, &plan)?;
        tx.commit()?;

        Ok(Some(AccountStatus {
            email,
            plan,
            requests_today: used,
            limit,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skymeter_storage::LocalSqliteBackend;
    use tempfile::NamedTempFile;

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn yesterday() -> NaiveDate {
        today().pred_opt().unwrap()
    }

    /// Backend with one account on a two-request 'Trial' plan plus the
    /// seeded Free/Pro plans.
    fn setup(key: &str, plan: &str, used: i64, date: NaiveDate) -> (NamedTempFile, Arc<LocalSqliteBackend>) {
        let temp = NamedTempFile::new().unwrap();
        let backend = Arc::new(LocalSqliteBackend::new(temp.path()));
        let conn = backend.get_connection().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO plans (name, daily_limit) VALUES ('Trial', 2)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO accounts (key, email, plan, requests_today, usage_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![key, format!("{key}@example.com"), plan, used, date, Utc::now()],
        )
        .unwrap();
        (temp, backend)
    }

    #[test]
    fn test_unknown_key() {
        let (_temp, backend) = setup("k1", "Trial", 0, today());
        let ledger = UsageLedger::new(backend);
        assert!(matches!(
            ledger.check_and_count("nope"),
            Err(GatewayError::InvalidKey)
        ));
    }

    #[test]
    fn test_boundary_at_limit() {
        let (_temp, backend) = setup("k1", "Trial", 1, today());
        let ledger = UsageLedger::new(Arc::clone(&backend));

        // limit - 1 used: this request is admitted and lands exactly on the limit
        let charge = ledger.check_and_count("k1").unwrap();
        assert_eq!(charge.used, 2);
        assert_eq!(charge.limit, 2);
        assert_eq!(charge.remaining(), 0);

        // The next request is denied and must not move the counter
        assert!(matches!(
            ledger.check_and_count("k1"),
            Err(GatewayError::QuotaExceeded { limit: 2, .. })
        ));
        let status = ledger.status("k1").unwrap().unwrap();
        assert_eq!(status.requests_today, 2);
    }

    #[test]
    fn test_deny_reports_plan_context() {
        let (_temp, backend) = setup("k1", "Trial", 2, today());
        let ledger = UsageLedger::new(backend);

        match ledger.check_and_count("k1") {
            Err(GatewayError::QuotaExceeded { plan, limit }) => {
                assert_eq!(plan, "Trial");
                assert_eq!(limit, 2);
            }
            other => panic!("expected QuotaExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_day_rollover_resets_before_evaluation() {
        // Exhausted yesterday; today's first request must pass
        let (_temp, backend) = setup("k1", "Trial", 2, yesterday());
        let ledger = UsageLedger::new(backend);

        let charge = ledger.check_and_count_on("k1", today()).unwrap();
        assert_eq!(charge.used, 1);

        let status = ledger.status_on("k1", today()).unwrap().unwrap();
        assert_eq!(status.requests_today, 1);
    }

    #[test]
    fn test_status_read_resets_stale_date() {
        // Flagged policy: a read-only status query after rollover zeroes
        // the counter even though no request was counted
        let (_temp, backend) = setup("k1", "Trial", 2, yesterday());
        let ledger = UsageLedger::new(Arc::clone(&backend));

        let status = ledger.status_on("k1", today()).unwrap().unwrap();
        assert_eq!(status.requests_today, 0);
        assert_eq!(status.limit, 2);

        let stored: (i64, NaiveDate) = backend
            .get_connection()
            .unwrap()
            .query_row(
                "SELECT requests_today, usage_date FROM accounts WHERE key = 'k1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(stored, (0, today()));
    }

    #[test]
    fn test_status_unknown_key() {
        let (_temp, backend) = setup("k1", "Trial", 0, today());
        let ledger = UsageLedger::new(backend);
        assert!(ledger.status("nope").unwrap().is_none());
    }

    #[test]
    fn test_unseeded_plan_uses_fallback_ceiling() {
        let (_temp, backend) = setup("k1", "Legacy", 0, today());
        let ledger = UsageLedger::new(backend);

        let charge = ledger.check_and_count("k1").unwrap();
        assert_eq!(charge.limit, crate::plans::DEFAULT_DAILY_LIMIT);
    }

    #[test]
    fn test_free_plan_concrete_scenario() {
        // Free limit = 1000, 999 used: one admission to exactly 1000, then deny
        let (_temp, backend) = setup("k1", "Free", 999, today());
        let ledger = UsageLedger::new(backend);

        let charge = ledger.check_and_count("k1").unwrap();
        assert_eq!(charge.used, 1000);

        assert!(matches!(
            ledger.check_and_count("k1"),
            Err(GatewayError::QuotaExceeded { limit: 1000, .. })
        ));
        let status = ledger.status("k1").unwrap().unwrap();
        assert_eq!(status.requests_today, 1000);
    }

    #[test]
    fn test_concurrent_admissions_never_exceed_limit() {
        let (_temp, backend) = setup("k1", "Trial", 0, today());
        let ledger = UsageLedger::new(backend);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || ledger.check_and_count("k1"))
            })
            .collect();

        let mut admitted = 0;
        let mut denied = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => admitted += 1,
                Err(GatewayError::QuotaExceeded { .. }) => denied += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(admitted, 2, "admissions must equal the plan limit exactly");
        assert_eq!(denied, 14);

        let status = ledger.status("k1").unwrap().unwrap();
        assert_eq!(status.requests_today, 2);
    }
}
