//! Plan catalog for the skymeter gateway
//!
//! Maps plan names to daily request ceilings. Lookup misses resolve to
//! [`DEFAULT_DAILY_LIMIT`] instead of failing: a corrupted or unseeded plan
//! name on a stored account must never hard-fail authentication.

use rusqlite::{Connection, OptionalExtension};
use skymeter_core::{Plan, Result};
use skymeter_storage::GatewayBackend;
use std::sync::Arc;

/// Ceiling applied when a plan name has no row in the catalog.
///
/// Deliberate leniency policy, not an accident of null handling.
pub const DEFAULT_DAILY_LIMIT: i64 = 1000;

/// Resolve the daily ceiling for `plan` on an existing connection.
///
/// Used by the usage ledger inside its transaction so the fallback policy
/// lives in exactly one place.
pub(crate) fn limit_for_on(conn: &Connection, plan: &str) -> Result<i64> {
    let limit: Option<i64> = conn
        .query_row(
            "SELECT daily_limit FROM plans WHERE name = ?1",
            [plan],
            |row| row.get(0),
        )
        .optional()?;
    Ok(limit.unwrap_or(DEFAULT_DAILY_LIMIT))
}

/// Catalog of plans, backed by the injected gateway backend.
pub struct PlanCatalog<B: GatewayBackend> {
    backend: Arc<B>,
}

impl<B: GatewayBackend> Clone for PlanCatalog<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: GatewayBackend> PlanCatalog<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Daily request ceiling for `plan`, falling back to
    /// [`DEFAULT_DAILY_LIMIT`] for unknown names.
    pub fn limit_for(&self, plan: &str) -> Result<i64> {
        let conn = self.backend.get_connection()?;
        limit_for_on(&conn, plan)
    }

    /// List all configured plans
    pub fn list(&self) -> Result<Vec<Plan>> {
        let conn = self.backend.get_connection()?;
        let mut stmt = conn.prepare("SELECT name, daily_limit FROM plans ORDER BY daily_limit")?;
        let plans = stmt
            .query_map([], |row| {
                Ok(Plan {
                    name: row.get(0)?,
                    daily_limit: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(plans)
    }
}
