//! Skymeter Gateway Core
//!
//! Core types, error taxonomy, and SQLite schema for the skymeter weather
//! API gateway.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub mod validation;

/// A registered API-key holder with a plan and daily usage counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Opaque API key (32 hex characters). Immutable once issued; a key
    /// reset replaces the whole value and invalidates the old one.
    pub key: String,
    /// Contact email, unique per account
    pub email: String,
    /// Plan name. Validated against the known set at registration/upgrade,
    /// stored as text so an unseeded name degrades to the fallback ceiling
    /// instead of failing authentication.
    pub plan: String,
    /// Requests admitted on `usage_date`. Written only by the usage ledger.
    pub requests_today: i64,
    /// Calendar date `requests_today` applies to
    pub usage_date: NaiveDate,
    /// When the account was registered
    pub created_at: DateTime<Utc>,
}

/// A named tier with a daily request ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Unique plan name
    pub name: String,
    /// Positive daily request ceiling
    pub daily_limit: i64,
}

/// Read-only view of an account's quota position, as returned by the
/// status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountStatus {
    pub email: String,
    pub plan: String,
    pub requests_today: i64,
    pub limit: i64,
}

/// Errors that can occur in gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid API key")]
    InvalidKey,

    #[error("daily limit reached for plan '{plan}' ({limit} requests/day)")]
    QuotaExceeded { plan: String, limit: i64 },

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("invalid plan name: {0}")]
    InvalidPlan(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Initialize the SQLite schema for the gateway
///
/// Creates all necessary tables if they don't exist:
/// - `accounts`: API keys with plan and daily usage counter
/// - `plans`: plan catalog mapping plan name to daily ceiling
///
/// Plan seeding is idempotent, so calling this on every connection open is
/// safe. Accounts are never seeded here.
pub fn init_sqlite_schema(conn: &rusqlite::Connection) -> Result<()> {
    let ddl = r#"
    -- Registered API-key holders
    CREATE TABLE IF NOT EXISTS accounts (
      key TEXT PRIMARY KEY,
      email TEXT UNIQUE NOT NULL,
      plan TEXT NOT NULL DEFAULT 'Free',
      requests_today INTEGER NOT NULL DEFAULT 0 CHECK (requests_today >= 0),
      usage_date TEXT NOT NULL,
      created_at TEXT NOT NULL
    );

    -- Plan catalog: name -> daily request ceiling
    CREATE TABLE IF NOT EXISTS plans (
      name TEXT PRIMARY KEY,
      daily_limit INTEGER NOT NULL CHECK (daily_limit > 0)
    );

    INSERT OR IGNORE INTO plans (name, daily_limit) VALUES ('Free', 1000);
    INSERT OR IGNORE INTO plans (name, daily_limit) VALUES ('Pro', 10000);
    "#;

    conn.execute_batch(ddl)?;
    Ok(())
}
