//! Authentication gate for the skymeter gateway
//!
//! Request-time entry point composing the account store, plan catalog, and
//! usage ledger into a single allow/deny decision. On success the request
//! has already been counted -- the side effect is not deferred.
//!
//! # Resolution
//!
//! Callers present the API key either as the `api_key` query parameter or
//! in the `X-Api-Key` header. The header wins when both are present.

use axum::http::HeaderMap;
use skymeter_core::{AccountStatus, GatewayError, Result};
use skymeter_storage::GatewayBackend;
use std::sync::Arc;
use tracing::debug;

use crate::usage::UsageLedger;

/// Header name for the API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Proof of a successful, already-counted authentication.
#[derive(Debug, Clone)]
pub struct AuthorizedKey {
    pub key: String,
    pub plan: String,
    pub limit: i64,
    /// Requests admitted today, including this one
    pub used: i64,
}

impl AuthorizedKey {
    pub fn remaining(&self) -> i64 {
        (self.limit - self.used).max(0)
    }
}

/// Extract the caller's API key from header or query parameter.
pub fn extract_api_key(headers: &HeaderMap, query_key: Option<&str>) -> Option<String> {
    if let Some(value) = headers.get(API_KEY_HEADER) {
        if let Ok(key) = value.to_str() {
            let key = key.trim();
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }
    }

    query_key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

/// The authentication gate.
pub struct AuthGate<B: GatewayBackend> {
    ledger: UsageLedger<B>,
}

impl<B: GatewayBackend> Clone for AuthGate<B> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
        }
    }
}

impl<B: GatewayBackend> AuthGate<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            ledger: UsageLedger::new(backend),
        }
    }

    /// Authenticate a key and count the request.
    ///
    /// Fails with `InvalidKey` when no account matches, `QuotaExceeded`
    /// when the ledger denies, and propagates store errors untouched --
    /// a storage failure is never downgraded to an allow.
    pub fn authenticate(&self, key: &str) -> Result<AuthorizedKey> {
        let charge = self.ledger.check_and_count(key)?;
        debug!(
            key,
            plan = %charge.plan,
            used = charge.used,
            limit = charge.limit,
            "request authenticated and counted"
        );
        Ok(AuthorizedKey {
            key: key.to_string(),
            plan: charge.plan,
            limit: charge.limit,
            used: charge.used,
        })
    }

    /// Read-only quota status for a key.
    ///
    /// Does not count a request, but still applies the stale-date reset
    /// (see the usage module's policy note).
    pub fn status_for(&self, key: &str) -> Result<AccountStatus> {
        self.ledger
            .status(key)?
            .ok_or_else(|| GatewayError::AccountNotFound(key.to_string()))
    }
}
