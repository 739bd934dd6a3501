//! Account store for the skymeter gateway
//!
//! CRUD operations over the `accounts` table. Registration is idempotent
//! per email: re-registering returns the existing account unchanged instead
//! of erroring or duplicating. Key resets atomically swap the identifier
//! while preserving plan and usage state.
//!
//! The usage counter columns (`requests_today`, `usage_date`) are owned by
//! the usage ledger; nothing in this module writes them after creation.

use chrono::Utc;
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension, Row};
use skymeter_core::validation::{validate_email, validate_plan_name};
use skymeter_core::{Account, GatewayError, Result};
use skymeter_storage::GatewayBackend;
use std::sync::Arc;
use tracing::debug;

/// Generate a fresh opaque API key: 16 random bytes, hex-encoded.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Store of registered accounts, backed by the injected gateway backend.
pub struct AccountStore<B: GatewayBackend> {
    backend: Arc<B>,
}

impl<B: GatewayBackend> Clone for AccountStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

fn row_to_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        key: row.get(0)?,
        email: row.get(1)?,
        plan: row.get(2)?,
        requests_today: row.get(3)?,
        usage_date: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const ACCOUNT_COLUMNS: &str = "key, email, plan, requests_today, usage_date, created_at";

fn find_by_email_on(conn: &Connection, email: &str) -> Result<Option<Account>> {
    let account = conn
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1"),
            [email],
            row_to_account,
        )
        .optional()?;
    Ok(account)
}

fn find_by_key_on(conn: &Connection, key: &str) -> Result<Option<Account>> {
    let account = conn
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE key = ?1"),
            [key],
            row_to_account,
        )
        .optional()?;
    Ok(account)
}

impl<B: GatewayBackend> AccountStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Look up an account by its API key
    pub fn find_by_key(&self, key: &str) -> Result<Option<Account>> {
        let conn = self.backend.get_connection()?;
        find_by_key_on(&conn, key)
    }

    /// Look up an account by its email
    pub fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let conn = self.backend.get_connection()?;
        find_by_email_on(&conn, email)
    }

    /// Register an account, idempotently with respect to email
    ///
    /// If an account already exists for `email`, it is returned unchanged --
    /// same key, same plan, same usage state. The caller cannot tell (and
    /// must not care) whether the row was created by this call.
    pub fn create(&self, email: &str, plan: &str) -> Result<Account> {
        validate_email(email)?;
        validate_plan_name(plan)?;

        let conn = self.backend.get_connection()?;
        if let Some(existing) = find_by_email_on(&conn, email)? {
            debug!(email, "registration for existing account, returning current key");
            return Ok(existing);
        }

        let key = generate_api_key();
        let now = Utc::now();
        conn.execute(
            "INSERT OR IGNORE INTO accounts (key, email, plan, requests_today, usage_date, created_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5)",
            params![key, email, plan, now.date_naive(), now],
        )?;

        // A concurrent registration may have won the insert; the row for
        // this email is authoritative either way.
        find_by_email_on(&conn, email)?
            .ok_or_else(|| GatewayError::AccountNotFound(email.to_string()))
    }

    /// Change the plan of the account holding `key`
    pub fn update_plan(&self, key: &str, new_plan: &str) -> Result<Account> {
        validate_plan_name(new_plan)?;

        let conn = self.backend.get_connection()?;
        let updated = conn.execute(
            "UPDATE accounts SET plan = ?1 WHERE key = ?2",
            params![new_plan, key],
        )?;
        if updated == 0 {
            return Err(GatewayError::AccountNotFound(key.to_string()));
        }

        find_by_key_on(&conn, key)?.ok_or_else(|| GatewayError::AccountNotFound(key.to_string()))
    }

    /// Change the plan of the account registered under `email` (admin path)
    pub fn update_plan_by_email(&self, email: &str, new_plan: &str) -> Result<Account> {
        validate_plan_name(new_plan)?;

        let conn = self.backend.get_connection()?;
        let updated = conn.execute(
            "UPDATE accounts SET plan = ?1 WHERE email = ?2",
            params![new_plan, email],
        )?;
        if updated == 0 {
            return Err(GatewayError::AccountNotFound(email.to_string()));
        }

        find_by_email_on(&conn, email)?
            .ok_or_else(|| GatewayError::AccountNotFound(email.to_string()))
    }

    /// Replace an account's API key, invalidating the old one immediately
    ///
    /// The swap is a single UPDATE, so plan and usage state carry over and
    /// there is no window where both keys (or neither) authenticate.
    pub fn replace_key(&self, old_key: &str) -> Result<String> {
        let conn = self.backend.get_connection()?;
        let new_key = generate_api_key();
        let updated = conn.execute(
            "UPDATE accounts SET key = ?1 WHERE key = ?2",
            params![new_key, old_key],
        )?;
        if updated == 0 {
            return Err(GatewayError::InvalidKey);
        }
        Ok(new_key)
    }

    /// Replace the API key of the account registered under `email`
    pub fn replace_key_for_email(&self, email: &str) -> Result<String> {
        let conn = self.backend.get_connection()?;
        let new_key = generate_api_key();
        let updated = conn.execute(
            "UPDATE accounts SET key = ?1 WHERE email = ?2",
            params![new_key, email],
        )?;
        if updated == 0 {
            return Err(GatewayError::AccountNotFound(email.to_string()));
        }
        Ok(new_key)
    }

    /// Delete the account registered under `email`
    pub fn delete(&self, email: &str) -> Result<()> {
        let conn = self.backend.get_connection()?;
        let deleted = conn.execute("DELETE FROM accounts WHERE email = ?1", [email])?;
        if deleted == 0 {
            return Err(GatewayError::AccountNotFound(email.to_string()));
        }
        Ok(())
    }

    /// List all registered accounts, oldest first
    pub fn list_all(&self) -> Result<Vec<Account>> {
        let conn = self.backend.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at"
        ))?;
        let accounts = stmt
            .query_map([], row_to_account)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skymeter_storage::LocalSqliteBackend;
    use tempfile::NamedTempFile;

    fn test_store() -> (NamedTempFile, AccountStore<LocalSqliteBackend>) {
        let temp = NamedTempFile::new().unwrap();
        let backend = Arc::new(LocalSqliteBackend::new(temp.path()));
        (temp, AccountStore::new(backend))
    }

    #[test]
    fn test_generated_keys_are_opaque_hex() {
        let key = generate_api_key();
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, generate_api_key());
    }

    #[test]
    fn test_create_and_lookup() {
        let (_temp, store) = test_store();

        let account = store.create("alice@example.com", "Free").unwrap();
        assert_eq!(account.email, "alice@example.com");
        assert_eq!(account.plan, "Free");
        assert_eq!(account.requests_today, 0);

        let by_key = store.find_by_key(&account.key).unwrap().unwrap();
        assert_eq!(by_key.email, account.email);

        let by_email = store.find_by_email("alice@example.com").unwrap().unwrap();
        assert_eq!(by_email.key, account.key);

        assert!(store.find_by_key("no-such-key").unwrap().is_none());
    }

    #[test]
    fn test_create_is_idempotent_per_email() {
        let (_temp, store) = test_store();

        let first = store.create("bob@example.com", "Free").unwrap();
        let second = store.create("bob@example.com", "Pro").unwrap();

        // Same key both times, no second account, plan unchanged
        assert_eq!(first.key, second.key);
        assert_eq!(second.plan, "Free");
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_create_rejects_bad_input() {
        let (_temp, store) = test_store();

        assert!(matches!(
            store.create("not-an-email", "Free"),
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            store.create("carol@example.com", "Platinum"),
            Err(GatewayError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_update_plan() {
        let (_temp, store) = test_store();
        let account = store.create("dave@example.com", "Free").unwrap();

        let updated = store.update_plan(&account.key, "Pro").unwrap();
        assert_eq!(updated.plan, "Pro");
        assert_eq!(updated.key, account.key);

        assert!(matches!(
            store.update_plan("missing-key", "Pro"),
            Err(GatewayError::AccountNotFound(_))
        ));
    }

    #[test]
    fn test_update_plan_by_email() {
        let (_temp, store) = test_store();
        store.create("erin@example.com", "Free").unwrap();

        let updated = store.update_plan_by_email("erin@example.com", "Pro").unwrap();
        assert_eq!(updated.plan, "Pro");

        assert!(matches!(
            store.update_plan_by_email("ghost@example.com", "Pro"),
            Err(GatewayError::AccountNotFound(_))
        ));
    }

    #[test]
    fn test_replace_key_preserves_state() {
        let (_temp, store) = test_store();
        let account = store.create("frank@example.com", "Pro").unwrap();

        let new_key = store.replace_key(&account.key).unwrap();
        assert_ne!(new_key, account.key);

        // Old key is gone, new key carries the prior state
        assert!(store.find_by_key(&account.key).unwrap().is_none());
        let fetched = store.find_by_key(&new_key).unwrap().unwrap();
        assert_eq!(fetched.email, "frank@example.com");
        assert_eq!(fetched.plan, "Pro");

        assert!(matches!(
            store.replace_key(&account.key),
            Err(GatewayError::InvalidKey)
        ));
    }

    #[test]
    fn test_replace_key_for_email() {
        let (_temp, store) = test_store();
        let account = store.create("grace@example.com", "Free").unwrap();

        let new_key = store.replace_key_for_email("grace@example.com").unwrap();
        assert_ne!(new_key, account.key);
        assert!(store.find_by_key(&new_key).unwrap().is_some());

        assert!(matches!(
            store.replace_key_for_email("ghost@example.com"),
            Err(GatewayError::AccountNotFound(_))
        ));
    }

    #[test]
    fn test_delete() {
        let (_temp, store) = test_store();
        store.create("henry@example.com", "Free").unwrap();

        store.delete("henry@example.com").unwrap();
        assert!(store.find_by_email("henry@example.com").unwrap().is_none());

        assert!(matches!(
            store.delete("henry@example.com"),
            Err(GatewayError::AccountNotFound(_))
        ));
    }

    #[test]
    fn test_list_all() {
        let (_temp, store) = test_store();
        store.create("a@example.com", "Free").unwrap();
        store.create("b@example.com", "Pro").unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 2);
    }
}
