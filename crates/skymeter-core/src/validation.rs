//! Input validation for the skymeter gateway
//!
//! Provides validation functions to prevent:
//! - Malformed emails entering the account store
//! - Unknown plan names on registration and upgrade paths
//! - Excessively long inputs

use crate::{GatewayError, Result};

/// Maximum length for account emails
pub const MAX_EMAIL_LEN: usize = 255;

/// Plan names accepted on registration and upgrade paths.
///
/// NOTE: the plan catalog itself is deliberately lenient (unknown stored
/// names resolve to a fallback ceiling); this closed set only guards the
/// mutation boundaries.
pub const KNOWN_PLANS: &[&str] = &["Free", "Pro"];

/// Validate an account email
///
/// Requirements:
/// - Not empty
/// - <= 255 characters
/// - Exactly one '@' with non-empty local and domain parts
/// - No whitespace or control characters
pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(GatewayError::Validation("email cannot be empty".to_string()));
    }

    if email.len() > MAX_EMAIL_LEN {
        return Err(GatewayError::Validation(format!(
            "email exceeds maximum length of {} characters",
            MAX_EMAIL_LEN
        )));
    }

    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(GatewayError::Validation(
            "email cannot contain whitespace or control characters".to_string(),
        ));
    }

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        }
        _ => Err(GatewayError::Validation(format!(
            "'{}' is not a valid email address",
            email
        ))),
    }
}

/// Validate a plan name against the known set
pub fn validate_plan_name(plan: &str) -> Result<()> {
    if KNOWN_PLANS.contains(&plan) {
        Ok(())
    } else {
        Err(GatewayError::InvalidPlan(plan.to_string()))
    }
}
