//! Storefront identity: subdomain allocation and custom domain syntax.

use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::{db::DbTransaction, error::AppError};

/// Longest DNS label.
pub const MAX_LABEL_LEN: usize = 63;

/// Candidates tried per allocation: the base, then `base1` to `base99`.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 100;

static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").expect("valid label pattern")
});

static DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9][a-z0-9-]{0,61}[a-z0-9]$")
        .expect("valid domain pattern")
});

/// Reduce a free-form name to a DNS label.
///
/// Lowercases, replaces anything outside `[a-z0-9-]` with a hyphen, collapses
/// hyphen runs, strips edge hyphens and truncates to 63 characters. The result
/// is empty when the name has no usable characters.
pub fn sanitize_subdomain(name: &str) -> String {
    let mut label = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' };
        if c == '-' && (label.is_empty() || label.ends_with('-')) {
            continue;
        }
        label.push(c);
    }
    label.truncate(MAX_LABEL_LEN);
    label.trim_end_matches('-').to_string()
}

pub fn is_valid_subdomain(label: &str) -> bool {
    LABEL.is_match(label)
}

/// Syntax check of a custom domain: at least two labels, lowercase, no
/// scheme, path or trailing dot. Does not check that the domain resolves.
pub fn validate_custom_domain(domain: &str) -> bool {
    domain.len() <= 253 && DOMAIN.is_match(domain)
}

/// `base` with a numeric suffix, shortening the base so the candidate stays
/// a valid label.
fn candidate(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        return base.to_string();
    }
    let suffix = attempt.to_string();
    let keep = base.len().min(MAX_LABEL_LEN - suffix.len());
    format!("{}{suffix}", base[..keep].trim_end_matches('-'))
}

/// Find a free subdomain for `desired_name`, checked inside `tx`.
///
/// The caller inserts the result in the same transaction. If the insert still
/// hits the unique constraint (a concurrent allocation won), the caller runs
/// the allocation again.
///
/// # Errors
///
/// - `Validation`: the name sanitizes to nothing
/// - `AllocationExhausted`: all candidates are taken
pub async fn allocate_subdomain(
    tx: &mut dyn DbTransaction,
    desired_name: &str,
    except_store: Option<Uuid>,
) -> Result<String, AppError> {
    let base = sanitize_subdomain(desired_name);
    if base.is_empty() {
        return Err(AppError::Validation(
            "name does not contain any characters usable in a subdomain".to_string(),
        ));
    }

    for attempt in 0..MAX_ALLOCATION_ATTEMPTS {
        let subdomain = candidate(&base, attempt);
        if !tx.subdomain_taken(&subdomain, except_store).await? {
            return Ok(subdomain);
        }
    }

    tracing::warn!(base = %base, "subdomain allocation exhausted");
    Err(AppError::AllocationExhausted)
}
