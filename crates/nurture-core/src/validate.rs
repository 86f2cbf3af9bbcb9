//! Input validation helpers shared by the API handlers.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{NurtureError, Result};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$")
            .expect("Invalid email regex")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email.trim())
}

/// Trim and lower-case an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn require_email(field: &str, email: &str) -> Result<String> {
    if !is_valid_email(email) {
        return Err(NurtureError::Validation(format!(
            "'{}' is not a valid email address",
            field
        )));
    }
    Ok(normalize_email(email))
}

pub fn require_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(NurtureError::Validation(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Contact numbers: digits with an optional leading `+`, 7 to 15 digits,
/// and not all zeros.
pub fn require_contact_number(number: &str) -> Result<String> {
    let trimmed = number.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let valid = (7..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && digits.chars().any(|c| c != '0');
    if !valid {
        return Err(NurtureError::Validation(
            "Contact number must contain 7 to 15 digits".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
