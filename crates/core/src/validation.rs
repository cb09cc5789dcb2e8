use thiserror::Error;

pub const MAX_SKILL_LEVEL: i64 = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("color must be '#' followed by 3 or 6 hex digits (got {0})")]
    InvalidColor(String),
    #[error("skill level must be between 0 and 3 (got {0})")]
    InvalidLevel(i64),
    #[error("password must be at least 6 characters")]
    PasswordTooShort,
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("a user cannot be their own manager")]
    SelfManagement,
}

/// Trims `value` and rejects it when nothing is left.
pub fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty(field));
    }
    Ok(trimmed.to_string())
}

/// Normalises an optional display color. Blank input counts as no color.
pub fn color(value: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let digits = raw
        .strip_prefix('#')
        .ok_or_else(|| ValidationError::InvalidColor(raw.to_string()))?;
    let valid = matches!(digits.len(), 3 | 6) && digits.bytes().all(|b| b.is_ascii_hexdigit());
    if !valid {
        return Err(ValidationError::InvalidColor(raw.to_string()));
    }
    Ok(Some(raw.to_lowercase()))
}

pub fn skill_level(level: i64) -> Result<i64, ValidationError> {
    if (0..=MAX_SKILL_LEVEL).contains(&level) {
        Ok(level)
    } else {
        Err(ValidationError::InvalidLevel(level))
    }
}

pub fn password(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

/// Trims and lower-cases an email after a minimal shape check.
pub fn email(value: &str) -> Result<String, ValidationError> {
    let normalised = value.trim().to_lowercase();
    match normalised.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(normalised),
        _ => Err(ValidationError::InvalidEmail(value.to_string())),
    }
}
