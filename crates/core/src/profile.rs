use md5::{Digest, Md5};

use crate::types::{UserRecord, UserView};

const GRAVATAR_BASE: &str = "//www.gravatar.com/avatar/";

/// Builds the public view of a user for the given calendar year.
pub fn user_view(record: &UserRecord, current_year: i32) -> UserView {
    UserView {
        id: record.id,
        name: record.name.clone(),
        readable_id: readable_id(&record.name),
        gravatar_url: gravatar_url(record.email.as_deref()),
        experience_counter: experience_counter(record.diploma.as_deref(), current_year),
        manager_id: record.manager_id,
        address: record.address.clone(),
        phone: record.phone.clone(),
    }
}

/// Slug used in client URLs: lower-cased name with whitespace runs replaced by `-`.
pub fn readable_id(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Protocol-relative gravatar URL for the (normalised) email.
pub fn gravatar_url(email: Option<&str>) -> String {
    let normalised = email.map(|value| value.trim().to_lowercase()).unwrap_or_default();
    let digest = Md5::digest(normalised.as_bytes());
    format!("{GRAVATAR_BASE}{}", hex::encode(digest))
}

/// Years elapsed since the diploma year, or 0 when unknown or in the future.
pub fn experience_counter(diploma: Option<&str>, current_year: i32) -> i32 {
    diploma
        .and_then(diploma_year)
        .map(|year| (current_year - year).max(0))
        .unwrap_or(0)
}

fn diploma_year(diploma: &str) -> Option<i32> {
    let trimmed = diploma.trim();
    let digits = trimmed.get(..4)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
