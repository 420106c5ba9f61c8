//! Input validation utilities.
//!
//! Each helper takes the field name it is checking so that a failure can be reported back to
//! the caller as a [`CardioError::Validation`] naming the offending field.

use crate::{CardioError, CardioResult};
use cardio_types::{EmailAddress, NonEmptyText, PhoneNumber};

const MAX_FIELD_LEN: usize = 200;

/// A required free-text field.
pub(crate) fn required(field: &str, value: &str) -> CardioResult<NonEmptyText> {
    let text = NonEmptyText::new(value).map_err(|e| CardioError::validation(field, e.to_string()))?;
    if text.as_str().chars().count() > MAX_FIELD_LEN {
        return Err(CardioError::validation(
            field,
            format!("must be at most {MAX_FIELD_LEN} characters"),
        ));
    }
    Ok(text)
}

/// An optional free-text field; blank input counts as absent.
pub(crate) fn optional(field: &str, value: Option<&str>) -> CardioResult<Option<NonEmptyText>> {
    match value {
        Some(v) if !v.trim().is_empty() => required(field, v).map(Some),
        _ => Ok(None),
    }
}

pub(crate) fn email(field: &str, value: &str) -> CardioResult<EmailAddress> {
    EmailAddress::parse(value).map_err(|e| CardioError::validation(field, e.to_string()))
}

pub(crate) fn phone(field: &str, value: &str) -> CardioResult<PhoneNumber> {
    PhoneNumber::parse(value).map_err(|e| CardioError::validation(field, e.to_string()))
}

/// Place names (city, state): letters, spaces and hyphens only.
pub(crate) fn place_name(field: &str, value: &str) -> CardioResult<NonEmptyText> {
    let text = required(field, value)?;
    let ok = text
        .as_str()
        .chars()
        .all(|c| c.is_alphabetic() || c == ' ' || c == '-');
    if !ok {
        return Err(CardioError::validation(
            field,
            "may only contain letters, spaces and hyphens",
        ));
    }
    Ok(text)
}

/// An optional website; when present it must be an http(s) URL with a host.
pub(crate) fn website(field: &str, value: Option<&str>) -> CardioResult<Option<String>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
        .ok_or_else(|| CardioError::validation(field, "must start with http:// or https://"))?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || value.contains(char::is_whitespace) {
        return Err(CardioError::validation(field, "is not a valid URL"));
    }
    Ok(Some(value.to_string()))
}
