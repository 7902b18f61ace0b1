//! Validation and canonicalization of extracted fields.
//!
//! Contact pages and detail pages hand us free text in many shapes:
//! - Phones: `"+39 02-1234567"`, `"(+39) 041 522.5321"`
//! - Emails buried in prose: `"write to info@hotel.it today"`
//! - Addresses with region noise: `"Via Roma 1, Italy, Lombardy"`
//! - Breadcrumbs: `"Hotel Novecento (Hotel)"`
//!
//! Everything here is pure; callers decide what a rejection means.

use std::sync::LazyLock;

use regex::Regex;
use stayscout_listing_models::ContactQuery;

/// Country calling code every accepted phone number must start with.
pub const PHONE_PREFIX: &str = "+39";

/// A complete, valid email address.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9._%+-]*@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid regex")
});

/// Email-like tokens inside running text.
static EMAIL_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z][a-zA-Z0-9._%+-]*@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("valid regex")
});

/// Phone-like tokens inside running text carrying the calling code.
static PHONE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+39[\s\-()0-9]{8,}").expect("valid regex"));

/// Parenthesized category in a breadcrumb label.
static CATEGORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((.*?)\)").expect("valid regex"));

/// Normalizes a phone number to `+39 XXX XXX X...`.
///
/// Every character other than digits and a `+` preceding the first digit
/// is dropped. The cleaned number must start with [`PHONE_PREFIX`];
/// anything else is rejected rather than reformatted.
#[must_use]
pub fn normalize_phone(raw: &str) -> Option<String> {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_digit() {
            cleaned.push(c);
        } else if c == '+' && cleaned.is_empty() {
            cleaned.push(c);
        }
    }

    let subscriber = cleaned.strip_prefix(PHONE_PREFIX)?;
    let (first, rest) = subscriber.split_at(subscriber.len().min(3));
    let (second, remainder) = rest.split_at(rest.len().min(3));

    let mut formatted = PHONE_PREFIX.to_owned();
    for group in [first, second, remainder] {
        if !group.is_empty() {
            formatted.push(' ');
            formatted.push_str(group);
        }
    }
    Some(formatted)
}

/// Accepts an email address only if it starts with a letter and has a
/// domain with an alphabetic top-level part of two or more letters.
#[must_use]
pub fn validate_email(raw: &str) -> Option<String> {
    EMAIL_RE.is_match(raw).then(|| raw.to_owned())
}

/// Discards everything after the first occurrence of `country`.
///
/// `"Via Roma 1, 20100 Milano, Italy, Lombardy"` becomes
/// `"Via Roma 1, 20100 Milano, Italy"`. Text without the country is only
/// trimmed.
#[must_use]
pub fn truncate_address(raw: &str, country: &str) -> String {
    let raw = raw.trim();
    if country.is_empty() {
        return raw.to_owned();
    }
    raw.find(country).map_or_else(
        || raw.to_owned(),
        |idx| raw[..idx + country.len()].to_owned(),
    )
}

/// Extracts the category from a label such as `"Hotel Novecento (Hotel)"`.
#[must_use]
pub fn property_type_from_label(label: &str) -> Option<String> {
    CATEGORY_RE
        .captures(label)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|category| !category.is_empty())
        .map(str::to_owned)
}

/// Finds, validates and normalizes every contact token in `text`.
#[must_use]
pub fn extract_contacts(text: &str) -> ContactQuery {
    ContactQuery {
        emails: EMAIL_TOKEN_RE
            .find_iter(text)
            .filter_map(|m| validate_email(m.as_str()))
            .collect(),
        phones: PHONE_TOKEN_RE
            .find_iter(text)
            .filter_map(|m| normalize_phone(m.as_str()))
            .collect(),
    }
}
