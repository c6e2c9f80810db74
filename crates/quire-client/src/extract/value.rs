//! Raw string → JSON value coercions shared by the strategies.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use quire_core::error::ScrapeError;
use quire_core::extract::ValueKind;
use serde_json::Value;
use url::Url;

use crate::markdown::MarkdownConverter;

/// Turn a raw field string into its JSON value.
///
/// A failed numeric or date coercion keeps the normalized text, so the
/// schema reports the mismatch for that record instead of the whole page
/// failing.
pub(crate) fn coerce(
    raw: &str,
    kind: ValueKind,
    page_url: &str,
    markdown: &MarkdownConverter,
) -> Result<Value, ScrapeError> {
    let fallback = || Value::String(normalize_whitespace(raw));
    let value = match kind {
        ValueKind::Text => fallback(),
        ValueKind::Html => Value::String(raw.trim().to_string()),
        ValueKind::Markdown => Value::String(markdown.convert(raw)?),
        ValueKind::Url => resolve_url(page_url, raw)
            .map(Value::String)
            .unwrap_or_else(fallback),
        ValueKind::Integer => first_integer(raw).map(Value::from).unwrap_or_else(fallback),
        ValueKind::Number => first_number(raw)
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(fallback),
        ValueKind::Datetime => parse_datetime(raw)
            .map(Value::String)
            .unwrap_or_else(fallback),
    };
    Ok(value)
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Digits of the first numeric token, with thousands separators dropped.
/// `allow_fraction` keeps one decimal point.
fn first_numeric_token(raw: &str, allow_fraction: bool) -> Option<String> {
    let chars: Vec<char> = raw.chars().collect();
    let start = chars.iter().position(|c| c.is_ascii_digit())?;
    let negative = start > 0 && chars[start - 1] == '-';

    let mut token = String::new();
    if negative {
        token.push('-');
    }
    let mut seen_point = false;
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        let next_is_digit = chars.get(i + 1).is_some_and(char::is_ascii_digit);
        match c {
            '0'..='9' => token.push(c),
            ',' if next_is_digit => {}
            '.' if allow_fraction && !seen_point && next_is_digit => {
                seen_point = true;
                token.push(c);
            }
            _ => break,
        }
        i += 1;
    }
    Some(token)
}

/// First integer in the text: `"Chapter 12: Dawn"` → `12`.
pub fn first_integer(raw: &str) -> Option<i64> {
    first_numeric_token(raw, false)?.parse().ok()
}

/// First decimal number in the text: `"Rating 4.5/5"` → `4.5`.
pub fn first_number(raw: &str) -> Option<f64> {
    first_numeric_token(raw, true)?.parse().ok()
}

const NAIVE_DATETIME_FORMATS: [&str; 3] =
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const NAIVE_DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y"];

/// Normalize a timestamp to RFC 3339 in UTC.
///
/// Accepts RFC 3339, RFC 2822 (feeds), and a few common naive layouts
/// which are taken to be UTC. Returns `None` if nothing matches.
pub fn parse_datetime(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let utc = DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NAIVE_DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NAIVE_DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })?;
    Some(utc.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Resolve `raw` against the page URL. Absolute URLs pass through.
pub fn resolve_url(base: &str, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match Url::parse(raw) {
        Ok(url) => Some(url.into()),
        Err(_) => Url::parse(base).ok()?.join(raw).ok().map(Into::into),
    }
}
