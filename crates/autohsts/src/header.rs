//! Strict-Transport-Security header directive helpers
//!
//! The header lives in a virtual host as
//! `header "always" "set" "Strict-Transport-Security" "max-age=<n>"`.
//! Rewrites only touch the `max-age` number; quoting, other directives
//! such as `includeSubDomains` and their order are kept verbatim.

use crate::directive::{DirectiveAccessor, DirectiveLocation, HostPath};
use crate::error::TreeError;

/// Directive carrying response headers
pub const HEADER_DIRECTIVE: &str = "header";

/// Header name, compared case-insensitively
pub const HSTS_HEADER: &str = "Strict-Transport-Security";

/// Directive naming the TLS private key of a host
pub const KEY_FILE_DIRECTIVE: &str = "ssl-certificate-key-file";

/// Header value for a given max-age
pub fn max_age_value(max_age: u64) -> String {
    format!("max-age={}", max_age)
}

/// Arguments of a freshly added HSTS header directive
pub fn header_args(max_age: u64) -> Vec<String> {
    vec![
        "always".to_string(),
        "set".to_string(),
        HSTS_HEADER.to_string(),
        max_age_value(max_age),
    ]
}

/// Locations of the header-name argument of every HSTS header in `host`
///
/// One location per directive, even if a directive repeats the name.
pub fn hsts_headers<T>(tree: &T, host: &HostPath) -> Result<Vec<DirectiveLocation>, TreeError>
where
    T: DirectiveAccessor + ?Sized,
{
    let mut found = tree.find(HEADER_DIRECTIVE, Some(HSTS_HEADER), host)?;
    found.dedup_by_key(|loc| loc.directive);
    Ok(found)
}

/// Whether `host` names a TLS private key
pub fn is_tls_host<T>(tree: &T, host: &HostPath) -> Result<bool, TreeError>
where
    T: DirectiveAccessor + ?Sized,
{
    Ok(!tree.find(KEY_FILE_DIRECTIVE, None, host)?.is_empty())
}

/// Whether `host` uses the given private key
pub fn uses_key_file<T>(tree: &T, host: &HostPath, key_path: &str) -> Result<bool, TreeError>
where
    T: DirectiveAccessor + ?Sized,
{
    Ok(!tree.find(KEY_FILE_DIRECTIVE, Some(key_path), host)?.is_empty())
}

/// Current max-age of a header value
pub fn parse_max_age(value: &str) -> Option<u64> {
    let (_, inner, _) = split_quotes(value);
    inner.split(';').find_map(|part| {
        max_age_span(part).and_then(|(start, end)| part[start..end].parse().ok())
    })
}

/// Replace the max-age number of a header value
///
/// Returns `None` when the value has no `max-age=<digits>` directive.
pub fn rewrite_max_age(value: &str, max_age: u64) -> Option<String> {
    let (open, inner, close) = split_quotes(value);

    let mut replaced = false;
    let parts: Vec<String> = inner
        .split(';')
        .map(|part| match max_age_span(part) {
            Some((start, end)) if !replaced => {
                replaced = true;
                format!("{}{}{}", &part[..start], max_age, &part[end..])
            }
            _ => part.to_string(),
        })
        .collect();

    replaced.then(|| format!("{}{}{}", open, parts.join(";"), close))
}

/// Split surrounding double quotes off a raw argument
fn split_quotes(value: &str) -> (&str, &str, &str) {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        ("\"", &value[1..value.len() - 1], "\"")
    } else {
        ("", value, "")
    }
}

/// Byte range of the digits in a `max-age=<digits>` directive
fn max_age_span(part: &str) -> Option<(usize, usize)> {
    let eq = part.find('=')?;
    if !part[..eq].trim().eq_ignore_ascii_case("max-age") {
        return None;
    }

    let after = &part[eq + 1..];
    let trimmed = after.trim();
    let digits = trimmed
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(trimmed);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let start = eq + 1 + after.find(digits)?;
    Some((start, start + digits.len()))
}
