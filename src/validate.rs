use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::LookupError;

const MSG_REQUIRED: &str = "Domain is required.";
const MSG_TLD: &str = "Domain must include a valid TLD (example: umbler.com).";
const MSG_FORMAT: &str = "Domain format is invalid.";
const MSG_HOST_NAME: &str = "Domain must be a valid DNS host name.";

/// Hostnames may not exceed this many characters in total.
const MAX_DOMAIN_LENGTH: usize = 253;

/// One or more dot-separated labels, each 1-63 characters, alphanumeric with
/// internal hyphens only. Total length and consecutive dots are checked
/// separately before this pattern is applied.
static DOMAIN_LABELS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)(?:\.(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?))+$")
        .unwrap()
});

/// Validates a raw domain name and returns its canonical form (trimmed,
/// lower-cased). Rejections carry a fixed user-facing message and happen
/// before any network or storage access.
pub fn normalize(input: &str) -> Result<String, LookupError> {
    if input.trim().is_empty() {
        return Err(LookupError::Validation(MSG_REQUIRED.to_string()));
    }

    let normalized = input.trim().to_lowercase();

    if !normalized.contains('.') {
        return Err(LookupError::Validation(MSG_TLD.to_string()));
    }

    if normalized.len() > MAX_DOMAIN_LENGTH
        || normalized.contains("..")
        || !DOMAIN_LABELS.is_match(&normalized)
    {
        return Err(LookupError::Validation(MSG_FORMAT.to_string()));
    }

    // Dotted quads survive the label grammar but are not DNS host names.
    if normalized.parse::<std::net::IpAddr>().is_ok() {
        return Err(LookupError::Validation(MSG_HOST_NAME.to_string()));
    }

    Ok(normalized)
}
