use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches `Name Server:` and `nserver:` lines at the start of a line,
/// capturing the first whitespace-delimited token after the colon.
static NAME_SERVER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*(?:name server|nserver)\s*:\s*(\S+)").unwrap());

/// Merges DNS-reported name servers with those scraped from raw WHOIS text
/// into one deduplicated, canonicalized set. Entries are trimmed, lose at
/// most one trailing dot, and are lower-cased; blanks are discarded.
pub fn merge(dns_servers: &[String], whois_raw: &str) -> Vec<String> {
    let mut servers = BTreeSet::new();

    for entry in dns_servers {
        if let Some(canonical) = canonicalize(entry) {
            servers.insert(canonical);
        }
    }

    if !whois_raw.trim().is_empty() {
        for capture in NAME_SERVER_LINE.captures_iter(whois_raw) {
            if let Some(canonical) = canonicalize(&capture[1]) {
                servers.insert(canonical);
            }
        }
    }

    servers.into_iter().collect()
}

fn canonicalize(entry: &str) -> Option<String> {
    let trimmed = entry.trim();
    let undotted = trimmed.strip_suffix('.').unwrap_or(trimmed);
    if undotted.is_empty() {
        return None;
    }
    Some(undotted.to_lowercase())
}
