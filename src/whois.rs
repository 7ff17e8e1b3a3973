use std::{collections::HashMap, net::IpAddr, time::Duration};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use publicsuffix::{List, Psl};
use regex::Regex;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::RwLock,
    time::timeout,
};
use tracing::{debug, warn};

use crate::{config::Config, errors::LookupError};

const WHOIS_PORT: u16 = 43;
const IANA_WHOIS_SERVER: &str = "whois.iana.org";
// Regional registry used for address targets; out-of-region blocks arrive
// via referral.
const IP_WHOIS_SERVER: &str = "whois.arin.net";

// Global PSL instance - shared across all gateway instances
static PSL: Lazy<List> = Lazy::new(List::new);

/// Ordered by specificity; registrar blocks name the registrant before the
/// generic organization fields used by the address registries.
static ORGANIZATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?im)^\s*registrant organization\s*:\s*(.+)$",
        r"(?im)^\s*organization\s*:\s*(.+)$",
        r"(?im)^\s*orgname\s*:\s*(.+)$",
        r"(?im)^\s*org-name\s*:\s*(.+)$",
        r"(?im)^\s*organisation\s*:\s*(.+)$",
        r"(?im)^\s*owner\s*:\s*(.+)$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

/// Raw registry text plus the organization name scraped from it (empty when
/// the registry does not disclose one).
#[derive(Debug, Clone, PartialEq)]
pub struct WhoisLookupResult {
    pub raw: String,
    pub organization_name: String,
}

#[async_trait]
pub trait WhoisGateway: Send + Sync {
    /// Queries WHOIS for a domain name or an IP address literal.
    async fn query(&self, target: &str) -> Result<WhoisLookupResult, LookupError>;
}

/// Plain WHOIS-over-TCP client. Picks a server from the static TLD table,
/// falls back to IANA discovery, and follows registrar referrals up to a
/// configured limit.
pub struct TcpWhoisGateway {
    query_timeout: Duration,
    max_response_size: usize,
    max_referrals: usize,
    discovered_servers: RwLock<HashMap<String, String>>,
}

impl TcpWhoisGateway {
    pub fn new(config: &Config) -> Self {
        Self {
            query_timeout: Duration::from_secs(config.whois_timeout_seconds),
            max_response_size: config.max_response_size,
            max_referrals: config.max_referrals,
            discovered_servers: RwLock::new(HashMap::new()),
        }
    }

    async fn server_for_domain(&self, domain: &str) -> Result<String, LookupError> {
        let tld = effective_tld(domain);

        if let Some(server) = crate::tld_servers::server_for(&tld) {
            return Ok(server.to_string());
        }

        // Multi-label suffixes missing from the table often share the
        // country registry.
        let last_label = domain.rsplit('.').next().unwrap_or(domain);
        if last_label != tld {
            if let Some(server) = crate::tld_servers::server_for(last_label) {
                return Ok(server.to_string());
            }
        }

        {
            let servers = self.discovered_servers.read().await;
            if let Some(server) = servers.get(&tld) {
                return Ok(server.clone());
            }
        }

        debug!(tld = %tld, "discovering whois server via IANA");
        let response = self.exchange(IANA_WHOIS_SERVER, &tld).await?;
        if let Some(server) = extract_referral(&response) {
            let mut servers = self.discovered_servers.write().await;
            servers.insert(tld.clone(), server.clone());
            return Ok(server);
        }

        Err(LookupError::Gateway(format!(
            "no whois server known for TLD {tld}"
        )))
    }

    async fn exchange(&self, server: &str, query: &str) -> Result<String, LookupError> {
        exchange(
            server,
            WHOIS_PORT,
            query,
            self.query_timeout,
            self.max_response_size,
        )
        .await
    }

    async fn follow_referrals(
        &self,
        initial_server: &str,
        initial_data: String,
        target: &str,
    ) -> String {
        let mut current_server = initial_server.to_string();
        let mut current_data = initial_data;
        let mut referral_count = 0;

        while referral_count < self.max_referrals {
            let Some(referral_server) = extract_referral(&current_data) else {
                break;
            };
            if referral_server == current_server {
                break;
            }

            debug!(from = %current_server, to = %referral_server, "following whois referral");
            match self.exchange(&referral_server, target).await {
                Ok(new_data) => {
                    current_server = referral_server;
                    current_data = new_data;
                    referral_count += 1;
                }
                Err(err) => {
                    warn!(server = %referral_server, error = %err, "referral query failed, keeping previous response");
                    break;
                }
            }
        }

        current_data
    }
}

#[async_trait]
impl WhoisGateway for TcpWhoisGateway {
    async fn query(&self, target: &str) -> Result<WhoisLookupResult, LookupError> {
        let server = if target.parse::<IpAddr>().is_ok() {
            IP_WHOIS_SERVER.to_string()
        } else {
            self.server_for_domain(target).await?
        };

        let initial_data = self.exchange(&server, target).await?;
        let raw = self.follow_referrals(&server, initial_data, target).await;
        let organization_name = extract_organization(&raw);

        debug!(
            target,
            bytes = raw.len(),
            organization = %organization_name,
            "whois query complete"
        );

        Ok(WhoisLookupResult {
            raw,
            organization_name,
        })
    }
}

/// One WHOIS round trip: connect, send the query line, read to EOF. Every
/// network step runs under `query_timeout`; responses over
/// `max_response_size` are rejected.
async fn exchange(
    server: &str,
    port: u16,
    query: &str,
    query_timeout: Duration,
    max_response_size: usize,
) -> Result<String, LookupError> {
    let mut stream = timeout(query_timeout, TcpStream::connect((server, port)))
        .await
        .map_err(|_| LookupError::Gateway(format!("connection to {server} timed out")))?
        .map_err(|err| LookupError::Gateway(format!("connection to {server} failed: {err}")))?;

    if let Err(err) = stream.set_nodelay(true) {
        debug!(server, error = %err, "failed to set TCP_NODELAY");
    }

    let query_line = format!("{query}\r\n");
    stream
        .write_all(query_line.as_bytes())
        .await
        .map_err(|err| LookupError::Gateway(format!("write to {server} failed: {err}")))?;

    let mut response = Vec::new();
    let mut buffer = vec![0u8; 4096];

    loop {
        let read = timeout(query_timeout, stream.read(&mut buffer))
            .await
            .map_err(|_| LookupError::Gateway(format!("read from {server} timed out")))?
            .map_err(|err| LookupError::Gateway(format!("read from {server} failed: {err}")))?;

        if read == 0 {
            break;
        }
        response.extend_from_slice(&buffer[..read]);
        if response.len() > max_response_size {
            return Err(LookupError::Gateway(format!(
                "response from {server} exceeded {max_response_size} bytes"
            )));
        }
    }

    // Registries are not reliably UTF-8; replace rather than fail.
    Ok(String::from_utf8_lossy(&response).into_owned())
}

/// Effective TLD via the public suffix list, falling back to the last label.
fn effective_tld(domain: &str) -> String {
    if let Some(parsed) = PSL.domain(domain.as_bytes()) {
        if let Ok(suffix) = std::str::from_utf8(parsed.suffix().as_bytes()) {
            return suffix.to_string();
        }
    }
    domain.rsplit('.').next().unwrap_or(domain).to_string()
}

/// Finds a referral target in registry output: `refer:` and `whois:` lines
/// (IANA) or any `... WHOIS Server:` key (registrar blocks).
fn extract_referral(data: &str) -> Option<String> {
    for line in data.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        if key == "refer" || key == "whois" || (key.contains("whois") && key.contains("server")) {
            return Some(value.to_string());
        }
    }
    None
}

fn extract_organization(raw: &str) -> String {
    for pattern in ORGANIZATION_PATTERNS.iter() {
        for capture in pattern.captures_iter(raw) {
            let candidate = capture[1].trim();
            if !candidate.is_empty() && !is_redacted(candidate) {
                return candidate.to_string();
            }
        }
    }
    String::new()
}

fn is_redacted(value: &str) -> bool {
    let lowered = value.to_lowercase();
    lowered.contains("redacted")
        || lowered.contains("data protected")
        || lowered == "private"
        || lowered == "not disclosed"
}
