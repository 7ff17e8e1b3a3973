use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::{
    config::{ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
    ResolveError, TokioResolver,
};
use tracing::{debug, warn};

use crate::errors::LookupError;

/// Outcome of resolving a domain: the first IPv4 address (empty when the
/// zone has no A record), that record's TTL, and the delegated name servers.
#[derive(Debug, Clone, PartialEq)]
pub struct DnsLookupResult {
    pub ip: String,
    pub ttl_seconds: i64,
    pub name_servers: Vec<String>,
}

#[async_trait]
pub trait DnsGateway: Send + Sync {
    async fn query(&self, domain: &str) -> Result<DnsLookupResult, LookupError>;
}

/// Resolver-backed gateway using the host DNS configuration, falling back to
/// the library defaults when the system configuration cannot be read.
pub struct HickoryDnsGateway {
    resolver: TokioResolver,
}

impl HickoryDnsGateway {
    pub fn new(timeout: Duration) -> Self {
        let resolver = match TokioResolver::builder_tokio() {
            Ok(mut builder) => {
                builder.options_mut().timeout = timeout;
                builder.build()
            }
            Err(err) => {
                warn!(error = %err, "system DNS configuration unavailable, using defaults");
                let mut opts = ResolverOpts::default();
                opts.timeout = timeout;
                TokioResolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
                .with_options(opts)
                .build()
            }
        };

        Self { resolver }
    }
}

/// NXDOMAIN and empty answers are ordinary outcomes here, not failures.
fn is_absent(err: &ResolveError) -> bool {
    err.is_no_records_found() || err.is_nx_domain()
}

#[async_trait]
impl DnsGateway for HickoryDnsGateway {
    async fn query(&self, domain: &str) -> Result<DnsLookupResult, LookupError> {
        let (ip, ttl_seconds) = match self.resolver.ipv4_lookup(domain).await {
            Ok(response) => {
                let ip = response
                    .iter()
                    .next()
                    .map(|a| a.to_string())
                    .unwrap_or_default();
                let ttl = response
                    .as_lookup()
                    .record_iter()
                    .next()
                    .map_or(0, hickory_resolver::proto::rr::Record::ttl);
                (ip, i64::from(ttl))
            }
            Err(err) if is_absent(&err) => (String::new(), 0),
            Err(err) => {
                return Err(LookupError::Gateway(format!(
                    "A record lookup for {domain} failed: {err}"
                )))
            }
        };

        let name_servers = match self.resolver.ns_lookup(domain).await {
            Ok(response) => response.iter().map(|ns| ns.to_string()).collect(),
            Err(err) if is_absent(&err) => Vec::new(),
            Err(err) => {
                warn!(domain, error = %err, "NS lookup failed, continuing without delegation data");
                Vec::new()
            }
        };

        debug!(domain, ip = %ip, ttl_seconds, "resolved domain");

        Ok(DnsLookupResult {
            ip,
            ttl_seconds,
            name_servers,
        })
    }
}
