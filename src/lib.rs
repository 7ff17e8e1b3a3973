//! # Domain Lookup Library
//!
//! DNS and WHOIS lookups for domain names with a TTL-bounded record cache.
//!
//! ## Features
//!
//! - One call answers with address, hosting organization, raw WHOIS text and
//!   name servers
//! - Records are cached in SQLite and served until their DNS TTL runs out
//! - WHOIS server selection with IANA discovery and referral following
//! - Strict input validation with stable, user-facing messages
//! - Pluggable gateways and storage for testing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use domain_lookup::{
//!     Config, HickoryDnsGateway, LookupService, SqliteRecordStore, SystemClock, TcpWhoisGateway,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     let store = Arc::new(SqliteRecordStore::connect(&config.database_url).await?);
//!     let dns = Arc::new(HickoryDnsGateway::new(Duration::from_secs(
//!         config.dns_timeout_seconds,
//!     )));
//!     let whois = Arc::new(TcpWhoisGateway::new(&config));
//!     let service = LookupService::new(store, dns, whois, Arc::new(SystemClock));
//!
//!     let result = service.lookup("google.com").await?;
//!     println!("{} resolves to {} ({})", result.domain, result.ip, result.hosted_at);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dns;
pub mod errors;
pub mod lookup;
pub mod metrics;
pub mod nameservers;
pub mod store;
pub mod tld_servers;
pub mod validate;
pub mod whois;

// Re-export main types for easy access
pub use config::Config;
pub use dns::{DnsGateway, DnsLookupResult, HickoryDnsGateway};
pub use errors::LookupError;
pub use lookup::{Clock, LookupResponse, LookupService, LookupSource, SystemClock};
pub use store::{DomainRecord, RecordStore, SqliteRecordStore, WriteBatch};
pub use whois::{TcpWhoisGateway, WhoisGateway, WhoisLookupResult};
