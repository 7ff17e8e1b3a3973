use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::dns::DnsGateway;
use crate::errors::LookupError;
use crate::nameservers;
use crate::store::{DomainRecord, RecordStore, WriteBatch};
use crate::validate;
use crate::whois::WhoisGateway;

/// Time source seam. Freshness decisions and stored timestamps go through
/// this so tests can pin the clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Where the answer came from: the stored record (still within its TTL) or a
/// fresh round of gateway queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupSource {
    Cache,
    External,
}

/// Outward result of a lookup. TTLs, timestamps and storage details stay
/// internal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    pub domain: String,
    pub ip: String,
    pub hosted_at: String,
    pub whois: String,
    pub name_servers: Vec<String>,
    pub source: LookupSource,
}

/// Coordinates validation, the record cache and the DNS/WHOIS gateways.
///
/// A lookup serves the stored record while it is fresh; otherwise it queries
/// WHOIS for the domain, DNS for address and delegation data, WHOIS again for
/// the hosting organization when an address exists, and persists the rebuilt
/// record before answering. External calls are strictly sequential and their
/// failures propagate untouched.
pub struct LookupService {
    store: Arc<dyn RecordStore>,
    dns: Arc<dyn DnsGateway>,
    whois: Arc<dyn WhoisGateway>,
    clock: Arc<dyn Clock>,
}

impl LookupService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        dns: Arc<dyn DnsGateway>,
        whois: Arc<dyn WhoisGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            dns,
            whois,
            clock,
        }
    }

    pub async fn lookup(&self, domain_name: &str) -> Result<LookupResponse, LookupError> {
        let name = validate::normalize(domain_name)?;

        let cached = self.store.get_by_name(&name).await?;

        if let Some(record) = cached {
            if !self.is_expired(&record) {
                debug!(domain = %name, "serving record from cache");
                return Ok(respond(&record, &[], LookupSource::Cache));
            }
        }

        debug!(domain = %name, "record missing or stale, querying gateways");

        let whois_result = self.whois.query(&name).await?;
        let dns_result = self.dns.query(&name).await?;

        let hosted_at = if dns_result.ip.trim().is_empty() {
            String::new()
        } else {
            self.whois.query(&dns_result.ip).await?.organization_name
        };

        let record = DomainRecord {
            name,
            ip: dns_result.ip,
            updated_at: self.clock.now().naive_utc(),
            whois_raw: whois_result.raw,
            ttl_seconds: dns_result.ttl_seconds,
            hosted_at,
        };

        let mut batch = WriteBatch::new();
        batch.upsert(record.clone());
        self.store.commit(batch).await?;

        info!(
            domain = %record.name,
            ip = %record.ip,
            ttl_seconds = record.ttl_seconds,
            "refreshed domain record"
        );

        Ok(respond(
            &record,
            &dns_result.name_servers,
            LookupSource::External,
        ))
    }

    /// A record is stale once its age in whole seconds reaches the TTL.
    /// Non-positive TTLs never count as fresh. Stored timestamps carry no
    /// timezone and are read as UTC.
    fn is_expired(&self, record: &DomainRecord) -> bool {
        if record.ttl_seconds <= 0 {
            return true;
        }

        let age = self.clock.now() - record.updated_at.and_utc();
        age.num_seconds() >= record.ttl_seconds
    }
}

fn respond(record: &DomainRecord, dns_servers: &[String], source: LookupSource) -> LookupResponse {
    LookupResponse {
        domain: record.name.clone(),
        ip: record.ip.clone(),
        hosted_at: record.hosted_at.clone(),
        whois: record.whois_raw.clone(),
        name_servers: nameservers::merge(dns_servers, &record.whois_raw),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::DnsLookupResult;
    use crate::whois::WhoisLookupResult;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<HashMap<String, DomainRecord>>,
        get_calls: AtomicUsize,
        commit_calls: AtomicUsize,
    }

    impl MemoryStore {
        fn seeded(record: DomainRecord) -> Self {
            let store = Self::default();
            store
                .records
                .lock()
                .unwrap()
                .insert(record.name.clone(), record);
            store
        }

        fn stored(&self, name: &str) -> Option<DomainRecord> {
            self.records.lock().unwrap().get(name).cloned()
        }
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        async fn get_by_name(&self, name: &str) -> Result<Option<DomainRecord>, LookupError> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.lock().unwrap().get(name).cloned())
        }

        async fn commit(&self, batch: WriteBatch) -> Result<(), LookupError> {
            self.commit_calls.fetch_add(1, Ordering::SeqCst);
            let mut records = self.records.lock().unwrap();
            for record in batch.into_records() {
                records.insert(record.name.clone(), record);
            }
            Ok(())
        }
    }

    struct ScriptedDns {
        result: DnsLookupResult,
        calls: AtomicUsize,
    }

    impl ScriptedDns {
        fn new(ip: &str, ttl_seconds: i64, name_servers: &[&str]) -> Self {
            Self {
                result: DnsLookupResult {
                    ip: ip.to_string(),
                    ttl_seconds,
                    name_servers: name_servers.iter().map(|s| s.to_string()).collect(),
                },
                calls: AtomicUsize::new(0),
            }
        }

        fn unused() -> Self {
            Self::new("", 0, &[])
        }
    }

    #[async_trait]
    impl DnsGateway for ScriptedDns {
        async fn query(&self, _domain: &str) -> Result<DnsLookupResult, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    #[derive(Default)]
    struct ScriptedWhois {
        responses: Mutex<HashMap<String, WhoisLookupResult>>,
        queried: Mutex<Vec<String>>,
        fail: bool,
    }

    impl ScriptedWhois {
        fn with(responses: &[(&str, &str, &str)]) -> Self {
            let map = responses
                .iter()
                .map(|(target, raw, org)| {
                    (
                        target.to_string(),
                        WhoisLookupResult {
                            raw: raw.to_string(),
                            organization_name: org.to_string(),
                        },
                    )
                })
                .collect();
            Self {
                responses: Mutex::new(map),
                queried: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn targets(&self) -> Vec<String> {
            self.queried.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WhoisGateway for ScriptedWhois {
        async fn query(&self, target: &str) -> Result<WhoisLookupResult, LookupError> {
            self.queried.lock().unwrap().push(target.to_string());
            if self.fail {
                return Err(LookupError::Gateway("whois unreachable".to_string()));
            }
            self.responses
                .lock()
                .unwrap()
                .get(target)
                .cloned()
                .ok_or_else(|| LookupError::Gateway(format!("unexpected whois target: {target}")))
        }
    }

    fn record_updated_ago(age_seconds: i64, ttl_seconds: i64) -> DomainRecord {
        DomainRecord {
            name: "test.com".to_string(),
            ip: "203.0.113.10".to_string(),
            updated_at: (test_now() - Duration::seconds(age_seconds)).naive_utc(),
            whois_raw: "Name Server: ns1.test.com".to_string(),
            ttl_seconds,
            hosted_at: "Old Host".to_string(),
        }
    }

    fn service(
        store: &Arc<MemoryStore>,
        dns: &Arc<ScriptedDns>,
        whois: &Arc<ScriptedWhois>,
    ) -> LookupService {
        LookupService::new(
            Arc::clone(store) as Arc<dyn RecordStore>,
            Arc::clone(dns) as Arc<dyn DnsGateway>,
            Arc::clone(whois) as Arc<dyn WhoisGateway>,
            Arc::new(FixedClock(test_now())),
        )
    }

    #[tokio::test]
    async fn fresh_record_is_served_from_cache_without_gateway_calls() {
        let store = Arc::new(MemoryStore::seeded(record_updated_ago(10, 60)));
        let dns = Arc::new(ScriptedDns::unused());
        let whois = Arc::new(ScriptedWhois::default());

        let response = service(&store, &dns, &whois).lookup("test.com").await.unwrap();

        assert_eq!(response.source, LookupSource::Cache);
        assert_eq!(response.domain, "test.com");
        assert_eq!(response.ip, "203.0.113.10");
        assert_eq!(response.hosted_at, "Old Host");
        assert_eq!(response.whois, "Name Server: ns1.test.com");
        assert_eq!(response.name_servers, vec!["ns1.test.com".to_string()]);

        assert_eq!(dns.calls.load(Ordering::SeqCst), 0);
        assert!(whois.targets().is_empty());
        assert_eq!(store.commit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_record_is_refreshed_from_gateways() {
        let store = Arc::new(MemoryStore::seeded(record_updated_ago(120, 30)));
        let dns = Arc::new(ScriptedDns::new("8.8.8.8", 300, &["ns2.test.com"]));
        let whois = Arc::new(ScriptedWhois::with(&[
            ("test.com", "Name Server: ns1.test.com", "Test Registrar"),
            ("8.8.8.8", "OrgName: Google", "Google"),
        ]));

        let response = service(&store, &dns, &whois).lookup("test.com").await.unwrap();

        assert_eq!(response.source, LookupSource::External);
        assert_eq!(response.ip, "8.8.8.8");
        assert_eq!(response.hosted_at, "Google");
        assert_eq!(response.whois, "Name Server: ns1.test.com");
        assert_eq!(
            response.name_servers,
            vec!["ns1.test.com".to_string(), "ns2.test.com".to_string()]
        );
        assert_eq!(whois.targets(), vec!["test.com", "8.8.8.8"]);

        let stored = store.stored("test.com").unwrap();
        assert_eq!(stored.ip, "8.8.8.8");
        assert_eq!(stored.ttl_seconds, 300);
        assert_eq!(stored.hosted_at, "Google");
        assert_eq!(stored.updated_at, test_now().naive_utc());
        assert_eq!(store.commit_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn record_aged_exactly_to_its_ttl_is_stale() {
        let store = Arc::new(MemoryStore::seeded(record_updated_ago(60, 60)));
        let dns = Arc::new(ScriptedDns::new("8.8.8.8", 300, &[]));
        let whois = Arc::new(ScriptedWhois::with(&[
            ("test.com", "Name Server: ns1.test.com", ""),
            ("8.8.8.8", "OrgName: Google", "Google"),
        ]));

        let response = service(&store, &dns, &whois).lookup("test.com").await.unwrap();
        assert_eq!(response.source, LookupSource::External);
    }

    #[tokio::test]
    async fn record_one_second_younger_than_ttl_is_fresh() {
        let store = Arc::new(MemoryStore::seeded(record_updated_ago(59, 60)));
        let dns = Arc::new(ScriptedDns::unused());
        let whois = Arc::new(ScriptedWhois::default());

        let response = service(&store, &dns, &whois).lookup("test.com").await.unwrap();
        assert_eq!(response.source, LookupSource::Cache);
    }

    #[tokio::test]
    async fn nonpositive_ttl_never_counts_as_fresh() {
        let store = Arc::new(MemoryStore::seeded(record_updated_ago(0, 0)));
        let dns = Arc::new(ScriptedDns::new("8.8.8.8", 120, &[]));
        let whois = Arc::new(ScriptedWhois::with(&[
            ("test.com", "Name Server: ns1.test.com", ""),
            ("8.8.8.8", "OrgName: Google", "Google"),
        ]));

        let response = service(&store, &dns, &whois).lookup("test.com").await.unwrap();
        assert_eq!(response.source, LookupSource::External);
    }

    #[tokio::test]
    async fn blank_ip_skips_the_hosting_lookup() {
        let store = Arc::new(MemoryStore::default());
        let dns = Arc::new(ScriptedDns::new("", 0, &[]));
        let whois = Arc::new(ScriptedWhois::with(&[(
            "nosuch.example",
            "Name Server: ns1.example.net",
            "",
        )]));

        let response = service(&store, &dns, &whois)
            .lookup("nosuch.example")
            .await
            .unwrap();

        assert_eq!(response.source, LookupSource::External);
        assert_eq!(response.ip, "");
        assert_eq!(response.hosted_at, "");
        assert_eq!(whois.targets(), vec!["nosuch.example"]);

        let stored = store.stored("nosuch.example").unwrap();
        assert_eq!(stored.ip, "");
        assert_eq!(stored.hosted_at, "");
    }

    #[tokio::test]
    async fn invalid_input_fails_before_any_collaborator_is_touched() {
        let store = Arc::new(MemoryStore::default());
        let dns = Arc::new(ScriptedDns::unused());
        let whois = Arc::new(ScriptedWhois::default());

        let error = service(&store, &dns, &whois).lookup("umbler").await.unwrap_err();

        match error {
            LookupError::Validation(message) => {
                assert_eq!(message, "Domain must include a valid TLD (example: umbler.com).");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 0);
        assert_eq!(dns.calls.load(Ordering::SeqCst), 0);
        assert!(whois.targets().is_empty());
    }

    #[tokio::test]
    async fn input_is_canonicalized_before_the_cache_check() {
        let store = Arc::new(MemoryStore::seeded(record_updated_ago(10, 60)));
        let dns = Arc::new(ScriptedDns::unused());
        let whois = Arc::new(ScriptedWhois::default());

        let response = service(&store, &dns, &whois)
            .lookup("  TEST.COM  ")
            .await
            .unwrap();

        assert_eq!(response.source, LookupSource::Cache);
        assert_eq!(response.domain, "test.com");
    }

    #[tokio::test]
    async fn first_lookup_creates_a_record() {
        let store = Arc::new(MemoryStore::default());
        let dns = Arc::new(ScriptedDns::new("198.51.100.7", 120, &["ns1.umbler.com"]));
        let whois = Arc::new(ScriptedWhois::with(&[
            ("umbler.com", "Name Server: ns1.umbler.com", ""),
            ("198.51.100.7", "Organization: umbler.corp", "umbler.corp"),
        ]));

        let response = service(&store, &dns, &whois).lookup("umbler.com").await.unwrap();

        assert_eq!(response.source, LookupSource::External);
        assert_eq!(response.hosted_at, "umbler.corp");

        let stored = store.stored("umbler.com").unwrap();
        assert_eq!(stored.name, "umbler.com");
        assert_eq!(stored.ip, "198.51.100.7");
        assert_eq!(stored.ttl_seconds, 120);
        assert_eq!(stored.whois_raw, "Name Server: ns1.umbler.com");
    }

    #[tokio::test]
    async fn gateway_failures_propagate_untranslated() {
        let store = Arc::new(MemoryStore::default());
        let dns = Arc::new(ScriptedDns::unused());
        let whois = Arc::new(ScriptedWhois::failing());

        let error = service(&store, &dns, &whois).lookup("test.com").await.unwrap_err();

        match error {
            LookupError::Gateway(message) => assert_eq!(message, "whois unreachable"),
            other => panic!("expected gateway error, got {other:?}"),
        }
        assert_eq!(store.commit_calls.load(Ordering::SeqCst), 0);
        assert!(store.stored("test.com").is_none());
    }

    #[test]
    fn response_serializes_with_camel_case_keys() {
        let response = LookupResponse {
            domain: "test.com".to_string(),
            ip: "8.8.8.8".to_string(),
            hosted_at: "Google".to_string(),
            whois: "Name Server: ns1.test.com".to_string(),
            name_servers: vec!["ns1.test.com".to_string()],
            source: LookupSource::External,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["hostedAt"], "Google");
        assert_eq!(json["nameServers"][0], "ns1.test.com");
        assert_eq!(json["source"], "external");
        assert_eq!(json["domain"], "test.com");
    }
}
