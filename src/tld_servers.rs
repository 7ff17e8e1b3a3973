use once_cell::sync::Lazy;
use std::collections::HashMap;

// Hardcoded servers for the most queried TLDs; anything else goes through
// IANA discovery at query time.
static TLD_SERVERS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();

    // Major gTLDs
    map.insert("com", "whois.verisign-grs.com");
    map.insert("net", "whois.verisign-grs.com");
    map.insert("org", "whois.pir.org");
    map.insert("info", "whois.afilias.net");
    map.insert("io", "whois.nic.io");
    map.insert("app", "whois.nic.google");
    map.insert("dev", "whois.nic.google");
    map.insert("xyz", "whois.nic.xyz");

    // Common ccTLDs
    map.insert("uk", "whois.nic.uk");
    map.insert("co.uk", "whois.nic.uk");
    map.insert("de", "whois.denic.de");
    map.insert("fr", "whois.afnic.fr");
    map.insert("nl", "whois.domain-registry.nl");
    map.insert("jp", "whois.jprs.jp");
    map.insert("cn", "whois.cnnic.cn");
    map.insert("in", "whois.registry.in");
    map.insert("au", "whois.auda.org.au");
    map.insert("ca", "whois.cira.ca");
    map.insert("us", "whois.nic.us");
    map.insert("br", "whois.registro.br");
    map.insert("com.br", "whois.registro.br");
    map.insert("ru", "whois.tcinet.ru");

    map
});

pub fn server_for(tld: &str) -> Option<&'static str> {
    TLD_SERVERS.get(tld).copied()
}
