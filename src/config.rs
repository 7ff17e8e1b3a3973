use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub dns_timeout_seconds: u64,
    pub whois_timeout_seconds: u64,
    pub max_response_size: usize,
    pub max_referrals: usize,
    pub start_time: Instant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigData {
    pub port: u16,
    pub database_url: String,
    pub dns_timeout_seconds: u64,
    pub whois_timeout_seconds: u64,
    pub max_response_size: usize,
    pub max_referrals: usize,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut settings = config::Config::builder()
            .set_default("port", Self::get_default_port())?
            .set_default("database_url", "sqlite:domain_lookup.db?mode=rwc")?
            .set_default("dns_timeout_seconds", 5)?
            .set_default("whois_timeout_seconds", 15)?
            .set_default("max_response_size", 1024 * 1024)?
            .set_default("max_referrals", 5)?;

        // Override with environment variables if present
        settings = Self::apply_env_overrides(settings)?;

        let config_data: ConfigData = settings.build()?.try_deserialize()?;

        Ok(Config {
            port: config_data.port,
            database_url: config_data.database_url,
            dns_timeout_seconds: config_data.dns_timeout_seconds,
            whois_timeout_seconds: config_data.whois_timeout_seconds,
            max_response_size: config_data.max_response_size,
            max_referrals: config_data.max_referrals,
            start_time: Instant::now(),
        })
    }

    fn get_default_port() -> u16 {
        std::env::var("PORT")
            .or_else(|_| std::env::var("HTTP_PORT"))
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000)
    }

    fn apply_env_overrides(
        mut settings: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        let env_mappings = [
            ("PORT", "port"),
            ("DATABASE_URL", "database_url"),
            ("DNS_TIMEOUT_SECONDS", "dns_timeout_seconds"),
            ("WHOIS_TIMEOUT_SECONDS", "whois_timeout_seconds"),
            ("WHOIS_TIMEOUT", "whois_timeout_seconds"),
            ("MAX_RESPONSE_SIZE", "max_response_size"),
            ("MAX_REFERRALS", "max_referrals"),
        ];

        for (env_var, config_key) in env_mappings {
            if let Ok(value) = std::env::var(env_var) {
                settings = settings.set_override(config_key, value)?;
            }
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_with_sane_values() {
        let config = Config::load().unwrap();
        assert!(config.port > 0);
        assert!(!config.database_url.is_empty());
        assert!(config.dns_timeout_seconds > 0);
        assert!(config.whois_timeout_seconds > 0);
        assert!(config.max_response_size > 0);
    }
}
