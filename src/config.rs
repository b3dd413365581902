//! Environment configuration.
//!
//! Everything is read once at startup. A malformed value is a startup error,
//! never silently replaced by its default.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::downloader::extractors::ClientIdentity;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_TIMEOUT_MS: u64 = 12_000;
const DEFAULT_MAX_CYCLES: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 2_000;
const DEFAULT_BACKOFF_MAX_MS: u64 = 16_000;
const FALLBACK_DATABASE_URL: &str = "sqlite://history.db?mode=rwc";

/// Startup configuration failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("unknown client identity {0:?} in RESOLVE_CLIENTS")]
    UnknownIdentity(String),

    #[error("{0}")]
    Rejected(String),
}

/// Retry policy of the resilient resolver
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Ordered identities tried within each cycle
    pub identities: Vec<ClientIdentity>,
    /// Number of passes over `identities`
    pub max_cycles: u32,
    /// Budget of a single upstream call
    pub timeout: Duration,
    /// First delay after an authentication challenge
    pub backoff_base: Duration,
    /// Upper bound of any single delay
    pub backoff_max: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            identities: ClientIdentity::defaults(),
            max_cycles: DEFAULT_MAX_CYCLES,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_max: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
        }
    }
}

impl ResolverConfig {
    pub fn with_identities(mut self, identities: Vec<ClientIdentity>) -> Self {
        self.identities = identities;
        self
    }

    pub fn with_max_cycles(mut self, cycles: u32) -> Self {
        self.max_cycles = cycles;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Worst-case number of upstream calls
    pub fn max_attempts(&self) -> u32 {
        self.max_cycles.saturating_mul(self.identities.len() as u32)
    }

    /// Delay before the next attempt after the `n`-th (0-based) challenge
    pub fn backoff_for(&self, n: u32) -> Duration {
        let factor = 2u32.saturating_pow(n.min(16));
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_cycles == 0 {
            return Err(ConfigError::Rejected("RESOLVE_MAX_CYCLES must be at least 1".to_string()));
        }
        if self.identities.is_empty() {
            return Err(ConfigError::Rejected("RESOLVE_CLIENTS must name at least one identity".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Rejected("RESOLVE_TIMEOUT_MS must be positive".to_string()));
        }
        Ok(())
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub database_url: String,
    /// Raw Cookie header forwarded upstream
    pub cookie: Option<String>,
    /// http(s)/socks5 proxy for all upstream traffic
    pub upstream_proxy: Option<String>,
    /// Allowed browser origin; `None` is permissive
    pub cors_origin: Option<String>,
    pub resolver: ResolverConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            database_url: default_database_url(),
            cookie: None,
            upstream_proxy: None,
            cors_origin: None,
            resolver: ResolverConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // blank values count as unset
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let resolver = ResolverConfig {
            identities: match get("RESOLVE_CLIENTS") {
                Some(raw) => parse_identities(&raw)?,
                None => ClientIdentity::defaults(),
            },
            max_cycles: parse_or("RESOLVE_MAX_CYCLES", get("RESOLVE_MAX_CYCLES"), DEFAULT_MAX_CYCLES)?,
            timeout: Duration::from_millis(parse_or(
                "RESOLVE_TIMEOUT_MS",
                get("RESOLVE_TIMEOUT_MS"),
                DEFAULT_TIMEOUT_MS,
            )?),
            backoff_base: Duration::from_millis(parse_or(
                "RESOLVE_BACKOFF_BASE_MS",
                get("RESOLVE_BACKOFF_BASE_MS"),
                DEFAULT_BACKOFF_BASE_MS,
            )?),
            backoff_max: Duration::from_millis(parse_or(
                "RESOLVE_BACKOFF_MAX_MS",
                get("RESOLVE_BACKOFF_MAX_MS"),
                DEFAULT_BACKOFF_MAX_MS,
            )?),
        };
        resolver.validate()?;

        let upstream_proxy = get("UPSTREAM_PROXY");
        if let Some(proxy) = &upstream_proxy {
            url::Url::parse(proxy).map_err(|e| ConfigError::Invalid {
                name: "UPSTREAM_PROXY",
                value: proxy.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(Self {
            bind_addr: parse_or("BIND_ADDR", get("BIND_ADDR"), IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            database_url: get("DATABASE_URL").unwrap_or_else(default_database_url),
            cookie: get("YOUTUBE_COOKIE"),
            upstream_proxy,
            cors_origin: get("CORS_ORIGIN"),
            resolver,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = raw else {
        return Ok(default);
    };
    match value.parse() {
        Ok(parsed) => Ok(parsed),
        Err(e) => Err(ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_identities(raw: &str) -> Result<Vec<ClientIdentity>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| ClientIdentity::by_name(name).ok_or_else(|| ConfigError::UnknownIdentity(name.to_string())))
        .collect()
}

/// `sqlite://<data dir>/tube-relay/history.db`, or a file in the working
/// directory when the platform has no data dir
fn default_database_url() -> String {
    match dirs::data_local_dir() {
        Some(dir) => database_url_for(dir.join("tube-relay").join("history.db")),
        None => FALLBACK_DATABASE_URL.to_string(),
    }
}

fn database_url_for(path: PathBuf) -> String {
    format!("sqlite://{}?mode=rwc", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        RelayConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:5000");
        assert!(config.database_url.starts_with("sqlite://"));
        assert!(config.cookie.is_none());
        assert_eq!(config.resolver.timeout, Duration::from_millis(12_000));
        assert_eq!(config.resolver.max_cycles, 3);
        assert_eq!(config.resolver.max_attempts(), 9);
        let names: Vec<_> = config.resolver.identities.iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["ANDROID_VR", "WEB_EMBEDDED", "IOS"]);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("BIND_ADDR", "127.0.0.1"),
            ("RESOLVE_CLIENTS", "ios, android_vr"),
            ("RESOLVE_MAX_CYCLES", "1"),
            ("RESOLVE_TIMEOUT_MS", "500"),
            ("YOUTUBE_COOKIE", "  "),
            ("UPSTREAM_PROXY", "socks5://127.0.0.1:9050"),
        ])
        .unwrap();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8080");
        assert_eq!(config.resolver.max_attempts(), 2);
        assert_eq!(config.resolver.identities[0].name, "IOS");
        assert_eq!(config.resolver.timeout, Duration::from_millis(500));
        assert!(config.cookie.is_none());
        assert_eq!(config.upstream_proxy.as_deref(), Some("socks5://127.0.0.1:9050"));
    }

    #[test]
    fn test_malformed_values_are_errors() {
        assert!(matches!(
            config_from(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));
        assert!(matches!(
            config_from(&[("RESOLVE_CLIENTS", "ANDROID_VR,NOKIA")]),
            Err(ConfigError::UnknownIdentity(ref n)) if n == "NOKIA"
        ));
        assert!(matches!(
            config_from(&[("RESOLVE_MAX_CYCLES", "0")]),
            Err(ConfigError::Rejected(_))
        ));
        assert!(matches!(
            config_from(&[("RESOLVE_CLIENTS", " , ")]),
            Err(ConfigError::Rejected(_))
        ));
        assert!(config_from(&[("UPSTREAM_PROXY", "not a url")]).is_err());
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = ResolverConfig::default();
        assert_eq!(config.backoff_for(0), Duration::from_secs(2));
        assert_eq!(config.backoff_for(1), Duration::from_secs(4));
        assert_eq!(config.backoff_for(3), Duration::from_secs(16));
        assert_eq!(config.backoff_for(40), Duration::from_secs(16));
    }

    #[test]
    fn test_database_url_for_path() {
        let url = database_url_for(PathBuf::from("/var/lib/tube-relay/history.db"));
        assert_eq!(url, "sqlite:///var/lib/tube-relay/history.db?mode=rwc");
    }
}
