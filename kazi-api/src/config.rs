//! API Configuration Module
//!
//! Server-level settings: bind address, datastore backend, CORS and rate
//! limiting. Loaded from environment variables with development defaults.

use std::net::SocketAddr;
use std::time::Duration;

use kazi_core::ConfigError;

// ============================================================================
// DATASTORE SELECTION
// ============================================================================

/// Backend the gateway runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatastoreKind {
    #[default]
    Postgres,
    Memory,
}

impl std::str::FromStr for DatastoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DatastoreKind::Postgres),
            "memory" | "in-memory" | "inmemory" => Ok(DatastoreKind::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "KAZI_DATASTORE".to_string(),
                value: other.to_string(),
                reason: "expected postgres or memory".to_string(),
            }),
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Interface to bind (default 0.0.0.0)
    pub bind_host: String,

    /// Port to listen on (default 3000)
    pub port: u16,

    pub datastore: DatastoreKind,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    /// Example: "https://kazi.app,https://*.kazi.app"
    pub cors_origins: Vec<String>,

    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Rate Limiting Configuration
    // ========================================================================
    pub rate_limit_enabled: bool,

    /// Requests per minute for unauthenticated callers, keyed by IP.
    pub rate_limit_unauthenticated: u32,

    /// Requests per minute for authenticated callers, keyed by principal.
    pub rate_limit_authenticated: u32,

    /// Burst capacity on top of the steady rate.
    pub rate_limit_burst: u32,

    /// Minimum idle time before a caller's limiter may be dropped.
    pub rate_limit_window: Duration,

    /// Tracked callers before idle limiters are pruned.
    pub rate_limit_max_keys: usize,

    /// Take the client IP from `x-forwarded-for` / `x-real-ip`. Only safe
    /// behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,

    /// Upper bound on request handling time.
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 3000,
            datastore: DatastoreKind::Postgres,

            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 86400,

            rate_limit_enabled: true,
            rate_limit_unauthenticated: 100,
            rate_limit_authenticated: 1000,
            rate_limit_burst: 10,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max_keys: 10_000,
            trust_proxy_headers: false,

            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `KAZI_API_BIND`: interface to bind (default: 0.0.0.0)
    /// - `PORT` or `KAZI_API_PORT`: listen port (default: 3000)
    /// - `KAZI_DATASTORE`: `postgres` (default) or `memory`
    /// - `KAZI_CORS_ORIGINS`: comma-separated allowed origins (empty or `*` = allow all)
    /// - `KAZI_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `KAZI_CORS_MAX_AGE_SECS`: preflight cache duration (default: 86400)
    /// - `KAZI_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `KAZI_RATE_LIMIT_UNAUTHENTICATED`: requests per minute per IP (default: 100)
    /// - `KAZI_RATE_LIMIT_AUTHENTICATED`: requests per minute per principal (default: 1000)
    /// - `KAZI_RATE_LIMIT_BURST`: burst capacity (default: 10)
    /// - `KAZI_RATE_LIMIT_MAX_KEYS`: tracked callers before pruning (default: 10000)
    /// - `KAZI_TRUST_PROXY_HEADERS`: key anonymous callers by forwarded IP (default: false)
    /// - `KAZI_REQUEST_TIMEOUT_SECS`: request timeout (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let cors_origins = std::env::var("KAZI_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty() && o != "*")
                    .collect()
            })
            .unwrap_or_default();

        let port = match std::env::var("PORT").or_else(|_| std::env::var("KAZI_API_PORT")) {
            Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "PORT".to_string(),
                value: raw.clone(),
                reason: "expected a port number".to_string(),
            })?,
            Err(_) => defaults.port,
        };

        let datastore = match std::env::var("KAZI_DATASTORE") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.datastore,
        };

        Ok(Self {
            bind_host: std::env::var("KAZI_API_BIND").unwrap_or(defaults.bind_host),
            port,
            datastore,
            cors_origins,
            cors_allow_credentials: env_flag("KAZI_CORS_ALLOW_CREDENTIALS", false),
            cors_max_age_secs: env_parse("KAZI_CORS_MAX_AGE_SECS", defaults.cors_max_age_secs),
            rate_limit_enabled: env_flag("KAZI_RATE_LIMIT_ENABLED", true),
            rate_limit_unauthenticated: env_parse(
                "KAZI_RATE_LIMIT_UNAUTHENTICATED",
                defaults.rate_limit_unauthenticated,
            ),
            rate_limit_authenticated: env_parse(
                "KAZI_RATE_LIMIT_AUTHENTICATED",
                defaults.rate_limit_authenticated,
            ),
            rate_limit_burst: env_parse("KAZI_RATE_LIMIT_BURST", defaults.rate_limit_burst),
            rate_limit_window: defaults.rate_limit_window,
            rate_limit_max_keys: env_parse(
                "KAZI_RATE_LIMIT_MAX_KEYS",
                defaults.rate_limit_max_keys,
            ),
            trust_proxy_headers: env_flag("KAZI_TRUST_PROXY_HEADERS", false),
            request_timeout: Duration::from_secs(env_parse("KAZI_REQUEST_TIMEOUT_SECS", 30)),
        })
    }

    /// Socket address to bind the listener to.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.bind_host, self.port);
        raw.parse().map_err(|_| ConfigError::InvalidValue {
            field: "KAZI_API_BIND".to_string(),
            value: raw,
            reason: "expected an IP address".to_string(),
        })
    }

    /// Strict CORS applies once any origin is configured.
    pub fn has_cors_allowlist(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // *.kazi.app matches any https subdomain
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain.ends_with(&format!(".{}", pattern));
                }
            }
            false
        })
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default,
        })
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let previous = std::env::var(key).ok();
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.previous.as_deref() {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert!(!config.cors_allow_credentials);
        assert_eq!(config.cors_max_age_secs, 86400);
        assert!(config.rate_limit_enabled);
        assert_eq!(config.rate_limit_unauthenticated, 100);
        assert_eq!(config.rate_limit_authenticated, 1000);
        assert_eq!(config.rate_limit_burst, 10);
        assert_eq!(config.rate_limit_max_keys, 10_000);
        assert!(!config.trust_proxy_headers);
        assert_eq!(config.port, 3000);
        assert_eq!(config.datastore, DatastoreKind::Postgres);
    }

    #[test]
    fn test_from_env() -> Result<(), String> {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let _port = EnvVarGuard::set("PORT", Some("8081"));
        let _store = EnvVarGuard::set("KAZI_DATASTORE", Some("memory"));
        let _cors = EnvVarGuard::set("KAZI_CORS_ORIGINS", Some("*"));
        let _burst = EnvVarGuard::set("KAZI_RATE_LIMIT_BURST", Some("25"));
        let _enabled = EnvVarGuard::set("KAZI_RATE_LIMIT_ENABLED", Some("false"));
        let _proxy = EnvVarGuard::set("KAZI_TRUST_PROXY_HEADERS", Some("yes"));

        let config = ApiConfig::from_env().map_err(|e| e.to_string())?;
        assert_eq!(config.port, 8081);
        assert_eq!(config.datastore, DatastoreKind::Memory);
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.rate_limit_burst, 25);
        assert!(!config.rate_limit_enabled);
        assert!(config.trust_proxy_headers);
        Ok(())
    }

    #[test]
    fn test_from_env_rejects_unknown_datastore() {
        let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let _port = EnvVarGuard::set("PORT", None);
        let _store = EnvVarGuard::set("KAZI_DATASTORE", Some("mongo"));
        assert!(ApiConfig::from_env().is_err());
    }

    #[test]
    fn test_bind_addr() -> Result<(), String> {
        let config = ApiConfig::default();
        let addr = config.bind_addr().map_err(|e| e.to_string())?;
        assert_eq!(addr.port(), 3000);

        let bad = ApiConfig {
            bind_host: "not an ip".to_string(),
            ..ApiConfig::default()
        };
        assert!(bad.bind_addr().is_err());
        Ok(())
    }

    #[test]
    fn test_origin_allowed_dev_mode() {
        let config = ApiConfig::default();
        assert!(!config.has_cors_allowlist());
        assert!(config.is_origin_allowed("https://anything.com"));
    }

    #[test]
    fn test_origin_allowlist() {
        let config = ApiConfig {
            cors_origins: vec!["https://kazi.app".to_string(), "*.kazi.app".to_string()],
            ..ApiConfig::default()
        };

        assert!(config.is_origin_allowed("https://kazi.app"));
        assert!(config.is_origin_allowed("https://dashboard.kazi.app"));
        assert!(!config.is_origin_allowed("https://evil.com"));
        assert!(!config.is_origin_allowed("https://notkazi.app"));
    }
}
