//! Configuration loading and constants.
//!
//! Configuration is resolved once at startup from built-in defaults, an optional
//! TOML file and the `API_KEY` / `CONCURRENCY_LIMIT` environment variables (in
//! increasing priority). The resulting `AppConfig` is immutable and shared
//! behind an `Arc` by the dispatcher and the HTTP layer.

use const_format::concatcp;
use serde::Deserialize;
use std::path::Path;

// =============================================================================
// HTTP Listener Constants
// =============================================================================

/// Default bind address
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";

/// Default listening port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Handler-level deadline in seconds; an expired request tears down its probe
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Deadline for reading request headers on a connection
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 5;

/// How long graceful shutdown waits for in-flight requests to drain
pub const GRACEFUL_SHUTDOWN_SECS: u64 = 30;

// =============================================================================
// Admission Constants
// =============================================================================

/// Number of probes allowed to run concurrently when nothing valid is configured
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 20;

// =============================================================================
// Probe Constants
// =============================================================================

/// External ICMP echo utility, looked up on PATH
pub const DEFAULT_PING_BINARY: &str = "ping";

/// Echo requests sent per ping probe
pub const DEFAULT_PING_COUNT: u32 = 3;

/// Per-echo reply timeout in seconds
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 2;

/// Client-level timeout for HEAD probes
pub const DEFAULT_HTTP_PROBE_TIMEOUT_SECS: u64 = 5;

/// User-Agent sent with HTTP probes
pub const PROBE_USER_AGENT: &str =
    concatcp!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Environment and Logging
// =============================================================================

/// Environment variable holding the shared credential
pub const API_KEY_ENV: &str = "API_KEY";

/// Environment variable holding the concurrency limit
pub const CONCURRENCY_LIMIT_ENV: &str = "CONCURRENCY_LIMIT";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "hostprobe=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// HTTP listener configuration
    #[serde(default)]
    pub http: HttpServerConfig,
    /// Request authorization
    #[serde(default)]
    pub auth: AuthConfig,
    /// Admission limits
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Probe executor settings
    #[serde(default)]
    pub probe: ProbeConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "HttpServerConfig::default_host")]
    pub host: String,
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
    /// Handler deadline; expiry cancels the in-flight probe
    #[serde(default = "HttpServerConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Request header read deadline
    #[serde(default = "HttpServerConfig::default_read_timeout")]
    pub read_timeout_seconds: u64,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            request_timeout_seconds: Self::default_request_timeout(),
            read_timeout_seconds: Self::default_read_timeout(),
        }
    }
}

impl HttpServerConfig {
    fn default_host() -> String {
        DEFAULT_HTTP_HOST.to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_HTTP_PORT
    }

    fn default_request_timeout() -> u64 {
        DEFAULT_REQUEST_TIMEOUT_SECS
    }

    fn default_read_timeout() -> u64 {
        DEFAULT_READ_TIMEOUT_SECS
    }
}

/// Shared-credential authorization.
///
/// When no credential is configured every request is authorized. This is the
/// documented insecure default and is announced with a warning at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    pub api_key: Option<String>,
}

impl AuthConfig {
    /// The configured credential, treating an empty string as unset
    pub fn credential(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.is_empty())
    }
}

/// Admission limits.
///
/// The raw value is kept as configured so that an invalid setting can fall back
/// to the default with a warning instead of failing startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsConfig {
    pub concurrency_limit: Option<toml::Value>,
}

/// Outcome of resolving the configured concurrency limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitSetting {
    /// Nothing configured
    Default,
    /// A positive integer was configured
    Configured(usize),
    /// Something was configured but is not a positive integer
    Invalid(String),
}

impl LimitsConfig {
    pub fn resolve(&self) -> LimitSetting {
        let Some(raw) = &self.concurrency_limit else {
            return LimitSetting::Default;
        };

        let parsed = match raw {
            toml::Value::Integer(n) => usize::try_from(*n).ok(),
            toml::Value::String(s) if s.is_empty() => return LimitSetting::Default,
            toml::Value::String(s) => s.parse::<usize>().ok(),
            _ => None,
        };

        match parsed {
            Some(limit) if limit > 0 => LimitSetting::Configured(limit),
            _ => LimitSetting::Invalid(match raw {
                toml::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        }
    }

    /// Effective gate capacity
    pub fn concurrency_limit(&self) -> usize {
        match self.resolve() {
            LimitSetting::Configured(limit) => limit,
            LimitSetting::Default | LimitSetting::Invalid(_) => DEFAULT_CONCURRENCY_LIMIT,
        }
    }
}

/// Probe executor settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "ProbeConfig::default_ping_binary")]
    pub ping_binary: String,
    #[serde(default = "ProbeConfig::default_ping_count")]
    pub ping_count: u32,
    #[serde(default = "ProbeConfig::default_ping_timeout")]
    pub ping_timeout_seconds: u64,
    #[serde(default = "ProbeConfig::default_http_timeout")]
    pub http_timeout_seconds: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ping_binary: Self::default_ping_binary(),
            ping_count: Self::default_ping_count(),
            ping_timeout_seconds: Self::default_ping_timeout(),
            http_timeout_seconds: Self::default_http_timeout(),
        }
    }
}

impl ProbeConfig {
    fn default_ping_binary() -> String {
        DEFAULT_PING_BINARY.to_string()
    }

    fn default_ping_count() -> u32 {
        DEFAULT_PING_COUNT
    }

    fn default_ping_timeout() -> u64 {
        DEFAULT_PING_TIMEOUT_SECS
    }

    fn default_http_timeout() -> u64 {
        DEFAULT_HTTP_PROBE_TIMEOUT_SECS
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Override file values with `API_KEY` and `CONCURRENCY_LIMIT`.
    ///
    /// A variable that is set but empty counts as unset and leaves the file
    /// value in place. Takes a lookup function so tests don't have to touch the
    /// process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(key) = non_empty(API_KEY_ENV) {
            self.auth.api_key = Some(key);
        }
        if let Some(limit) = non_empty(CONCURRENCY_LIMIT_ENV) {
            self.limits.concurrency_limit = Some(toml::Value::String(limit));
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.probe.ping_count == 0 {
            return Err(ConfigError::Validation(
                "probe.ping_count must be at least 1".to_string(),
            ));
        }
        if self.http.request_timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "http.request_timeout_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective admission gate capacity
    pub fn concurrency_limit(&self) -> usize {
        self.limits.concurrency_limit()
    }

    /// Log the resolved configuration, warning about insecure or rejected settings.
    pub fn log_summary(&self) {
        if self.auth.credential().is_none() {
            tracing::warn!("API_KEY not set, all requests are authorized");
        }

        if let LimitSetting::Invalid(raw) = self.limits.resolve() {
            tracing::warn!(
                value = %raw,
                default = DEFAULT_CONCURRENCY_LIMIT,
                "Invalid CONCURRENCY_LIMIT, using default"
            );
        }

        tracing::info!(
            limit = self.concurrency_limit(),
            "Concurrency limit set to {}",
            self.concurrency_limit()
        );
        tracing::debug!(
            ping_binary = %self.probe.ping_binary,
            ping_count = self.probe.ping_count,
            ping_timeout_seconds = self.probe.ping_timeout_seconds,
            http_timeout_seconds = self.probe.http_timeout_seconds,
            request_timeout_seconds = self.http.request_timeout_seconds,
            "Probe settings"
        );
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.http.port, DEFAULT_HTTP_PORT);
        assert_eq!(config.concurrency_limit(), DEFAULT_CONCURRENCY_LIMIT);
        assert_eq!(config.probe.ping_count, 3);
        assert_eq!(config.probe.ping_timeout_seconds, 2);
        assert_eq!(config.probe.http_timeout_seconds, 5);
        assert!(config.auth.credential().is_none());
        assert!(!config.logging.is_json());
    }

    #[test]
    fn test_empty_api_key_disables_auth() {
        let auth = AuthConfig {
            api_key: Some(String::new()),
        };
        assert!(auth.credential().is_none());
    }

    #[test]
    fn test_env_overrides_credential_and_limit() {
        let mut config = AppConfig::default();
        config.apply_env(env_of(&[("API_KEY", "s3cret"), ("CONCURRENCY_LIMIT", "7")]));
        assert_eq!(config.auth.credential(), Some("s3cret"));
        assert_eq!(config.limits.resolve(), LimitSetting::Configured(7));
        assert_eq!(config.concurrency_limit(), 7);
    }

    #[test]
    fn test_invalid_limit_falls_back_to_default() {
        for raw in ["0", "-3", "lots", "2.5"] {
            let mut config = AppConfig::default();
            config.limits.concurrency_limit = Some(toml::Value::String(raw.to_string()));
            assert_eq!(config.limits.resolve(), LimitSetting::Invalid(raw.to_string()));
            assert_eq!(config.concurrency_limit(), DEFAULT_CONCURRENCY_LIMIT);
        }
    }

    #[test]
    fn test_empty_limit_env_is_default_not_invalid() {
        let mut config = AppConfig::default();
        config.apply_env(env_of(&[("CONCURRENCY_LIMIT", "")]));
        assert_eq!(config.limits.resolve(), LimitSetting::Default);
    }

    #[test]
    fn test_empty_env_keeps_file_values() {
        let mut config: AppConfig =
            toml::from_str("[auth]\napi_key = \"from-file\"\n[limits]\nconcurrency_limit = 4\n")
                .unwrap();
        config.apply_env(env_of(&[("API_KEY", ""), ("CONCURRENCY_LIMIT", "")]));
        assert_eq!(config.auth.credential(), Some("from-file"));
        assert_eq!(config.limits.resolve(), LimitSetting::Configured(4));
        assert_eq!(config.concurrency_limit(), 4);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[http]
port = 8080

[auth]
api_key = "from-file"

[limits]
concurrency_limit = 4

[probe]
ping_binary = "/bin/ping"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.http.host, DEFAULT_HTTP_HOST);
        assert_eq!(config.auth.credential(), Some("from-file"));
        assert_eq!(config.concurrency_limit(), 4);
        assert_eq!(config.probe.ping_binary, "/bin/ping");
        assert_eq!(config.probe.ping_count, DEFAULT_PING_COUNT);
        assert!(config.logging.is_json());
    }

    #[test]
    fn test_shipped_sample_config_parses() {
        let config: AppConfig = toml::from_str(include_str!("../dist/hostprobe.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency_limit(), DEFAULT_CONCURRENCY_LIMIT);
        assert!(config.auth.credential().is_none());
    }

    #[test]
    fn test_negative_limit_in_file_is_invalid() {
        let config: AppConfig = toml::from_str("[limits]\nconcurrency_limit = -1\n").unwrap();
        assert_eq!(config.limits.resolve(), LimitSetting::Invalid("-1".to_string()));
        assert_eq!(config.concurrency_limit(), DEFAULT_CONCURRENCY_LIMIT);
    }

    #[test]
    fn test_zero_ping_count_rejected() {
        let config: AppConfig = toml::from_str("[probe]\nping_count = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AppConfig::from_file("/nonexistent/hostprobe.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
