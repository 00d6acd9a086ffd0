use config::{Config, ConfigError, Environment, File, Map};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Dataset holding the log table; overrides `bigquery.dataset`.
pub const BIGQUERY_DATASET_ENV: &str = "BIGQUERY_DATASET";
/// Log table name; overrides `bigquery.table`.
pub const BIGQUERY_TABLE_ENV: &str = "BIGQUERY_TABLE";
pub const GCP_PROJECT_ENV: &str = "GCP_PROJECT";
pub const PORT_ENV: &str = "PORT";
pub const TWILIO_AUTH_TOKEN_ENV: &str = "TWILIO_AUTH_TOKEN";

/// Application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// BigQuery log sink configuration
    pub bigquery: BigQueryConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 3000)
    pub port: u16,
    /// Route Twilio posts to (default: /webhooks/twilio)
    pub webhook_path: String,
}

/// BigQuery log sink configuration
///
/// Logging is disabled, not fatal, when `dataset` or `table` is missing.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BigQueryConfig {
    pub project: Option<String>,
    pub dataset: Option<String>,
    pub table: Option<String>,
    /// OAuth bearer token, sent as-is
    pub access_token: Option<String>,
    /// API base URL (default: https://bigquery.googleapis.com)
    pub base_url: String,
    /// Upper bound on one insert in milliseconds (default: 10000)
    pub timeout_ms: u64,
}

/// Security configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecurityConfig {
    /// Check X-Twilio-Signature on inbound requests (default: false)
    pub verify_signatures: bool,
    /// Twilio Auth Token used to check signatures
    pub auth_token: Option<String>,
    /// Public URL of the webhook exactly as Twilio calls it
    pub public_url: Option<String>,
    /// Maximum request body size in bytes (default: 1MB)
    pub max_body_size: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: json or pretty (default: json)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            webhook_path: "/webhooks/twilio".to_string(),
        }
    }
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            project: None,
            dataset: None,
            table: None,
            access_token: None,
            base_url: sms_bigquery::DEFAULT_BASE_URL.to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            verify_signatures: false,
            auth_token: None,
            public_url: None,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            bigquery: BigQueryConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(env::vars().collect())
    }

    /// Load configuration from files and the given environment snapshot
    pub fn load_from(vars: Map<String, String>) -> Result<Self, ConfigError> {
        let lookup = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();
        let run_mode = lookup("RUN_MODE").unwrap_or_else(|| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(Config::try_from(&AppConfig::default())?)
            // Add configuration file based on environment
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local configuration file (gitignored)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables (prefixed with SMSLOG__)
            .add_source(
                Environment::with_prefix("SMSLOG")
                    .separator("__")
                    .source(Some(vars.clone())),
            )
            // Conventional deployment variables win over everything else
            .set_override_option("bigquery.dataset", lookup(BIGQUERY_DATASET_ENV))?
            .set_override_option("bigquery.table", lookup(BIGQUERY_TABLE_ENV))?
            .set_override_option("bigquery.project", lookup(GCP_PROJECT_ENV))?
            .set_override_option("server.port", lookup(PORT_ENV))?
            .set_override_option("security.auth_token", lookup(TWILIO_AUTH_TOKEN_ENV))?
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.verify_signatures {
            if is_blank(&self.security.auth_token) {
                return Err(ConfigError::Message(format!(
                    "security.verify_signatures requires security.auth_token or {}",
                    TWILIO_AUTH_TOKEN_ENV
                )));
            }
            if is_blank(&self.security.public_url) {
                return Err(ConfigError::Message(
                    "security.verify_signatures requires security.public_url".into(),
                ));
            }
        }
        if !self.server.webhook_path.starts_with('/') {
            return Err(ConfigError::Message(format!(
                "server.webhook_path must start with '/': {:?}",
                self.server.webhook_path
            )));
        }
        if self.bigquery.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "bigquery.timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn log_timeout(&self) -> Duration {
        Duration::from_millis(self.bigquery.timeout_ms)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_leave_bigquery_unconfigured() {
        let config = AppConfig::load_from(vars(&[])).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.webhook_path, "/webhooks/twilio");
        assert!(config.bigquery.dataset.is_none());
        assert!(config.bigquery.table.is_none());
        assert!(!config.security.verify_signatures);
        assert_eq!(config.log_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn deployment_variables_are_honoured() {
        let config = AppConfig::load_from(vars(&[
            ("BIGQUERY_DATASET", "sms"),
            ("BIGQUERY_TABLE", "opt_outs"),
            ("GCP_PROJECT", "proj"),
            ("PORT", "8080"),
        ]))
        .unwrap();
        assert_eq!(config.bigquery.dataset.as_deref(), Some("sms"));
        assert_eq!(config.bigquery.table.as_deref(), Some("opt_outs"));
        assert_eq!(config.bigquery.project.as_deref(), Some("proj"));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn prefixed_variables_fill_nested_keys() {
        let config = AppConfig::load_from(vars(&[
            ("SMSLOG__BIGQUERY__TIMEOUT_MS", "250"),
            ("SMSLOG__LOGGING__FORMAT", "pretty"),
        ]))
        .unwrap();
        assert_eq!(config.log_timeout(), Duration::from_millis(250));
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn empty_deployment_variable_counts_as_unset() {
        let config = AppConfig::load_from(vars(&[("BIGQUERY_DATASET", "")])).unwrap();
        assert!(config.bigquery.dataset.is_none());
    }

    #[test]
    fn signature_checks_need_token_and_url() {
        let mut config = AppConfig::default();
        config.security.verify_signatures = true;
        assert!(config.validate().is_err());

        config.security.auth_token = Some("token".into());
        assert!(config.validate().is_err());

        config.security.public_url = Some("https://example.com/webhooks/twilio".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_log_timeout_is_rejected() {
        let err = AppConfig::load_from(vars(&[("SMSLOG__BIGQUERY__TIMEOUT_MS", "0")])).unwrap_err();
        assert!(err.to_string().contains("timeout_ms"));

        let mut config = AppConfig::default();
        config.bigquery.timeout_ms = 1;
        assert!(config.validate().is_ok());
    }
}
