// src/config.rs

use anyhow::{Context, bail};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::ct_log::{Log, LogListFetcher, mmd_from_secs};
use crate::interval::Interval;
use crate::metrics::MetricsConfig;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TemporalIntervalConfig {
    pub start_inclusive: String,
    pub end_exclusive: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Base64 DER SubjectPublicKeyInfo
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default = "default_mmd_secs")]
    pub mmd_secs: u64,
    #[serde(default)]
    pub temporal_interval: Option<TemporalIntervalConfig>,
    /// Used to fill in the key, MMD and interval when no key is configured
    #[serde(default)]
    pub log_list_url: Option<String>,
}

fn default_mmd_secs() -> u64 { 86400 }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            url: None,
            name: None,
            public_key: None,
            mmd_secs: default_mmd_secs(),
            temporal_interval: None,
            log_list_url: None,
        }
    }
}

/// Periods in seconds; 0 disables the activity
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PeriodsConfig {
    #[serde(default)]
    pub get_sth_secs: u64,
    #[serde(default)]
    pub get_roots_secs: u64,
    #[serde(default)]
    pub add_chain_secs: u64,
    #[serde(default = "default_watch_roots_poll_secs")]
    pub watch_roots_poll_secs: u64,
}

fn default_watch_roots_poll_secs() -> u64 { 10 }

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SubmitterConfig {
    /// PEM chain, leaf first
    #[serde(default)]
    pub chain_file: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub enabled: bool,
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "postgresql://localhost/ctmonitor".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub periods: PeriodsConfig,
    #[serde(default)]
    pub submitter: SubmitterConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(cfg)
    }
}

impl LogConfig {
    pub fn temporal_interval(&self) -> anyhow::Result<Option<Interval>> {
        self.temporal_interval
            .as_ref()
            .map(|t| Interval::parse_rfc3339(&t.start_inclusive, &t.end_exclusive))
            .transpose()
            .context("Invalid temporal_interval")
    }

    /// Build the monitored [`Log`].
    ///
    /// A configured public key wins; otherwise the Log's entry in the log
    /// list provides key, MMD and interval. A configured name replaces the
    /// list's description.
    pub async fn resolve(&self) -> anyhow::Result<Log> {
        let url = match self.url.as_deref() {
            Some(url) if !url.is_empty() => url,
            _ => bail!("No Log URL configured"),
        };

        if let Some(key) = &self.public_key {
            let name = match self.name.as_deref() {
                Some(name) if !name.is_empty() => name,
                _ => bail!("No Log name configured for {}", url),
            };
            return Log::new(
                url,
                name,
                key,
                mmd_from_secs(self.mmd_secs)?,
                self.temporal_interval()?,
            );
        }

        let Some(list_url) = &self.log_list_url else {
            bail!("No public key or log list URL configured for {}", url);
        };
        let mut log = LogListFetcher::new()?.fetch_log(list_url, url).await?;
        // The configured URL is the one requests are made against.
        log.url = url.to_string();
        if let Some(name) = &self.name {
            log.name = name.clone();
        }
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::ct_log::testdata::PILOT_KEY_B64;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(toml_content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_config_from_valid_toml() {
        let toml_content = format!(
            r#"
[log]
url = "https://ct.googleapis.com/pilot"
name = "pilot"
public_key = "{}"
mmd_secs = 3600
temporal_interval = {{ start_inclusive = "2019-01-01T00:00:00Z", end_exclusive = "2020-01-01T00:00:00Z" }}

[periods]
get_sth_secs = 60
get_roots_secs = 3600

[submitter]
chain_file = "chain.pem"

[webhook]
url = "https://example.com/webhook"
secret = "test_secret"
timeout_secs = 5

[metrics]
enabled = true
export_interval_secs = 30

[logging]
level = "debug"
"#,
            PILOT_KEY_B64
        );
        let temp_file = write_config(&toml_content);

        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(config.log.url.as_deref(), Some("https://ct.googleapis.com/pilot"));
        assert_eq!(config.log.name.as_deref(), Some("pilot"));
        assert_eq!(config.log.mmd_secs, 3600);
        assert!(config.log.temporal_interval().unwrap().is_some());
        assert_eq!(config.periods.get_sth_secs, 60);
        assert_eq!(config.periods.get_roots_secs, 3600);
        assert_eq!(config.periods.add_chain_secs, 0);
        assert_eq!(config.periods.watch_roots_poll_secs, 10);
        assert_eq!(config.submitter.chain_file.as_deref(), Some("chain.pem"));
        let webhook = config.webhook.as_ref().unwrap();
        assert_eq!(webhook.url, "https://example.com/webhook");
        assert_eq!(webhook.secret, Some("test_secret".to_string()));
        assert_eq!(webhook.timeout_secs, Some(5));
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.export_interval_secs, 30);
        assert!(!config.database.enabled);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_config_minimal_toml() {
        let temp_file = write_config(
            r#"
[log]
url = "https://ct.example.com/"
"#,
        );

        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(config.log.mmd_secs, 86400);
        assert_eq!(config.periods.get_sth_secs, 0);
        assert!(config.webhook.is_none());
        assert!(!config.metrics.enabled);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_invalid_toml() {
        let temp_file = write_config("invalid toml content {{{");
        assert!(Config::from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_config_nonexistent_file() {
        let err = Config::from_file(Path::new("/nonexistent/path/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_inverted_temporal_interval() {
        let cfg = LogConfig {
            temporal_interval: Some(TemporalIntervalConfig {
                start_inclusive: "2020-01-01T00:00:00Z".to_string(),
                end_exclusive: "2019-01-01T00:00:00Z".to_string(),
            }),
            ..Default::default()
        };
        assert!(cfg.temporal_interval().is_err());
    }

    #[tokio::test]
    async fn test_resolve_with_key() {
        let cfg = LogConfig {
            url: Some("https://ct.googleapis.com/pilot".to_string()),
            name: Some("pilot".to_string()),
            public_key: Some(PILOT_KEY_B64.to_string()),
            mmd_secs: 60,
            ..Default::default()
        };
        let log = cfg.resolve().await.unwrap();
        assert_eq!(log.name, "pilot");
        assert_eq!(log.mmd, Duration::seconds(60));
        assert!(log.temporal_interval.is_none());
    }

    #[tokio::test]
    async fn test_resolve_mmd_out_of_range() {
        let cfg = LogConfig {
            url: Some("https://ct.googleapis.com/pilot".to_string()),
            name: Some("pilot".to_string()),
            public_key: Some(PILOT_KEY_B64.to_string()),
            mmd_secs: u64::MAX,
            ..Default::default()
        };
        let err = cfg.resolve().await.unwrap_err();
        assert!(err.to_string().contains("out of range"), "{}", err);
    }

    #[tokio::test]
    async fn test_resolve_missing_fields() {
        let no_url = LogConfig::default();
        assert!(no_url.resolve().await.is_err());

        let no_key = LogConfig {
            url: Some("https://ct.example.com/".to_string()),
            name: Some("example".to_string()),
            ..Default::default()
        };
        let err = no_key.resolve().await.unwrap_err();
        assert!(err.to_string().contains("No public key or log list URL"));

        let no_name = LogConfig {
            url: Some("https://ct.example.com/".to_string()),
            public_key: Some(PILOT_KEY_B64.to_string()),
            ..Default::default()
        };
        let err = no_name.resolve().await.unwrap_err();
        assert!(err.to_string().contains("No Log name"));
    }
}
