//! Engine configuration from environment variables

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::connectivity::ConnectivitySettings;
use crate::db::RemoteConfig;
use crate::dispatcher::DispatcherSettings;
use crate::orchestrator::{OrchestratorSettings, MIN_SCHEMA_RETRY};
use crate::util::is_http_url;

/// Local store file name inside the data directory
pub const LOCAL_DB_FILE_NAME: &str = "stockroom.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything needed to wire the sync engine.
///
/// `Debug` output never includes the remote auth token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEngineConfig {
    /// Bypass the local store and talk to the remote store directly
    pub direct_remote: bool,
    pub remote: RemoteConfig,
    /// Holds the local store and the persisted queue
    pub data_dir: PathBuf,
    pub connectivity: ConnectivitySettings,
    /// Generic HTTP endpoints used as a fallback reachability signal
    pub probe_urls: Vec<String>,
    pub orchestrator: OrchestratorSettings,
    pub dispatcher: DispatcherSettings,
    /// Registered tables required for a valid local store; all when unset
    pub min_tables: Option<usize>,
}

impl SyncEngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let direct_remote = parse_bool(&lookup, "STOCKROOM_DIRECT_REMOTE", false)?;

        let url = required_trimmed(&lookup, "TURSO_DATABASE_URL")?;
        if !is_remote_url(&url) {
            return Err(ConfigError::Invalid(
                "TURSO_DATABASE_URL must start with libsql://, https://, http://, wss:// or ws://"
                    .to_string(),
            ));
        }
        let auth_token = required_trimmed(&lookup, "TURSO_AUTH_TOKEN")?;

        let data_dir = match optional_trimmed(&lookup, "STOCKROOM_DATA_DIR") {
            Some(path) => PathBuf::from(path),
            None => default_data_dir().ok_or_else(|| {
                ConfigError::Invalid(
                    "Cannot determine a data directory; set STOCKROOM_DATA_DIR".to_string(),
                )
            })?,
        };

        let connectivity = ConnectivitySettings {
            timeout: Duration::from_secs(parse_in_range(
                &lookup,
                "STOCKROOM_CONNECTIVITY_TIMEOUT_SECS",
                5,
                1..=60,
            )?),
            retries: u32::try_from(parse_in_range(
                &lookup,
                "STOCKROOM_CONNECTIVITY_RETRIES",
                2,
                0..=10,
            )?)
            .map_err(|_| {
                ConfigError::Invalid("STOCKROOM_CONNECTIVITY_RETRIES is too large".to_string())
            })?,
            interval: Duration::from_secs(parse_in_range(
                &lookup,
                "STOCKROOM_CONNECTIVITY_INTERVAL_SECS",
                30,
                5..=3_600,
            )?),
        };

        let probe_urls: Vec<String> = optional_trimmed(&lookup, "STOCKROOM_PROBE_URLS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if let Some(invalid) = probe_urls.iter().find(|url| !is_http_url(url)) {
            return Err(ConfigError::Invalid(format!(
                "STOCKROOM_PROBE_URLS entry '{invalid}' must start with http:// or https://"
            )));
        }

        let orchestrator = OrchestratorSettings {
            relax_remote_fk: parse_bool(&lookup, "STOCKROOM_RELAX_REMOTE_FK", true)?,
            transaction_timeout: Duration::from_secs(parse_in_range(
                &lookup,
                "STOCKROOM_REMOTE_TXN_TIMEOUT_SECS",
                60,
                5..=3_600,
            )?),
            schema_retry_after: Duration::from_secs(parse_in_range(
                &lookup,
                "STOCKROOM_SCHEMA_RETRY_SECS",
                MIN_SCHEMA_RETRY.as_secs(),
                MIN_SCHEMA_RETRY.as_secs()..=86_400,
            )?),
        };

        let dispatcher = DispatcherSettings {
            timeout: Duration::from_secs(parse_in_range(
                &lookup,
                "STOCKROOM_DISPATCH_TIMEOUT_SECS",
                10,
                1..=300,
            )?),
            capacity: usize::try_from(parse_in_range(
                &lookup,
                "STOCKROOM_DISPATCH_CAPACITY",
                256,
                1..=65_536,
            )?)
            .map_err(|_| {
                ConfigError::Invalid("STOCKROOM_DISPATCH_CAPACITY is too large".to_string())
            })?,
        };

        let min_tables = match optional_trimmed(&lookup, "STOCKROOM_MIN_TABLES") {
            Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
                ConfigError::Invalid("STOCKROOM_MIN_TABLES must be a non-negative integer".into())
            })?),
            None => None,
        };

        Ok(Self {
            direct_remote,
            remote: RemoteConfig::new(url, auth_token),
            data_dir,
            connectivity,
            probe_urls,
            orchestrator,
            dispatcher,
            min_tables,
        })
    }

    /// Path of the local store file
    pub fn local_db_path(&self) -> PathBuf {
        self.data_dir.join(LOCAL_DB_FILE_NAME)
    }

    /// Replace the data directory (e.g. from a command-line flag)
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }
}

/// Per-user application data directory
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .map(|dir| dir.join("stockroom"))
}

fn is_remote_url(value: &str) -> bool {
    ["libsql://", "https://", "http://", "wss://", "ws://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

fn parse_bool(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid(format!(
            "{name} must be a boolean (true/false)"
        ))),
    }
}

fn parse_in_range(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let invalid = || {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    };
    let value = value_or_default(lookup, name, &default.to_string())
        .parse::<u64>()
        .map_err(|_| invalid())?;
    if !range.contains(&value) {
        return Err(invalid());
    }
    Ok(value)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<SyncEngineConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        SyncEngineConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("TURSO_DATABASE_URL", "libsql://shop.turso.io"),
        ("TURSO_AUTH_TOKEN", "sensitive-token"),
        ("STOCKROOM_DATA_DIR", "/tmp/stockroom"),
    ];

    #[test]
    fn config_requires_remote_url() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("TURSO_DATABASE_URL"));
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = config_from(REQUIRED).unwrap();
        assert!(!config.direct_remote);
        assert_eq!(config.connectivity, ConnectivitySettings::default());
        assert_eq!(config.orchestrator, OrchestratorSettings::default());
        assert_eq!(config.dispatcher, DispatcherSettings::default());
        assert!(config.probe_urls.is_empty());
        assert_eq!(config.min_tables, None);
        assert_eq!(
            config.local_db_path(),
            PathBuf::from("/tmp/stockroom").join(LOCAL_DB_FILE_NAME)
        );
    }

    #[test]
    fn config_redacts_auth_token() {
        let config = config_from(REQUIRED).unwrap();
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("sensitive-token"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn schema_retry_cannot_drop_below_five_minutes() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("STOCKROOM_SCHEMA_RETRY_SECS", "60"));
        let err = config_from(&pairs).unwrap_err();
        assert!(err.to_string().contains("STOCKROOM_SCHEMA_RETRY_SECS"));
    }

    #[test]
    fn parses_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("STOCKROOM_DIRECT_REMOTE", "yes"),
            ("STOCKROOM_CONNECTIVITY_TIMEOUT_SECS", "3"),
            ("STOCKROOM_CONNECTIVITY_RETRIES", "0"),
            ("STOCKROOM_PROBE_URLS", "https://example.com, http://10.0.0.1/health"),
            ("STOCKROOM_RELAX_REMOTE_FK", "false"),
            ("STOCKROOM_MIN_TABLES", "3"),
        ]);
        let config = config_from(&pairs).unwrap();
        assert!(config.direct_remote);
        assert_eq!(config.connectivity.timeout, Duration::from_secs(3));
        assert_eq!(config.connectivity.retries, 0);
        assert_eq!(
            config.probe_urls,
            vec!["https://example.com", "http://10.0.0.1/health"]
        );
        assert!(!config.orchestrator.relax_remote_fk);
        assert_eq!(config.min_tables, Some(3));
    }

    #[test]
    fn rejects_invalid_values() {
        for (name, value) in [
            ("STOCKROOM_CONNECTIVITY_TIMEOUT_SECS", "0"),
            ("STOCKROOM_DISPATCH_CAPACITY", "lots"),
            ("STOCKROOM_DIRECT_REMOTE", "maybe"),
            ("STOCKROOM_PROBE_URLS", "ftp://example.com"),
            ("TURSO_DATABASE_URL", "postgres://db"),
        ] {
            let mut pairs: Vec<(&str, &str)> = REQUIRED
                .iter()
                .copied()
                .filter(|(key, _)| *key != name)
                .collect();
            pairs.push((name, value));
            let err = config_from(&pairs).unwrap_err();
            assert!(err.to_string().contains(name), "{name}: {err}");
        }
    }
}
