use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::refresh::RefreshConfig;

pub const ENV_API_URL: &str = "CAMPUS_API_URL";
pub const ENV_API_TOKEN: &str = "CAMPUS_API_TOKEN";
pub const ENV_TIMEOUT_MS: &str = "CAMPUS_TIMEOUT_MS";
pub const ENV_REFRESH_MS: &str = "CAMPUS_REFRESH_MS";
pub const ENV_AUTO_REFRESH: &str = "CAMPUS_AUTO_REFRESH";
pub const ENV_STUDENT_ID: &str = "CAMPUS_STUDENT_ID";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    Io { path: String, message: String },
    #[error("invalid config file {path}: {message}")]
    Parse { path: String, message: String },
    #[error("invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Student whose enrolled subjects the dashboard follows.
    #[serde(default)]
    pub student_id: Option<i64>,
}

fn default_api_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_token: None,
            request_timeout_ms: default_request_timeout_ms(),
            refresh: RefreshConfig::default(),
            student_id: None,
        }
    }
}

impl SyncConfig {
    /// Read the JSON file at `path` (defaults when `None`), apply environment
    /// overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Apply `CAMPUS_*` overrides looked up through `lookup`. Blank values are
    /// ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(url) = get(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(token) = get(ENV_API_TOKEN) {
            self.api_token = Some(token);
        }
        if let Some(raw) = get(ENV_TIMEOUT_MS) {
            self.request_timeout_ms = parse_env(ENV_TIMEOUT_MS, raw)?;
        }
        if let Some(raw) = get(ENV_REFRESH_MS) {
            self.refresh.interval_ms = parse_env(ENV_REFRESH_MS, raw)?;
        }
        if let Some(raw) = get(ENV_AUTO_REFRESH) {
            self.refresh.enabled = match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::Env {
                        key: ENV_AUTO_REFRESH,
                        value: raw,
                    })
                }
            };
        }
        if let Some(raw) = get(ENV_STUDENT_ID) {
            self.student_id = Some(parse_env(ENV_STUDENT_ID, raw)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_base_url cannot be empty".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        self.refresh
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Env { key, value: raw })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_file_values_fill_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "api_base_url": "https://school.example/api", "refresh": {{ "interval_ms": 5000 }} }}"#
        )
        .unwrap();

        let config = SyncConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api_base_url, "https://school.example/api");
        assert_eq!(config.refresh.interval_ms, 5_000);
        assert!(config.refresh.enabled);
        assert_eq!(config.request_timeout_ms, 15_000);
        assert_eq!(config.student_id, None);
    }

    #[test]
    fn test_env_overrides_win_and_blank_values_are_ignored() {
        let mut config = SyncConfig::default();
        config
            .apply_overrides(lookup(&[
                (ENV_API_URL, "https://override.example"),
                (ENV_API_TOKEN, "   "),
                (ENV_REFRESH_MS, "2000"),
                (ENV_AUTO_REFRESH, "off"),
                (ENV_STUDENT_ID, "1000"),
            ]))
            .unwrap();

        assert_eq!(config.api_base_url, "https://override.example");
        assert_eq!(config.api_token, None);
        assert_eq!(config.refresh, RefreshConfig::new(std::time::Duration::from_secs(2), false));
        assert_eq!(config.student_id, Some(1000));
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let mut config = SyncConfig::default();
        let err = config
            .apply_overrides(lookup(&[(ENV_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: ENV_TIMEOUT_MS, .. }));
    }

    #[test]
    fn test_validation_rejects_zero_interval() {
        let mut config = SyncConfig::default();
        config.refresh.interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SyncConfig::from_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
