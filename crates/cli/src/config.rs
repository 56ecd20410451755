//! Configuration management for the CLI
//!
//! Settings are layered: an optional file under
//! `~/.config/kube-resource-explorer/config.{toml,yaml,json}`, then `KRE_*`
//! environment variables, then command-line flags (applied by the caller).

use anyhow::{Context, Result};
use config::{Environment, File};
use explorer_lib::timeseries::cloud_monitoring::DEFAULT_ENDPOINT;
use explorer_lib::CloudMonitoringConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Defaults that flags do not override come from here
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Cloud project whose Monitoring API is queried
    pub project: Option<String>,
    /// OAuth bearer token for the Monitoring API
    pub access_token: Option<String>,
    /// Monitoring API base URL
    pub monitoring_endpoint: Option<String>,
    /// Concurrent metric queries
    pub workers: Option<usize>,
    /// Default namespace filter
    pub namespace: Option<String>,
    /// Per-query timeout in seconds
    pub query_timeout_secs: Option<u64>,
    /// Retries for rate-limited or unavailable responses
    pub max_retries: Option<u32>,
}

impl Settings {
    /// Load settings from the user config file and `KRE_*` variables
    pub fn load() -> Result<Self> {
        Self::from_sources(
            config_file_base(),
            Environment::with_prefix("KRE").try_parsing(true),
        )
    }

    fn from_sources(file_base: Option<PathBuf>, env: Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(base) = file_base {
            builder = builder.add_source(File::with_name(&base.to_string_lossy()).required(false));
        }

        builder
            .add_source(env)
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_secs.map(Duration::from_secs)
    }

    /// Backend settings with `project` taking precedence over the layered value
    pub fn cloud_monitoring(&self, project: Option<&str>) -> CloudMonitoringConfig {
        let defaults = CloudMonitoringConfig::default();
        CloudMonitoringConfig {
            project: project.map(str::to_string).or_else(|| self.project.clone()),
            access_token: self.access_token.clone(),
            endpoint: self
                .monitoring_endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            request_timeout: self.query_timeout().unwrap_or(defaults.request_timeout),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            ..defaults
        }
    }
}

/// `~/.config/kube-resource-explorer/config`, extension picked by the loader
fn config_file_base() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| {
        home.join(".config")
            .join("kube-resource-explorer")
            .join("config")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix("KRE").try_parsing(true).source(Some(map))
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::from_sources(Some(dir.path().join("config")), env(&[])).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "project = \"from-file\"\nworkers = 3\nnamespace = \"web\"\n",
        )
        .unwrap();

        let settings = Settings::from_sources(
            Some(dir.path().join("config")),
            env(&[("KRE_WORKERS", "9"), ("KRE_ACCESS_TOKEN", "secret")]),
        )
        .unwrap();

        assert_eq!(settings.project.as_deref(), Some("from-file"));
        assert_eq!(settings.namespace.as_deref(), Some("web"));
        assert_eq!(settings.workers, Some(9));
        assert_eq!(settings.access_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_cloud_monitoring_config() {
        let settings = Settings {
            project: Some("layered".into()),
            access_token: Some("token".into()),
            query_timeout_secs: Some(5),
            ..Default::default()
        };

        let config = settings.cloud_monitoring(Some("flag"));
        assert_eq!(config.project.as_deref(), Some("flag"));
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries, 3);

        let config = settings.cloud_monitoring(None);
        assert_eq!(config.project.as_deref(), Some("layered"));
    }
}
