//! Layered configuration: built-in defaults < config file < environment
//! variables, assembled with the `config` crate.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Server-wide settings. No Postgres/MinIO/Elasticsearch/Redis blocks here —
/// this service persists to SQLite and a filesystem artifact store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_env")]
    pub app_env: String,
    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    #[serde(default = "default_auth_required")]
    pub auth_required: bool,
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub artifact_root: Option<String>,

    #[serde(default = "default_max_concurrent_containers")]
    pub max_concurrent_containers: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_app_name() -> String {
    "wishub-skill".to_string()
}
fn default_env() -> String {
    "development".to_string()
}
fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}
fn default_bind_port() -> u16 {
    8000
}
fn default_auth_required() -> bool {
    false
}
fn default_max_concurrent_containers() -> usize {
    num_cpus::get() * 2
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            app_name: default_app_name(),
            app_env: default_env(),
            debug: false,
            bind_host: default_bind_host(),
            bind_port: default_bind_port(),
            auth_required: default_auth_required(),
            api_key: None,
            database_path: None,
            artifact_root: None,
            max_concurrent_containers: default_max_concurrent_containers(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Settings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }

    /// Load defaults, then a config file if present, then `WISHUB_*`
    /// environment variables — each layer overriding the previous.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?);

        if let Some(path) = config_file {
            if path.exists() {
                builder = builder.add_source(config::File::from(path.to_path_buf()));
            }
        }

        let built = builder
            .add_source(config::Environment::with_prefix("WISHUB").separator("__"))
            .build()
            .context("failed to assemble configuration")?;

        built
            .try_deserialize()
            .context("failed to parse configuration")
    }
}
