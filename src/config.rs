use std::path::PathBuf;

use anyhow::{Context, Error};
use config::{Config, Environment, File};

use crate::domain::model::{GlobalPolicy, ManagedContainer};

#[derive(Debug, Clone, serde_derive::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub docker_socket: String,
    pub state_dir: PathBuf,
    pub containers: Vec<ManagedContainer>,
    pub global: GlobalPolicy,
    pub health: HealthConfig,
    pub telegram: TelegramConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            docker_socket: "/var/run/docker.sock".to_string(),
            state_dir: PathBuf::from("state"),
            containers: Vec::new(),
            global: GlobalPolicy::default(),
            health: HealthConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

#[derive(Debug, Clone, serde_derive::Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub warmup_secs: u64,
    pub backoff_secs: u64,
    pub attempts: u32,
    pub timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { warmup_secs: 2, backoff_secs: 3, attempts: 3, timeout_secs: 10 }
    }
}

#[derive(Debug, Clone, Default, serde_derive::Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

/// Layered load: an optional config file (path overridable via
/// `REFIT_CONFIG`, default `config.json`) merged with `REFIT_`-prefixed
/// environment variables. Read once per run.
pub fn load_config() -> Result<AppConfig, Error> {
    let path = std::env::var("REFIT_CONFIG").unwrap_or_else(|_| "config.json".to_string());
    let config = Config::builder()
        .add_source(File::with_name(&path).required(false))
        .add_source(Environment::with_prefix("refit").separator("__"))
        .build()
        .context("Can't load configuration")?;

    config
        .try_deserialize()
        .context("Can't deserialize AppConfig from loaded configuration")
}
