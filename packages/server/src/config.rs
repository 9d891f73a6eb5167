use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use common::config::{ClassifierConfig, MqAppConfig, StuckScanConfig};

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    3000
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// One configured admin bearer token.
#[derive(Debug, Deserialize, Clone)]
pub struct AdminToken {
    pub token: String,
    pub name: String,
    /// Role the authorizer maps to capabilities ("admin", "operator").
    pub role: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AdminConfig {
    #[serde(default)]
    pub tokens: Vec<AdminToken>,
}

/// Static plan data standing in for the billing collaborator.
#[derive(Debug, Deserialize, Clone)]
pub struct PlanConfig {
    #[serde(default = "default_allow_ai_tagging")]
    pub allow_ai_tagging: bool,
    /// Per-tenant overrides of the default.
    #[serde(default)]
    pub tenant_overrides: HashMap<String, bool>,
    /// LRU capacity for cached plan lookups. Default: 1024.
    #[serde(default = "default_plan_cache_size")]
    pub cache_size: usize,
}

fn default_allow_ai_tagging() -> bool {
    true
}
fn default_plan_cache_size() -> usize {
    1024
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            allow_ai_tagging: default_allow_ai_tagging(),
            tenant_overrides: HashMap::new(),
            cache_size: default_plan_cache_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    #[serde(default)]
    pub stuck: StuckScanConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub plans: PlanConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("ATRIUM_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            // Load from config/config.toml
            .add_source(File::with_name(&config_path).required(false))
            // Override from environment (e.g. ATRIUM__DATABASE__URL)
            .add_source(Environment::with_prefix("ATRIUM").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
