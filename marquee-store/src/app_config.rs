use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_hold_ttl")]
    pub hold_ttl_minutes: u64,
    #[serde(default = "default_buffer")]
    pub changeover_buffer_minutes: i64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_vip_multiplier")]
    pub vip_price_multiplier: f64,
}

fn default_hold_ttl() -> u64 {
    10
}
fn default_buffer() -> i64 {
    marquee_scheduling::CHANGEOVER_BUFFER_MINUTES
}
fn default_sweep_interval() -> u64 {
    30
}
fn default_vip_multiplier() -> f64 {
    1.25
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            hold_ttl_minutes: default_hold_ttl(),
            changeover_buffer_minutes: default_buffer(),
            sweep_interval_seconds: default_sweep_interval(),
            vip_price_multiplier: default_vip_multiplier(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Environment-specific overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `MARQUEE__SERVER__PORT=8080`
            .add_source(config::Environment::with_prefix("MARQUEE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
