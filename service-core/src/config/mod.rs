use crate::error::AppError;
use config::{Config as Cfg, ConfigBuilder, File, builder::DefaultState};
use serde::Deserialize;
use std::env;

/// Environment variable the serving platform uses to announce the listening port.
pub const PORT_ENV: &str = "PORT";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Self::builder()?.build()?;

        Ok(config.try_deserialize()?)
    }

    /// Layers the optional `configuration` file, `APP__*` variables and the
    /// platform `PORT` variable, in increasing order of precedence.
    fn builder() -> Result<ConfigBuilder<DefaultState>, AppError> {
        let builder = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .set_override_option("port", first_env(&[PORT_ENV]))?;

        Ok(builder)
    }
}

/// Reads `key`, falling back to `default` when it is unset or blank.
pub fn env_or(key: &str, default: &str) -> String {
    first_env(&[key]).unwrap_or_else(|| default.to_string())
}

/// Returns the first of `keys` that is set to a non-empty value.
pub fn first_env(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| env::var(key).ok())
        .find(|val| !val.trim().is_empty())
}
