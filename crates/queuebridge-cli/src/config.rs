//! CI server connection settings, read from a JSON config file.

use std::fs;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

pub fn load(path: &str) -> Result<Config> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read config file '{path}'"))?;
    let config: Config = serde_json::from_str(&contents)
        .with_context(|| format!("config file '{path}' is not valid JSON"))?;

    for (field, value) in [
        ("url", &config.url),
        ("user", &config.user),
        ("password", &config.password),
    ] {
        if value.is_empty() {
            bail!("the field '{field}' must be defined in the config file '{path}'");
        }
    }
    Ok(config)
}
