use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct Config {
    // target name used in log lines
    #[serde(default = "default_target")]
    pub target: String,
    pub backend: BackendConfig,
    // ceiling for cached block allocations, in bytes
    #[serde(default)]
    pub mem_limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Localfs { root: PathBuf },
    Memory,
}

fn default_target() -> String {
    "ost0000".to_string()
}

pub fn load_config(path: &str) -> Result<Config> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config from {path}"))?;
    let cfg: Config = serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}
