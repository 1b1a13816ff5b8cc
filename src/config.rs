use anyhow::{Context, Result};
use dirs::home_dir;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::auth::TokenSet;
use crate::strategy::{HeatingParams, HotwaterParams, Strategy};
use crate::types::Param;

/// Configuration data stored in ~/.sensonet.yml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Keycloak realm of the account; empty means the German realm.
    #[serde(default)]
    pub realm: String,
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_mode: Option<QuickModeConfig>,
}

/// Defaults for `quick-mode start|stop`. Omitted values use the API defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuickModeConfig {
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub veto_setpoint: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub veto_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotwater_index: Option<u32>,
}

impl QuickModeConfig {
    pub fn heating_params(&self) -> HeatingParams {
        HeatingParams {
            zone_index: Param::from(self.zone_index),
            veto_setpoint: Param::from(self.veto_setpoint),
            veto_duration: Param::from(self.veto_duration),
        }
    }

    pub fn hotwater_params(&self) -> HotwaterParams {
        HotwaterParams {
            index: Param::from(self.hotwater_index),
        }
    }
}

impl Config {
    pub fn tokens(&self) -> TokenSet {
        TokenSet {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }

    pub fn set_tokens(&mut self, tokens: &TokenSet) {
        self.access_token = tokens.access_token.clone();
        self.refresh_token = tokens.refresh_token.clone();
    }
}

/// Get the path to the configuration file (~/.sensonet.yml)
pub fn get_config_path() -> Result<PathBuf> {
    let home = home_dir().context("Failed to determine home directory")?;
    Ok(home.join(".sensonet.yml"))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&get_config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "Not logged in. Please run 'sensonet login' first."
        ));
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    if config.refresh_token.is_empty() && config.access_token.is_empty() {
        return Err(anyhow::anyhow!(
            "Configuration incomplete. Please run 'sensonet login' first."
        ));
    }

    debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

pub fn save_config(config: &Config) -> Result<()> {
    save_config_to(&get_config_path()?, config)
}

pub fn save_config_to(path: &Path, config: &Config) -> Result<()> {
    let content = serde_yaml::to_string(config).context("Failed to serialize configuration")?;

    fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    debug!("Saved configuration to {}", path.display());
    Ok(())
}

/// Clear the configuration file (logout)
pub fn clear_config() -> Result<()> {
    clear_config_at(&get_config_path()?)
}

pub fn clear_config_at(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        debug!("Configuration file cleared");
    } else {
        warn!("Configuration file does not exist, nothing to clear");
    }

    Ok(())
}
