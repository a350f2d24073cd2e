use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::models::GrantState;
use crate::summary::DEFAULT_MORNING_HOUR;
use crate::sync::DEFAULT_STORE_POLL_SECS;

const CONFIG_FILE_NAME: &str = "settings.json";
pub const CURRENT_CONFIG_VERSION: u32 = 1;

fn default_morning_hour() -> u32 {
    DEFAULT_MORNING_HOUR
}

fn default_store_poll_secs() -> u64 {
    DEFAULT_STORE_POLL_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WeatherConfig {
    pub enabled: bool,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default = "default_morning_hour")]
    pub morning_hour: u32,
    #[serde(default = "default_store_poll_secs")]
    pub store_poll_secs: u64,
    pub permission: GrantState,
    pub weather: WeatherConfig,
    pub config_version: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            morning_hour: default_morning_hour(),
            store_poll_secs: default_store_poll_secs(),
            permission: GrantState::default(),
            weather: WeatherConfig::default(),
            config_version: CURRENT_CONFIG_VERSION,
        }
    }
}

/// Clamp and sanitise every field so the rest of the app can trust it.
fn validate(mut cfg: AppConfig) -> AppConfig {
    if cfg.morning_hour > 23 {
        warn!(
            "config: morning_hour {} out of range, resetting to {}",
            cfg.morning_hour,
            default_morning_hour()
        );
        cfg.morning_hour = default_morning_hour();
    }
    cfg.store_poll_secs = cfg.store_poll_secs.clamp(1, 3_600);

    cfg.weather.city = cfg.weather.city.and_then(|city| {
        let trimmed = city.trim().to_string();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    });
    let lat_ok = cfg.weather.latitude.map_or(false, |v| (-90.0..=90.0).contains(&v));
    let lon_ok = cfg.weather.longitude.map_or(false, |v| (-180.0..=180.0).contains(&v));
    if cfg.weather.enabled && !(lat_ok && lon_ok) && cfg.weather.city.is_none() {
        warn!("config: weather enabled without a usable location, disabling");
        cfg.weather.enabled = false;
    }
    if !(lat_ok && lon_ok) {
        cfg.weather.latitude = None;
        cfg.weather.longitude = None;
    }

    cfg.config_version = CURRENT_CONFIG_VERSION;
    cfg
}

pub fn config_path() -> Result<PathBuf, String> {
    let mut base = dirs::config_dir().ok_or_else(|| "failed to resolve config dir".to_string())?;
    base.push("taskping");
    base.push(CONFIG_FILE_NAME);
    Ok(base)
}

pub async fn load_config(path: &Path) -> Result<AppConfig, String> {
    if !path.exists() {
        info!("no config file at {}, using defaults", path.display());
        return Ok(AppConfig::default());
    }

    debug!("loading config from {}", path.display());

    let content = fs::read_to_string(path)
        .await
        .map_err(|err| format!("failed to read config: {err}"))?;

    let parsed: AppConfig =
        serde_json::from_str(&content).map_err(|err| format!("invalid config JSON: {err}"))?;

    Ok(validate(parsed))
}

pub async fn save_config(path: &Path, input: AppConfig) -> Result<AppConfig, String> {
    let validated = validate(input);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|err| format!("failed to create config directory: {err}"))?;
    }

    let serialized = serde_json::to_string_pretty(&validated)
        .map_err(|err| format!("failed to serialize config: {err}"))?;

    fs::write(path, serialized)
        .await
        .map_err(|err| format!("failed to write config: {err}"))?;

    info!("config saved to {}", path.display());
    Ok(validated)
}
