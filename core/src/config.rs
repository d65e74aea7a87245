//! Client configuration and its environment loading.
//!
//! Defaults reproduce the demo deployment: a fixed base URL, a preissued
//! session token and a default position in Milan. Every value can be
//! overridden from the environment; a `.env` file is honoured outside tests.

use std::path::PathBuf;
use std::time::Duration;

use crate::types::Location;

pub const DEFAULT_BASE_URL: &str = "https://develop.ewlab.di.unimi.it/mc/2425";
pub const DEFAULT_SID: &str = "jXdax4YQeX3ECmKh4nN5n1eJxFre2ZyZWBXsh7ocDxM6U2x3Uo3xcjKUGoLngX6t";
pub const DEFAULT_LOCATION: Location = Location {
    lat: 45.478,
    lng: 9.227,
};
pub const DEFAULT_DEMO_MENU_ID: u32 = 21;
pub const DEFAULT_STORE_PATH: &str = "./food-session.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    /// Token used until a user is created or restored from the store.
    pub initial_sid: Option<String>,
    pub location: Location,
    /// Menu whose image `ApiClient::get_image` fetches.
    pub demo_menu_id: u32,
    /// Total per-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub store_path: PathBuf,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            initial_sid: Some(DEFAULT_SID.to_string()),
            location: DEFAULT_LOCATION,
            demo_menu_id: DEFAULT_DEMO_MENU_ID,
            timeout: None,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base_url) = lookup("FOOD_API_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(sid) = lookup("FOOD_API_SID") {
            // An empty value starts without a session.
            config.initial_sid = (!sid.is_empty()).then_some(sid);
        }
        if let Some(lat) = lookup("FOOD_API_LAT") {
            config.location.lat = parse_coordinate("FOOD_API_LAT", &lat, 90.0)?;
        }
        if let Some(lng) = lookup("FOOD_API_LNG") {
            config.location.lng = parse_coordinate("FOOD_API_LNG", &lng, 180.0)?;
        }
        if let Some(mid) = lookup("FOOD_API_DEMO_MID") {
            config.demo_menu_id = mid.parse().map_err(|_| {
                ConfigError::InvalidValue(
                    "FOOD_API_DEMO_MID".to_string(),
                    format!("'{mid}' is not a menu id"),
                )
            })?;
        }
        if let Some(secs) = lookup("FOOD_API_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                ConfigError::InvalidValue(
                    "FOOD_API_TIMEOUT_SECS".to_string(),
                    format!("'{secs}' is not a number of seconds"),
                )
            })?;
            config.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(path) = lookup("FOOD_STORE_PATH") {
            config.store_path = PathBuf::from(path);
        }
        if let Some(level) = lookup("RUST_LOG") {
            config.log_level = level;
        }

        Ok(config)
    }
}

fn parse_coordinate(key: &str, raw: &str, bound: f64) -> Result<f64, ConfigError> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value.abs() <= bound => Ok(value),
        _ => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("'{raw}' is not a coordinate within ±{bound}"),
        )),
    }
}
