//! Adapter configuration from environment variables.

use std::time::Duration;

use anyhow::{Context, Result};
use veneer_core::AdapterOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VeneerConfig {
    /// Default WeatherAPI key, used when a URI carries no `key=`.
    pub weatherapi_key: Option<String>,
    /// Days fetched by an open-ended WeatherAPI query.
    pub weatherapi_window: u64,
    /// TTL of the shared HTTP response cache. Zero disables caching.
    pub cache_ttl_secs: u64,
    /// Rows per Arrow batch produced by a scan.
    pub batch_size: usize,
}

impl Default for VeneerConfig {
    fn default() -> Self {
        Self {
            weatherapi_key: None,
            weatherapi_window: 7,
            cache_ttl_secs: 180,
            batch_size: 8192,
        }
    }
}

impl VeneerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            weatherapi_key: std::env::var("WEATHERAPI_KEY").ok(),
            weatherapi_window: std::env::var("WEATHERAPI_WINDOW")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .context("Invalid WEATHERAPI_WINDOW")?,
            cache_ttl_secs: std::env::var("VENEER_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "180".to_string())
                .parse()
                .context("Invalid VENEER_CACHE_TTL_SECS")?,
            batch_size: std::env::var("VENEER_BATCH_SIZE")
                .unwrap_or_else(|_| "8192".to_string())
                .parse()
                .context("Invalid VENEER_BATCH_SIZE")?,
        })
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }

    /// Default options for the WeatherAPI adapter.
    pub fn weatherapi_options(&self) -> AdapterOptions {
        let mut options = AdapterOptions::new().with("window", self.weatherapi_window.to_string());
        if let Some(key) = &self.weatherapi_key {
            options.insert("api_key", key.clone());
        }
        options
    }
}
