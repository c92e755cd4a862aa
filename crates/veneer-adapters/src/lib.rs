//! Reference adapters and the default registry.

pub mod auth;
pub mod config;
pub mod gsheets;
pub mod http;
pub mod memory;
pub mod weatherapi;

use std::sync::Arc;

use tracing::info;
use veneer_core::AdapterRegistry;

pub use auth::{ServiceAccount, StaticToken, TokenSource};
pub use config::VeneerConfig;
pub use gsheets::{GSheets, GSheetsFactory};
pub use http::{HttpResponse, HttpTransport, Transport};
pub use memory::{MemoryAdapter, MemoryFactory};
pub use weatherapi::{WeatherApi, WeatherApiFactory};

/// Registry with the HTTP adapters, sharing one cached transport.
pub fn default_registry(config: &VeneerConfig) -> AdapterRegistry {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config.cache_ttl()));
    let registry = AdapterRegistry::new(vec![
        Arc::new(WeatherApiFactory::new(transport.clone()).with_defaults(config.weatherapi_options())),
        Arc::new(GSheetsFactory::new(transport)),
    ]);
    info!("Built default adapter registry: {:?}", registry.names());
    registry
}
