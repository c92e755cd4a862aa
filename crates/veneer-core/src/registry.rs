//! Adapter factories and the process-wide registry.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::info;

use crate::adapter::Adapter;
use crate::error::{Result, VeneerError};

/// Adapter-specific string options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterOptions(BTreeMap<String, String>);

impl AdapterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Parse an option, `Ok(None)` when absent.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|_| {
                    VeneerError::InvalidArgument(format!("invalid value for option '{}': {}", key, raw))
                })
            })
            .transpose()
    }

    /// Options from the left are kept when both sides set a key.
    pub fn merged(&self, fallback: &AdapterOptions) -> AdapterOptions {
        let mut merged = fallback.0.clone();
        merged.extend(self.0.clone());
        AdapterOptions(merged)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AdapterOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Creates adapter sessions for the URIs it recognizes.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `true` if this factory can handle the given URI.
    fn supports(&self, uri: &str) -> bool;

    async fn connect(&self, uri: &str, options: &AdapterOptions) -> Result<Arc<dyn Adapter>>;
}

/// Registry of adapter factories, keyed by name.
#[derive(Default)]
pub struct AdapterRegistry {
    factories: Vec<Arc<dyn AdapterFactory>>,
}

impl AdapterRegistry {
    pub fn new(factories: Vec<Arc<dyn AdapterFactory>>) -> Self {
        Self { factories }
    }

    pub fn add(&mut self, factory: Arc<dyn AdapterFactory>) {
        self.factories.push(factory);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn AdapterFactory>> {
        self.factories
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| VeneerError::UnknownAdapter(name.to_string()))
    }

    /// First factory that can handle the URI.
    pub fn find(&self, uri: &str) -> Option<Arc<dyn AdapterFactory>> {
        self.factories.iter().find(|f| f.supports(uri)).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|f| f.name()).collect()
    }

    pub async fn connect(
        &self,
        name: &str,
        uri: &str,
        options: &AdapterOptions,
    ) -> Result<Arc<dyn Adapter>> {
        let factory = self.get(name)?;
        let adapter = factory.connect(uri, options).await?;
        info!("Connected adapter '{}' to '{}'", factory.name(), uri);
        Ok(adapter)
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("factories", &self.names())
            .finish()
    }
}

static GLOBAL: OnceLock<Arc<AdapterRegistry>> = OnceLock::new();

/// Install the process-wide registry. Fails if one is already installed.
pub fn install(registry: AdapterRegistry) -> Result<Arc<AdapterRegistry>> {
    let registry = Arc::new(registry);
    GLOBAL
        .set(registry.clone())
        .map_err(|_| VeneerError::InvalidState("adapter registry already installed".to_string()))?;
    info!("Installed adapter registry with {:?}", registry.names());
    Ok(registry)
}

pub fn global() -> Option<Arc<AdapterRegistry>> {
    GLOBAL.get().cloned()
}
