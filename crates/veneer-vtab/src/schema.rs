//! Default schema of an [`Engine`](crate::Engine) session.
//!
//! Holds every registered table. A name that is not registered but that an
//! adapter recognises as a URI is connected on first reference, so
//! `SELECT * FROM "https://..."` works without creating the table first.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use datafusion::catalog::SchemaProvider;
use datafusion::datasource::TableProvider;
use datafusion::error::Result as DFResult;
use tracing::{debug, info};
use veneer_core::{AdapterOptions, AdapterRegistry, Result, VeneerError};

use crate::exec::df_err;
use crate::provider::VirtualTableProvider;
use crate::table::VirtualTable;

type Providers = HashMap<String, Arc<dyn TableProvider>>;

pub struct VirtualSchema {
    registry: Arc<AdapterRegistry>,
    options: RwLock<HashMap<String, AdapterOptions>>,
    batch_size: AtomicUsize,
    tables: RwLock<Providers>,
}

fn poisoned() -> VeneerError {
    VeneerError::InvalidState("table map lock poisoned".to_string())
}

fn as_virtual(provider: &Arc<dyn TableProvider>) -> Option<Arc<VirtualTable>> {
    provider
        .as_any()
        .downcast_ref::<VirtualTableProvider>()
        .map(|p| Arc::clone(p.table()))
}

impl VirtualSchema {
    pub fn new(registry: Arc<AdapterRegistry>, batch_size: usize) -> Self {
        Self {
            registry,
            options: RwLock::new(HashMap::new()),
            batch_size: AtomicUsize::new(batch_size.max(1)),
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Options passed to every connection made through `adapter`.
    pub fn set_options(&self, adapter: &str, options: AdapterOptions) -> Result<()> {
        self.options
            .write()
            .map_err(|_| poisoned())?
            .insert(adapter.to_lowercase(), options);
        Ok(())
    }

    pub fn options_for(&self, adapter: &str) -> Result<AdapterOptions> {
        Ok(self
            .options
            .read()
            .map_err(|_| poisoned())?
            .get(&adapter.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    /// Rows per record batch for tables registered from now on.
    pub fn set_batch_size(&self, batch_size: usize) {
        self.batch_size.store(batch_size.max(1), Ordering::SeqCst);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Providers>> {
        self.tables.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Providers>> {
        self.tables.write().map_err(|_| poisoned())
    }

    /// Connect `uri` through the named adapter and register it as `name`.
    pub async fn connect(&self, name: &str, adapter: &str, uri: &str) -> Result<Arc<VirtualTable>> {
        let options = self.options_for(adapter)?;
        let table = VirtualTable::connect(&self.registry, name, adapter, uri, &options).await?;
        self.insert(table)
    }

    fn provider_for(&self, table: VirtualTable) -> (Arc<VirtualTable>, Arc<dyn TableProvider>) {
        let table = Arc::new(table);
        let provider = VirtualTableProvider::new(
            Arc::clone(&table),
            self.batch_size.load(Ordering::SeqCst),
        );
        (table, Arc::new(provider))
    }

    /// Register `table`, replacing and closing any table of the same name.
    pub fn insert(&self, table: VirtualTable) -> Result<Arc<VirtualTable>> {
        let name = table.name().to_string();
        let (table, provider) = self.provider_for(table);
        self.replace(&name, Some(provider))?;
        info!(
            "Registered virtual table '{}' ({})",
            name,
            table.adapter().name()
        );
        Ok(table)
    }

    /// Deregister and close `name`. Returns whether the table existed.
    pub fn remove(&self, name: &str) -> Result<bool> {
        Ok(self.replace(name, None)?.is_some())
    }

    pub fn virtual_table(&self, name: &str) -> Option<Arc<VirtualTable>> {
        self.read().ok()?.get(name).and_then(as_virtual)
    }

    fn replace(
        &self,
        name: &str,
        provider: Option<Arc<dyn TableProvider>>,
    ) -> Result<Option<Arc<dyn TableProvider>>> {
        let previous = {
            let mut tables = self.write()?;
            match provider {
                Some(provider) => tables.insert(name.to_string(), provider),
                None => tables.remove(name),
            }
        };
        if let Some(table) = previous.as_ref().and_then(as_virtual) {
            table.close();
            debug!("Closed replaced table '{}'", name);
        }
        Ok(previous)
    }

    /// Connect a URI named in a query. A concurrent resolution of the same
    /// name may win the race; the loser is closed and the winner returned.
    async fn resolve(&self, name: &str) -> Result<Option<Arc<dyn TableProvider>>> {
        let Some(factory) = self.registry.find(name) else {
            return Ok(None);
        };
        let adapter = factory.name().to_string();
        info!("Creating virtual table for '{}' with adapter '{}'", name, adapter);
        let options = self.options_for(&adapter)?;
        let table = VirtualTable::connect(&self.registry, name, &adapter, name, &options).await?;
        let (table, provider) = self.provider_for(table);

        let mut tables = self.write()?;
        if let Some(existing) = tables.get(name) {
            table.close();
            return Ok(Some(Arc::clone(existing)));
        }
        tables.insert(name.to_string(), Arc::clone(&provider));
        Ok(Some(provider))
    }

    /// Close every virtual table. Registrations stay in place.
    pub fn close_all(&self) {
        if let Ok(tables) = self.read() {
            for table in tables.values().filter_map(as_virtual) {
                table.close();
            }
        }
    }
}

impl fmt::Debug for VirtualSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualSchema")
            .field("adapters", &self.registry.names())
            .field("tables", &self.table_names())
            .finish()
    }
}

#[async_trait]
impl SchemaProvider for VirtualSchema {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn table_names(&self) -> Vec<String> {
        self.read()
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    async fn table(&self, name: &str) -> DFResult<Option<Arc<dyn TableProvider>>> {
        let registered = self.read().map_err(df_err)?.get(name).cloned();
        match registered {
            Some(provider) => Ok(Some(provider)),
            None => self.resolve(name).await.map_err(df_err),
        }
    }

    fn register_table(
        &self,
        name: String,
        table: Arc<dyn TableProvider>,
    ) -> DFResult<Option<Arc<dyn TableProvider>>> {
        self.replace(&name, Some(table)).map_err(df_err)
    }

    fn deregister_table(&self, name: &str) -> DFResult<Option<Arc<dyn TableProvider>>> {
        self.replace(name, None).map_err(df_err)
    }

    fn table_exist(&self, name: &str) -> bool {
        self.read()
            .map(|tables| tables.contains_key(name))
            .unwrap_or(false)
    }
}
