//! Query engine exposing virtual tables over DataFusion

use std::sync::Arc;

use anyhow::{anyhow, Context};
use arrow::record_batch::RecordBatch;
use datafusion::catalog::{CatalogProvider, SchemaProvider};
use datafusion::error::Result as DFResult;
use datafusion::execution::session_state::SessionStateBuilder;
use datafusion::prelude::*;
use tracing::info;
use veneer_core::registry::global;
use veneer_core::{AdapterOptions, AdapterRegistry};

use crate::ordering::PushSortIntoScan;
use crate::schema::VirtualSchema;
use crate::table::VirtualTable;

/// Default rows per record batch.
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Wraps DataFusion's SessionContext with an adapter registry.
///
/// The session's default schema is a [`VirtualSchema`]: quoting a URI that
/// an adapter supports as a table name connects it on first use.
pub struct Engine {
    ctx: SessionContext,
    schema: Arc<VirtualSchema>,
}

impl Engine {
    pub fn new(registry: Arc<AdapterRegistry>) -> anyhow::Result<Self> {
        let config = SessionConfig::new();
        let catalog_name = config.options().catalog.default_catalog.clone();
        let schema_name = config.options().catalog.default_schema.clone();

        let state = SessionStateBuilder::new()
            .with_config(config)
            .with_default_features()
            .with_physical_optimizer_rule(Arc::new(PushSortIntoScan::new()))
            .build();
        let ctx = SessionContext::new_with_state(state);

        let schema = Arc::new(VirtualSchema::new(Arc::clone(&registry), DEFAULT_BATCH_SIZE));
        ctx.catalog(&catalog_name)
            .ok_or_else(|| anyhow!("Default catalog '{}' is missing", catalog_name))?
            .register_schema(&schema_name, Arc::clone(&schema) as Arc<dyn SchemaProvider>)
            .with_context(|| format!("Failed to install schema '{}'", schema_name))?;

        info!(
            "Engine initialized with adapters: {}",
            registry.names().join(", ")
        );

        Ok(Self { ctx, schema })
    }

    /// Build an engine over the process-wide registry.
    pub fn from_global() -> anyhow::Result<Self> {
        let registry = global().context("No adapter registry installed")?;
        Self::new(registry)
    }

    /// Options passed to every connection made through `adapter`.
    pub fn with_adapter_options(
        self,
        adapter: &str,
        options: AdapterOptions,
    ) -> anyhow::Result<Self> {
        self.schema.set_options(adapter, options)?;
        Ok(self)
    }

    pub fn with_batch_size(self, batch_size: usize) -> Self {
        self.schema.set_batch_size(batch_size);
        self
    }

    /// Get a reference to the underlying SessionContext
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        self.schema.registry()
    }

    /// Connect `uri` through the named adapter and register it as `name`.
    pub async fn create_virtual_table(
        &self,
        name: &str,
        adapter: &str,
        uri: &str,
    ) -> anyhow::Result<Arc<VirtualTable>> {
        let table = self
            .schema
            .connect(name, adapter, uri)
            .await
            .with_context(|| format!("Failed to connect '{}' with adapter '{}'", uri, adapter))?;
        Ok(table)
    }

    /// Like `create_virtual_table`, picking the first adapter that supports `uri`.
    pub async fn register_uri(&self, name: &str, uri: &str) -> anyhow::Result<Arc<VirtualTable>> {
        let factory = self
            .registry()
            .find(uri)
            .ok_or_else(|| anyhow!("No adapter supports '{}'", uri))?;
        let adapter = factory.name().to_string();
        self.create_virtual_table(name, &adapter, uri).await
    }

    /// Register an already-built table, replacing (and closing) any previous
    /// table with the same name.
    pub fn register_table(&self, table: VirtualTable) -> anyhow::Result<Arc<VirtualTable>> {
        let name = table.name().to_string();
        self.schema
            .insert(table)
            .with_context(|| format!("Failed to register table '{}'", name))
    }

    pub fn table(&self, name: &str) -> Option<Arc<VirtualTable>> {
        self.schema.virtual_table(name)
    }

    /// Deregister and close `name`. Returns whether the table existed.
    pub fn drop_table(&self, name: &str) -> anyhow::Result<bool> {
        let existed = self
            .schema
            .remove(name)
            .with_context(|| format!("Failed to deregister table '{}'", name))?;
        if existed {
            info!("Dropped virtual table '{}'", name);
        }
        Ok(existed)
    }

    /// Execute a SQL query and return a DataFrame
    pub async fn sql(&self, query: &str) -> DFResult<DataFrame> {
        self.ctx.sql(query).await
    }

    /// Execute a SQL query and collect every batch.
    pub async fn query(&self, query: &str) -> anyhow::Result<Vec<RecordBatch>> {
        let df = self.sql(query).await?;
        Ok(df.collect().await?)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.schema.close_all();
    }
}
