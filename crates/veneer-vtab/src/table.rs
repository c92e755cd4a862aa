//! Virtual tables: one connected adapter session plus its lifecycle.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};
use veneer_core::{
    Adapter, AdapterOptions, AdapterRegistry, Columns, Constraint, Equivalence, Order, Result,
    VeneerError,
};

use crate::cursor::Cursor;
use crate::index::{best_index, Committed, IndexPlan};

/// A named table backed by an adapter instance.
///
/// Closing is idempotent; the adapter's `close` runs exactly once, either
/// explicitly or when the table is dropped.
pub struct VirtualTable {
    name: String,
    adapter: Arc<dyn Adapter>,
    columns: Arc<Columns>,
    equivalences: Vec<Arc<dyn Equivalence>>,
    closed: AtomicBool,
}

impl VirtualTable {
    /// Connect `uri` through the registry's `adapter_name` factory.
    pub async fn connect(
        registry: &AdapterRegistry,
        name: impl Into<String>,
        adapter_name: &str,
        uri: &str,
        options: &AdapterOptions,
    ) -> Result<Self> {
        let adapter = registry.connect(adapter_name, uri, options).await?;
        Ok(Self::from_adapter(name, adapter))
    }

    pub fn from_adapter(name: impl Into<String>, adapter: Arc<dyn Adapter>) -> Self {
        let name = name.into();
        let columns = Arc::new(adapter.columns().clone());
        let equivalences = adapter.equivalences();
        info!(
            "Virtual table '{}' backed by '{}' with {} columns",
            name,
            adapter.name(),
            columns.len()
        );
        Self {
            name,
            adapter,
            columns,
            equivalences,
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    pub fn columns(&self) -> &Arc<Columns> {
        &self.columns
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(VeneerError::InvalidState(format!(
                "virtual table '{}' is closed",
                self.name
            )));
        }
        Ok(())
    }

    pub fn best_index(&self, constraints: &[Constraint], order: &[(String, Order)]) -> Result<IndexPlan> {
        self.ensure_open()?;
        best_index(
            self.adapter.as_ref(),
            &self.columns,
            &self.equivalences,
            constraints,
            order,
        )
    }

    /// Open a cursor for `plan`. Impossible plans never reach the adapter.
    pub async fn open(&self, plan: &IndexPlan) -> Result<Cursor> {
        self.ensure_open()?;
        match &plan.committed {
            Committed::Impossible => {
                debug!("Skipping adapter for impossible scan of '{}'", self.name);
                Ok(Cursor::empty(Arc::clone(&self.columns)))
            }
            Committed::Filters { bounds, order } => {
                let rows = self.adapter.rows(bounds, order).await?;
                Ok(Cursor::new(
                    Arc::clone(&self.columns),
                    rows,
                    plan.recheck.clone(),
                ))
            }
        }
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Closing virtual table '{}'", self.name);
            self.adapter.close();
        }
    }
}

impl Drop for VirtualTable {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for VirtualTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualTable")
            .field("name", &self.name)
            .field("adapter", &self.adapter.name())
            .field("columns", &self.columns.names())
            .field("closed", &self.is_closed())
            .finish()
    }
}
