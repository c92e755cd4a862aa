//! In-memory adapter.
//!
//! Holds typed rows and evaluates every pushed constraint and ordering
//! itself. Used for embedding small lookup tables and for tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use veneer_core::{
    Adapter, AdapterFactory, AdapterOptions, Bounds, Columns, Order, Result, Row, RowStream,
    VeneerError,
};

#[derive(Debug)]
pub struct MemoryAdapter {
    name: String,
    columns: Columns,
    rows: Arc<Vec<Row>>,
    calls: AtomicUsize,
}

impl MemoryAdapter {
    pub fn new(name: impl Into<String>, columns: Columns, rows: Vec<Row>) -> Result<Self> {
        let name = name.into();
        if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(VeneerError::InvalidArgument(format!(
                "row with {} values in table '{}' of {} columns",
                bad.len(),
                name,
                columns.len()
            )));
        }
        Ok(Self {
            name,
            columns,
            rows: Arc::new(rows),
            calls: AtomicUsize::new(0),
        })
    }

    /// Number of times `rows` has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn name(&self) -> &str {
        "memory"
    }

    fn columns(&self) -> &Columns {
        &self.columns
    }

    async fn rows(&self, bounds: &Bounds, order: &[(String, Order)]) -> Result<RowStream> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);

        let mut checks = Vec::with_capacity(bounds.len());
        for (column, filter) in bounds {
            let index = self
                .columns
                .position(column)
                .ok_or_else(|| VeneerError::UnknownColumn(column.clone()))?;
            checks.push((index, filter));
        }
        let mut keys = Vec::with_capacity(order.len());
        for (column, direction) in order {
            let index = self
                .columns
                .position(column)
                .ok_or_else(|| VeneerError::UnknownColumn(column.clone()))?;
            keys.push((index, *direction));
        }

        let mut selected: Vec<Row> = self
            .rows
            .iter()
            .filter(|row| checks.iter().all(|(i, f)| f.matches(&row[*i])))
            .cloned()
            .collect();
        if !keys.is_empty() {
            selected.sort_by(|a, b| {
                keys.iter()
                    .map(|(i, dir)| a[*i].sort_cmp_directed(&b[*i], *dir))
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        debug!(
            "Memory table '{}' yields {} of {} rows",
            self.name,
            selected.len(),
            self.rows.len()
        );
        Ok(Box::pin(futures::stream::iter(selected.into_iter().map(Ok))))
    }
}

/// Serves named in-memory tables under `memory://<name>`.
#[derive(Default)]
pub struct MemoryFactory {
    tables: BTreeMap<String, (Columns, Vec<Row>)>,
}

impl MemoryFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, columns: Columns, rows: Vec<Row>) -> Self {
        self.tables.insert(name.into(), (columns, rows));
        self
    }
}

#[async_trait]
impl AdapterFactory for MemoryFactory {
    fn name(&self) -> &str {
        "memory"
    }

    fn supports(&self, uri: &str) -> bool {
        uri.starts_with("memory://")
    }

    async fn connect(&self, uri: &str, _options: &AdapterOptions) -> Result<Arc<dyn Adapter>> {
        let name = uri
            .strip_prefix("memory://")
            .ok_or_else(|| VeneerError::InvalidArgument(format!("not a memory URI: {}", uri)))?;
        let (columns, rows) = self
            .tables
            .get(name)
            .ok_or_else(|| VeneerError::InvalidArgument(format!("no memory table '{}'", name)))?;
        Ok(Arc::new(MemoryAdapter::new(name, columns.clone(), rows.clone())?))
    }
}
