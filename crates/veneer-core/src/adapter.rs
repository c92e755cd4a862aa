//! The contract every data source implements.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::combine::Equivalence;
use crate::cost::{CostModel, SortKey};
use crate::error::{Result, VeneerError};
use crate::filter::{Bounds, FilterKind, Operator};
use crate::value::{ColumnType, Order, OrderSupport};

/// Column metadata and pushdown capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    /// Operators the adapter can evaluate. Empty disables pushdown.
    pub operators: Vec<Operator>,
    /// Whether the adapter applies pushed constraints exactly.
    pub exact: bool,
    pub kind: FilterKind,
    pub order: OrderSupport,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            operators: Vec::new(),
            exact: false,
            kind: FilterKind::Range,
            order: OrderSupport::None,
        }
    }

    pub fn pushdown(mut self, operators: &[Operator]) -> Self {
        self.operators = operators.to_vec();
        self
    }

    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    pub fn kind(mut self, kind: FilterKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn order(mut self, order: OrderSupport) -> Self {
        self.order = order;
        self
    }

    pub fn accepts(&self, op: Operator) -> bool {
        self.operators.contains(&op)
    }
}

/// Ordered, name-unique column list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Columns(Vec<Column>);

impl Columns {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(VeneerError::InvalidArgument(format!(
                    "duplicate column: {}",
                    column.name
                )));
            }
        }
        Ok(Self(columns))
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.0.iter().find(|c| c.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|c| c.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|c| c.name.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a Columns {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One produced row, positionally aligned with `Adapter::columns`.
pub type Row = Vec<crate::value::Value>;

/// Lazy, finite, single-use row source.
pub type RowStream = BoxStream<'static, Result<Row>>;

/// A data source exposed as a table.
///
/// An adapter instance is one session bound to one source identity. Rows may
/// be loosely typed; the bridge coerces them into the declared column types.
#[async_trait]
pub trait Adapter: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Stable for the lifetime of the session.
    fn columns(&self) -> &Columns;

    fn equivalences(&self) -> Vec<Arc<dyn Equivalence>> {
        Vec::new()
    }

    fn page_size(&self) -> Option<u64> {
        None
    }

    fn cost_model(&self) -> CostModel {
        self.page_size()
            .map(CostModel::with_window)
            .unwrap_or_default()
    }

    fn cost(&self, filtered: &[(String, Operator)], order: &[SortKey]) -> u64 {
        self.cost_model().estimate(filtered, order)
    }

    /// Produce rows satisfying `bounds` (only for advertised operators) in
    /// `order` when the columns declare native ordering.
    async fn rows(&self, bounds: &Bounds, order: &[(String, Order)]) -> Result<RowStream>;

    /// Release held resources. Called once when the table is closed.
    fn close(&self) {}
}
