//! `TableProvider` over a virtual table.

use std::any::Any;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use datafusion::catalog::Session;
use datafusion::datasource::TableProvider;
use datafusion::error::Result as DFResult;
use datafusion::logical_expr::{TableProviderFilterPushDown, TableType};
use datafusion::physical_plan::ExecutionPlan;
use datafusion::prelude::Expr;
use tracing::debug;

use crate::convert::schema_for;
use crate::exec::{df_err, VirtualScanExec};
use crate::expr::to_constraints;
use crate::table::VirtualTable;

#[derive(Debug)]
pub struct VirtualTableProvider {
    table: Arc<VirtualTable>,
    schema: SchemaRef,
    batch_size: usize,
}

impl VirtualTableProvider {
    pub fn new(table: Arc<VirtualTable>, batch_size: usize) -> Self {
        let schema = schema_for(table.columns());
        Self {
            table,
            schema,
            batch_size,
        }
    }

    pub fn table(&self) -> &Arc<VirtualTable> {
        &self.table
    }
}

#[async_trait]
impl TableProvider for VirtualTableProvider {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    fn table_type(&self) -> TableType {
        TableType::Base
    }

    fn supports_filters_pushdown(
        &self,
        filters: &[&Expr],
    ) -> DFResult<Vec<TableProviderFilterPushDown>> {
        filters
            .iter()
            .map(|filter| {
                let Some(constraints) = to_constraints(filter, self.table.columns()) else {
                    return Ok(TableProviderFilterPushDown::Unsupported);
                };
                let plan = self.table.best_index(&constraints, &[]).map_err(df_err)?;
                let support = if plan.usage.iter().all(|u| u.omit) {
                    TableProviderFilterPushDown::Exact
                } else if plan.usage.iter().any(|u| u.pushed) {
                    TableProviderFilterPushDown::Inexact
                } else {
                    TableProviderFilterPushDown::Unsupported
                };
                Ok(support)
            })
            .collect()
    }

    async fn scan(
        &self,
        _state: &dyn Session,
        projection: Option<&Vec<usize>>,
        filters: &[Expr],
        limit: Option<usize>,
    ) -> DFResult<Arc<dyn ExecutionPlan>> {
        let constraints: Vec<_> = filters
            .iter()
            .filter_map(|f| to_constraints(f, self.table.columns()))
            .flatten()
            .collect();
        let plan = self.table.best_index(&constraints, &[]).map_err(df_err)?;
        debug!(
            "Scanning '{}' with {} constraints, index={:?}",
            self.table.name(),
            constraints.len(),
            plan.index_name
        );

        let projection = match projection {
            Some(p) => p.clone(),
            None => (0..self.schema.fields().len()).collect(),
        };
        let schema = Arc::new(self.schema.project(&projection)?);
        Ok(Arc::new(VirtualScanExec::new(
            Arc::clone(&self.table),
            constraints,
            plan,
            projection,
            schema,
            self.batch_size,
            limit,
        )))
    }
}
