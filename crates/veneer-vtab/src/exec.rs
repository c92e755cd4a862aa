//! DataFusion `ExecutionPlan` that streams rows out of a virtual table.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use arrow::compute::SortOptions;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use datafusion::error::{DataFusionError, Result as DFResult};
use datafusion::execution::{SendableRecordBatchStream, TaskContext};
use datafusion::physical_expr::expressions::Column;
use datafusion::physical_expr::{EquivalenceProperties, LexOrdering, PhysicalSortExpr};
use datafusion::physical_plan::execution_plan::{Boundedness, EmissionType};
use datafusion::physical_plan::stream::RecordBatchStreamAdapter;
use datafusion::physical_plan::{
    DisplayAs, DisplayFormatType, ExecutionPlan, Partitioning, PlanProperties,
};
use veneer_core::{Constraint, Order, Result, VeneerError};

use crate::convert::rows_to_batch;
use crate::cursor::Cursor;
use crate::index::{Committed, IndexPlan};
use crate::table::VirtualTable;

pub fn df_err(e: VeneerError) -> DataFusionError {
    DataFusionError::External(Box::new(e))
}

/// Single-partition scan over a virtual table.
///
/// The adapter is not contacted until the returned stream is first polled.
#[derive(Debug)]
pub struct VirtualScanExec {
    table: Arc<VirtualTable>,
    constraints: Vec<Constraint>,
    plan: IndexPlan,
    projection: Vec<usize>,
    schema: SchemaRef,
    batch_size: usize,
    limit: Option<usize>,
    properties: PlanProperties,
}

impl VirtualScanExec {
    pub fn new(
        table: Arc<VirtualTable>,
        constraints: Vec<Constraint>,
        plan: IndexPlan,
        projection: Vec<usize>,
        schema: SchemaRef,
        batch_size: usize,
        limit: Option<usize>,
    ) -> Self {
        let ordering = output_ordering(&plan, &schema);
        let equivalences = if ordering.is_empty() {
            EquivalenceProperties::new(Arc::clone(&schema))
        } else {
            EquivalenceProperties::new_with_orderings(
                Arc::clone(&schema),
                &[LexOrdering::new(ordering)],
            )
        };
        let properties = PlanProperties::new(
            equivalences,
            Partitioning::UnknownPartitioning(1),
            EmissionType::Incremental,
            Boundedness::Bounded,
        );
        Self {
            table,
            constraints,
            plan,
            projection,
            schema,
            batch_size: batch_size.max(1),
            limit,
            properties,
        }
    }

    pub fn table(&self) -> &Arc<VirtualTable> {
        &self.table
    }

    pub fn index_plan(&self) -> &IndexPlan {
        &self.plan
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Re-plan this scan so the adapter emits rows in `order`, capped at
    /// `fetch` rows. `None` when the adapter cannot sort that way itself.
    pub fn with_order(
        &self,
        order: &[(String, Order)],
        fetch: Option<usize>,
    ) -> Result<Option<Self>> {
        let plan = self.table.best_index(&self.constraints, order)?;
        if !plan.order_by_consumed {
            return Ok(None);
        }
        let limit = match (self.limit, fetch) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Ok(Some(Self::new(
            Arc::clone(&self.table),
            self.constraints.clone(),
            plan,
            self.projection.clone(),
            Arc::clone(&self.schema),
            self.batch_size,
            limit,
        )))
    }
}

/// Sort keys the adapter has committed to, as far as they survive the
/// projection. Native orderings place nulls last in both directions.
fn output_ordering(plan: &IndexPlan, schema: &SchemaRef) -> Vec<PhysicalSortExpr> {
    let Committed::Filters { order, .. } = &plan.committed else {
        return Vec::new();
    };
    order
        .iter()
        .map_while(|(name, direction)| {
            let index = schema.index_of(name).ok()?;
            Some(PhysicalSortExpr {
                expr: Arc::new(Column::new(name, index)),
                options: SortOptions {
                    descending: *direction == Order::Descending,
                    nulls_first: false,
                },
            })
        })
        .collect()
}

struct ScanState {
    table: Arc<VirtualTable>,
    plan: IndexPlan,
    projection: Vec<usize>,
    schema: SchemaRef,
    batch_size: usize,
    remaining: Option<usize>,
    cursor: Option<Cursor>,
    pending: Option<VeneerError>,
    done: bool,
}

impl ScanState {
    /// Rows read before a failure are emitted as a short batch; the error
    /// follows on the next poll.
    async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if let Some(e) = self.pending.take() {
            return Err(e);
        }
        if self.done {
            return Ok(None);
        }
        if self.cursor.is_none() {
            self.cursor = Some(self.table.open(&self.plan).await?);
        }
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };

        let want = self
            .remaining
            .map_or(self.batch_size, |r| r.min(self.batch_size));
        let mut rows = Vec::with_capacity(want);
        while rows.len() < want {
            match cursor.next_row().await {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(e) if rows.is_empty() => {
                    self.done = true;
                    cursor.close();
                    return Err(e);
                }
                Err(e) => {
                    self.done = true;
                    self.pending = Some(e);
                    break;
                }
            }
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= rows.len();
            if *remaining == 0 {
                self.done = true;
            }
        }
        if self.done {
            cursor.close();
        }
        if rows.is_empty() {
            return Ok(None);
        }
        rows_to_batch(
            self.table.columns(),
            Arc::clone(&self.schema),
            &self.projection,
            &rows,
        )
        .map(Some)
    }
}

impl ExecutionPlan for VirtualScanExec {
    fn name(&self) -> &str {
        "VirtualScanExec"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn properties(&self) -> &PlanProperties {
        &self.properties
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![]
    }

    fn with_new_children(
        self: Arc<Self>,
        children: Vec<Arc<dyn ExecutionPlan>>,
    ) -> DFResult<Arc<dyn ExecutionPlan>> {
        if children.is_empty() {
            Ok(self)
        } else {
            Err(DataFusionError::Internal(
                "VirtualScanExec is a leaf node and cannot have children".to_string(),
            ))
        }
    }

    fn execute(
        &self,
        partition: usize,
        _context: Arc<TaskContext>,
    ) -> DFResult<SendableRecordBatchStream> {
        if partition != 0 {
            return Err(DataFusionError::Internal(format!(
                "VirtualScanExec only supports partition 0, got {}",
                partition
            )));
        }

        let state = ScanState {
            table: Arc::clone(&self.table),
            plan: self.plan.clone(),
            projection: self.projection.clone(),
            schema: Arc::clone(&self.schema),
            batch_size: self.batch_size,
            remaining: self.limit,
            cursor: None,
            pending: None,
            done: false,
        };
        let stream = futures::stream::try_unfold(state, |mut state| async move {
            let batch = state.next_batch().await.map_err(df_err)?;
            Ok(batch.map(|b| (b, state)))
        });

        Ok(Box::pin(RecordBatchStreamAdapter::new(
            Arc::clone(&self.schema),
            stream,
        )))
    }
}

impl DisplayAs for VirtualScanExec {
    fn fmt_as(&self, _t: DisplayFormatType, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "VirtualScanExec: table={}, index={}, cost={}",
            self.table.name(),
            self.plan.index_name,
            self.plan.estimated_cost
        )?;
        if let Some(limit) = self.limit {
            write!(f, ", limit={}", limit)?;
        }
        Ok(())
    }
}
