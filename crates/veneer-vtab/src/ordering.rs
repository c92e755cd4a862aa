//! Physical optimizer rule that hands `ORDER BY` to adapters able to sort
//! natively.
//!
//! A sort whose input is a virtual scan, possibly behind filters, batch
//! coalescing or round-robin repartitioning, is replaced by a scan planned
//! with that ordering. Repartitioning is dropped so the adapter's order
//! reaches the sort's parent unchanged.

use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use datafusion::common::tree_node::{Transformed, TreeNode};
use datafusion::config::ConfigOptions;
use datafusion::error::Result as DFResult;
use datafusion::physical_expr::expressions::Column;
use datafusion::physical_expr::PhysicalSortExpr;
use datafusion::physical_optimizer::PhysicalOptimizerRule;
use datafusion::physical_plan::coalesce_batches::CoalesceBatchesExec;
use datafusion::physical_plan::coalesce_partitions::CoalescePartitionsExec;
use datafusion::physical_plan::filter::FilterExec;
use datafusion::physical_plan::limit::GlobalLimitExec;
use datafusion::physical_plan::repartition::RepartitionExec;
use datafusion::physical_plan::sorts::sort::SortExec;
use datafusion::physical_plan::sorts::sort_preserving_merge::SortPreservingMergeExec;
use datafusion::physical_plan::{ExecutionPlan, Partitioning};
use tracing::debug;
use veneer_core::Order;

use crate::exec::{df_err, VirtualScanExec};

#[derive(Debug, Default)]
pub struct PushSortIntoScan;

impl PushSortIntoScan {
    pub fn new() -> Self {
        Self
    }
}

impl PhysicalOptimizerRule for PushSortIntoScan {
    fn optimize(
        &self,
        plan: Arc<dyn ExecutionPlan>,
        _config: &ConfigOptions,
    ) -> DFResult<Arc<dyn ExecutionPlan>> {
        plan.transform_down(|node| match push_sort(&node)? {
            Some(replacement) => Ok(Transformed::yes(replacement)),
            None => Ok(Transformed::no(node)),
        })
        .map(|t| t.data)
    }

    fn name(&self) -> &str {
        "push_sort_into_virtual_scan"
    }

    fn schema_check(&self) -> bool {
        true
    }
}

fn min_fetch(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn push_sort(node: &Arc<dyn ExecutionPlan>) -> DFResult<Option<Arc<dyn ExecutionPlan>>> {
    let (ordering, mut fetch, mut child): (Vec<PhysicalSortExpr>, _, _) =
        if let Some(merge) = node.as_any().downcast_ref::<SortPreservingMergeExec>() {
            (
                merge.expr().iter().cloned().collect(),
                merge.fetch(),
                Arc::clone(merge.input()),
            )
        } else if let Some(sort) = node.as_any().downcast_ref::<SortExec>() {
            // A partition-preserving sort feeds a parent that expects its
            // partitioning; leave it alone.
            if sort.preserve_partitioning() {
                return Ok(None);
            }
            (
                sort.expr().iter().cloned().collect(),
                sort.fetch(),
                Arc::clone(sort.input()),
            )
        } else {
            return Ok(None);
        };

    let schema = node.schema();
    let mut kept: Vec<Arc<dyn ExecutionPlan>> = Vec::new();
    loop {
        let any = child.as_any();
        if any.is::<VirtualScanExec>() {
            break;
        }
        let next = if let Some(sort) = any.downcast_ref::<SortExec>() {
            fetch = min_fetch(fetch, sort.fetch());
            Arc::clone(sort.input())
        } else if let Some(repartition) = any.downcast_ref::<RepartitionExec>() {
            if !matches!(repartition.partitioning(), Partitioning::RoundRobinBatch(_)) {
                return Ok(None);
            }
            Arc::clone(repartition.input())
        } else if let Some(coalesce) = any.downcast_ref::<CoalescePartitionsExec>() {
            Arc::clone(coalesce.input())
        } else if any.is::<CoalesceBatchesExec>() || any.is::<FilterExec>() {
            if child.schema() != schema {
                return Ok(None);
            }
            let Some(input) = child.children().first().map(|c| Arc::clone(*c)) else {
                return Ok(None);
            };
            kept.push(Arc::clone(&child));
            input
        } else {
            return Ok(None);
        };
        child = next;
    }

    let Some(scan) = child.as_any().downcast_ref::<VirtualScanExec>() else {
        return Ok(None);
    };
    if scan.schema() != schema {
        return Ok(None);
    }
    let Some(order) = sort_keys(&ordering, &schema) else {
        return Ok(None);
    };
    // Rows dropped by a filter above the scan must not count toward the cap.
    let scan_fetch = if kept.is_empty() { fetch } else { None };
    let Some(pushed) = scan.with_order(&order, scan_fetch).map_err(df_err)? else {
        return Ok(None);
    };
    debug!(
        "Pushed ORDER BY into scan of '{}': {}",
        scan.table().name(),
        pushed.index_plan().index_name
    );

    let mut plan: Arc<dyn ExecutionPlan> = Arc::new(pushed);
    let filtered = !kept.is_empty();
    for parent in kept.into_iter().rev() {
        plan = parent.with_new_children(vec![plan])?;
    }
    if let (true, Some(fetch)) = (filtered, fetch) {
        plan = Arc::new(GlobalLimitExec::new(plan, 0, Some(fetch)));
    }
    Ok(Some(plan))
}

/// `(column, direction)` keys for sort expressions over plain scan columns.
/// Native orderings put nulls last, so only such sorts qualify.
fn sort_keys(ordering: &[PhysicalSortExpr], schema: &SchemaRef) -> Option<Vec<(String, Order)>> {
    if ordering.is_empty() {
        return None;
    }
    ordering
        .iter()
        .map(|sort| {
            let column = sort.expr.as_any().downcast_ref::<Column>()?;
            if sort.options.nulls_first {
                return None;
            }
            let field = schema.fields().get(column.index())?;
            let direction = if sort.options.descending {
                Order::Descending
            } else {
                Order::Ascending
            };
            Some((field.name().clone(), direction))
        })
        .collect()
}
