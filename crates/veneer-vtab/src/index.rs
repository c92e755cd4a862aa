//! Best-index negotiation.
//!
//! Given the planner's constraints and requested ordering, decide which
//! constraints the adapter receives, whether the host may skip re-checking
//! them, what the scan costs, and the reduced filter set to execute with.

use std::sync::Arc;

use tracing::debug;
use veneer_core::{
    apply_equivalence, reduce, Adapter, Bounds, Columns, Constraint, Equivalence, Operator, Order,
    Result, SortKey, Value, VeneerError,
};

/// How one input constraint is used by the plan, in input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintUsage {
    /// Passed to the adapter.
    pub pushed: bool,
    /// The host may skip evaluating it.
    pub omit: bool,
}

/// What execution will ask of the adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Committed {
    /// The pushed constraints cannot all hold; the scan is empty.
    Impossible,
    Filters {
        bounds: Bounds,
        order: Vec<(String, Order)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexPlan {
    pub usage: Vec<ConstraintUsage>,
    pub order_by_consumed: bool,
    pub estimated_cost: u64,
    /// Stable identifier of the pushed constraint set.
    pub index_name: String,
    pub committed: Committed,
    /// Pushed filters on inexact columns, re-applied to produced rows.
    pub recheck: Bounds,
}

impl IndexPlan {
    pub fn is_impossible(&self) -> bool {
        matches!(self.committed, Committed::Impossible)
    }
}

fn validate(columns: &Columns, constraint: &Constraint) -> Result<()> {
    let column = columns
        .get(&constraint.column)
        .ok_or_else(|| VeneerError::UnknownColumn(constraint.column.clone()))?;
    if !constraint.op.takes_value() || constraint.value.is_null() {
        return Ok(());
    }
    if let Value::Float(v) = constraint.value {
        if v.is_nan() {
            return Err(VeneerError::unsupported(format!(
                "NaN is not comparable ({})",
                constraint.column
            )));
        }
    }
    match constraint.value.column_type() {
        Some(ty) if ty == column.column_type => Ok(()),
        _ => Err(VeneerError::unsupported(format!(
            "{:?} does not match column {} of type {}",
            constraint.value, column.name, column.column_type
        ))),
    }
}

fn describe(column: &str, op: Operator) -> String {
    if op.takes_value() {
        format!("{}{}", column, op.symbol())
    } else {
        format!("{} {}", column, op.symbol())
    }
}

/// Plan a scan of `adapter` for the given constraints and ordering.
pub fn best_index(
    adapter: &dyn Adapter,
    columns: &Columns,
    equivalences: &[Arc<dyn Equivalence>],
    constraints: &[Constraint],
    order: &[(String, Order)],
) -> Result<IndexPlan> {
    for constraint in constraints {
        validate(columns, constraint)?;
    }
    let mut sort_keys = Vec::with_capacity(order.len());
    for (name, direction) in order {
        let column = columns
            .get(name)
            .ok_or_else(|| VeneerError::UnknownColumn(name.clone()))?;
        sort_keys.push(SortKey {
            column: name.clone(),
            order: *direction,
            native: column.order.supports(*direction),
        });
    }

    let mut usage = Vec::with_capacity(constraints.len());
    let mut pushed = Vec::new();
    for constraint in constraints {
        // validated above
        let Some(column) = columns.get(&constraint.column) else {
            continue;
        };
        let is_pushed = column.accepts(constraint.op);
        usage.push(ConstraintUsage {
            pushed: is_pushed,
            omit: is_pushed && column.exact,
        });
        if is_pushed {
            pushed.push((constraint, column));
        }
    }

    let order_by_consumed = sort_keys.iter().all(|k| k.native);
    let filtered: Vec<(String, Operator)> = pushed
        .iter()
        .map(|(c, _)| (c.column.clone(), c.op))
        .collect();
    let estimated_cost = adapter.cost(&filtered, &sort_keys);

    let reduced = reduce(pushed.iter().map(|(c, column)| (*c, column.kind))).and_then(|mut bounds| {
        for equivalence in equivalences {
            apply_equivalence(equivalence.as_ref(), &mut bounds)?;
        }
        Ok(bounds)
    });

    let (committed, recheck) = match reduced {
        Ok(bounds) => {
            let recheck = reduce(
                pushed
                    .iter()
                    .filter(|(_, column)| !column.exact)
                    .map(|(c, column)| (*c, column.kind)),
            )?;
            let committed_order = if order_by_consumed { order.to_vec() } else { Vec::new() };
            (
                Committed::Filters {
                    bounds,
                    order: committed_order,
                },
                recheck,
            )
        }
        Err(e) if e.is_impossible() => {
            debug!("Impossible filter on '{}': {}", adapter.name(), e);
            (Committed::Impossible, Bounds::new())
        }
        Err(e) => return Err(e),
    };

    let index_name = if matches!(committed, Committed::Impossible) {
        "impossible".to_string()
    } else {
        let mut name = filtered
            .iter()
            .map(|(column, op)| describe(column, *op))
            .collect::<Vec<_>>()
            .join(",");
        if order_by_consumed && !order.is_empty() {
            let keys = order
                .iter()
                .map(|(column, direction)| format!("{} {}", column, direction))
                .collect::<Vec<_>>()
                .join(",");
            name.push_str(&format!(";order={}", keys));
        }
        name
    };

    debug!(
        "best_index on '{}': index={:?} cost={} order_consumed={}",
        adapter.name(),
        index_name,
        estimated_cost,
        order_by_consumed
    );

    Ok(IndexPlan {
        usage,
        order_by_consumed,
        estimated_cost,
        index_name,
        committed,
        recheck,
    })
}
