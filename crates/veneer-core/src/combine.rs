//! Merging constraints on columns that encode the same quantity.
//!
//! Some sources expose one field under two representations, e.g. a
//! timestamp and its epoch seconds. Constraints on either are translated
//! into a single range on the primary column before reaching the adapter.

use std::fmt;

use crate::coerce::{datetime_to_epoch, epoch_to_datetime};
use crate::error::{Result, VeneerError};
use crate::filter::{Bound, Bounds, ColumnFilter, Filter, Range};
use crate::value::Value;

/// A bijection between the values of two columns.
pub trait Equivalence: Send + Sync + fmt::Debug {
    fn primary(&self) -> &str;
    fn secondary(&self) -> &str;
    fn to_primary(&self, value: &Value) -> Result<Value>;
    fn to_secondary(&self, value: &Value) -> Result<Value>;
}

/// Datetime column paired with float epoch seconds.
#[derive(Debug, Clone)]
pub struct EpochSeconds {
    primary: String,
    secondary: String,
}

impl EpochSeconds {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }
}

impl Equivalence for EpochSeconds {
    fn primary(&self) -> &str {
        &self.primary
    }

    fn secondary(&self) -> &str {
        &self.secondary
    }

    fn to_primary(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Float(v) => epoch_to_datetime(*v).map(Value::DateTime),
            Value::Integer(v) => epoch_to_datetime(*v as f64).map(Value::DateTime),
            other => Err(VeneerError::unsupported(format!(
                "expected epoch seconds, got {:?}",
                other
            ))),
        }
    }

    fn to_secondary(&self, value: &Value) -> Result<Value> {
        match value {
            Value::DateTime(v) => Ok(Value::Float(datetime_to_epoch(v))),
            other => Err(VeneerError::unsupported(format!(
                "expected datetime, got {:?}",
                other
            ))),
        }
    }
}

/// Unit the combined range is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basis {
    Primary,
    Secondary,
}

fn as_range(filter: Option<&ColumnFilter>) -> Result<Range> {
    match filter.and_then(|f| f.filter.as_ref()) {
        None => Ok(Range::unbounded()),
        Some(Filter::Range(r)) => Ok(r.clone()),
        Some(Filter::Equal(_)) => Err(VeneerError::InvalidFilterCombination(
            "Invalid filter".to_string(),
        )),
    }
}

fn convert(range: &Range, f: impl Fn(&Value) -> Result<Value>) -> Result<Range> {
    let map = |bound: &Option<Bound>| -> Result<Option<Bound>> {
        bound
            .as_ref()
            .map(|b| {
                Ok(Bound {
                    value: f(&b.value)?,
                    inclusive: b.inclusive,
                })
            })
            .transpose()
    };
    Range::new(map(&range.lower)?, map(&range.upper)?)
}

/// Intersect the ranges on both columns of `equivalence`, in primary units.
pub fn combine(
    equivalence: &dyn Equivalence,
    primary: Option<&ColumnFilter>,
    secondary: Option<&ColumnFilter>,
) -> Result<Range> {
    combine_as(equivalence, primary, secondary, Basis::Primary)
}

pub fn combine_as(
    equivalence: &dyn Equivalence,
    primary: Option<&ColumnFilter>,
    secondary: Option<&ColumnFilter>,
    basis: Basis,
) -> Result<Range> {
    let primary = as_range(primary)?;
    let secondary = as_range(secondary)?;
    match basis {
        Basis::Primary => {
            let converted = convert(&secondary, |v| equivalence.to_primary(v))?;
            primary.intersect(&converted)
        }
        Basis::Secondary => {
            let converted = convert(&primary, |v| equivalence.to_secondary(v))?;
            secondary.intersect(&converted)
        }
    }
}

/// Move any range on the secondary column onto the primary one. Exclusions
/// and nullability stay where they were.
pub fn apply_equivalence(equivalence: &dyn Equivalence, bounds: &mut Bounds) -> Result<()> {
    let has_secondary = bounds
        .get(equivalence.secondary())
        .is_some_and(|f| f.filter.is_some());
    if !has_secondary {
        return Ok(());
    }

    let range = combine(
        equivalence,
        bounds.get(equivalence.primary()),
        bounds.get(equivalence.secondary()),
    )?;

    if let Some(secondary) = bounds.get_mut(equivalence.secondary()) {
        secondary.filter = None;
        if secondary.is_empty() {
            bounds.remove(equivalence.secondary());
        }
    }
    bounds
        .entry(equivalence.primary().to_string())
        .or_default()
        .filter = Some(Filter::Range(range));
    Ok(())
}
