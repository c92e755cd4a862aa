//! Operator and constraint algebra.
//!
//! Raw `(column, operator, value)` triples from the planner are reduced per
//! column into the tightest `Equal` or `Range` shape, an exclusion list for
//! `!=`, and a nullability requirement. Contradictions surface as
//! `VeneerError::ImpossibleFilter`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VeneerError};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub const ALL: [Operator; 8] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Ge,
        Operator::Lt,
        Operator::Le,
        Operator::IsNull,
        Operator::IsNotNull,
    ];

    /// `false` for the nullability checks, which carry no operand.
    pub fn takes_value(&self) -> bool {
        !matches!(self, Operator::IsNull | Operator::IsNotNull)
    }

    /// Mirror the operator for `value OP column` written as `column OP' value`.
    pub fn flip(&self) -> Operator {
        match self {
            Operator::Gt => Operator::Lt,
            Operator::Ge => Operator::Le,
            Operator::Lt => Operator::Gt,
            Operator::Le => Operator::Ge,
            other => *other,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A raw constraint as presented by the host planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub column: String,
    pub op: Operator,
    /// `Value::Null` for `IsNull` / `IsNotNull`.
    pub value: Value,
}

impl Constraint {
    pub fn new(column: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::new(column, Operator::IsNull, Value::Null)
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::new(column, Operator::IsNotNull, Value::Null)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op.takes_value() {
            write!(f, "{} {} {}", self.column, self.op, self.value)
        } else {
            write!(f, "{} {}", self.column, self.op)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub value: Value,
    pub inclusive: bool,
}

impl Bound {
    pub fn inclusive(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            inclusive: true,
        }
    }

    pub fn exclusive(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            inclusive: false,
        }
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering> {
    a.compare(b)
        .ok_or_else(|| VeneerError::unsupported(format!("cannot compare {:?} with {:?}", a, b)))
}

/// An interval with optional bounds. Construct through [`Range::new`] so that
/// an empty interval is never represented.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Range {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

impl Range {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(lower: Option<Bound>, upper: Option<Bound>) -> Result<Self> {
        if let (Some(lo), Some(hi)) = (&lower, &upper) {
            match compare(&lo.value, &hi.value)? {
                Ordering::Greater => {
                    return Err(VeneerError::impossible(format!(
                        "lower bound {} is above upper bound {}",
                        lo.value, hi.value
                    )))
                }
                Ordering::Equal if !(lo.inclusive && hi.inclusive) => {
                    return Err(VeneerError::impossible(format!(
                        "empty interval at {}",
                        lo.value
                    )))
                }
                _ => {}
            }
        }
        Ok(Self { lower, upper })
    }

    pub fn point(value: Value) -> Self {
        Self {
            lower: Some(Bound::inclusive(value.clone())),
            upper: Some(Bound::inclusive(value)),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// The single value admitted by a closed `[v, v]` range.
    pub fn as_point(&self) -> Option<&Value> {
        match (&self.lower, &self.upper) {
            (Some(lo), Some(hi))
                if lo.inclusive
                    && hi.inclusive
                    && lo.value.compare(&hi.value) == Some(Ordering::Equal) =>
            {
                Some(&lo.value)
            }
            _ => None,
        }
    }

    pub fn contains(&self, value: &Value) -> Result<bool> {
        if let Some(lo) = &self.lower {
            match compare(value, &lo.value)? {
                Ordering::Less => return Ok(false),
                Ordering::Equal if !lo.inclusive => return Ok(false),
                _ => {}
            }
        }
        if let Some(hi) = &self.upper {
            match compare(value, &hi.value)? {
                Ordering::Greater => return Ok(false),
                Ordering::Equal if !hi.inclusive => return Ok(false),
                _ => {}
            }
        }
        Ok(true)
    }

    /// Tightest range admitted by both. On equal bound values the exclusive
    /// bound wins.
    pub fn intersect(&self, other: &Range) -> Result<Range> {
        let lower = tighter(&self.lower, &other.lower, Ordering::Greater)?;
        let upper = tighter(&self.upper, &other.upper, Ordering::Less)?;
        Range::new(lower, upper)
    }
}

fn tighter(a: &Option<Bound>, b: &Option<Bound>, wins: Ordering) -> Result<Option<Bound>> {
    Ok(match (a, b) {
        (None, None) => None,
        (Some(x), None) | (None, Some(x)) => Some(x.clone()),
        (Some(x), Some(y)) => match compare(&x.value, &y.value)? {
            Ordering::Equal => Some(Bound {
                value: x.value.clone(),
                inclusive: x.inclusive && y.inclusive,
            }),
            ord if ord == wins => Some(x.clone()),
            _ => Some(y.clone()),
        },
    })
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lower {
            Some(b) => write!(f, "{}{}", if b.inclusive { "[" } else { "(" }, b.value)?,
            None => f.write_str("(-inf")?,
        }
        f.write_str(", ")?;
        match &self.upper {
            Some(b) => write!(f, "{}{}", b.value, if b.inclusive { "]" } else { ")" }),
            None => f.write_str("+inf)"),
        }
    }
}

/// The shape a column's value constraints reduce to.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equal(Value),
    Range(Range),
}

impl Filter {
    pub fn intersect(&self, other: &Filter) -> Result<Filter> {
        match (self, other) {
            (Filter::Equal(a), Filter::Equal(b)) => {
                if compare(a, b)? == Ordering::Equal {
                    Ok(Filter::Equal(a.clone()))
                } else {
                    Err(VeneerError::impossible(format!("{} and {} are both required", a, b)))
                }
            }
            (Filter::Equal(v), Filter::Range(r)) | (Filter::Range(r), Filter::Equal(v)) => {
                if r.contains(v)? {
                    Ok(Filter::Equal(v.clone()))
                } else {
                    Err(VeneerError::impossible(format!("{} is outside {}", v, r)))
                }
            }
            (Filter::Range(a), Filter::Range(b)) => a.intersect(b).map(Filter::Range),
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Filter::Equal(v) => value.compare(v) == Some(Ordering::Equal),
            Filter::Range(r) => r.contains(value).unwrap_or(false),
        }
    }

    /// The single admitted value, if any.
    pub fn as_point(&self) -> Option<&Value> {
        match self {
            Filter::Equal(v) => Some(v),
            Filter::Range(r) => r.as_point(),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Equal(v) => write!(f, "= {}", v),
            Filter::Range(r) => write!(f, "in {}", r),
        }
    }
}

/// The filter shape a column prefers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Equal,
    #[default]
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nullability {
    Null,
    NotNull,
}

/// Everything known about one column after reduction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnFilter {
    pub filter: Option<Filter>,
    /// Values removed by `!=`.
    pub excluded: Vec<Value>,
    pub nullability: Option<Nullability>,
}

impl ColumnFilter {
    pub fn range(&self) -> Option<&Range> {
        match &self.filter {
            Some(Filter::Range(r)) => Some(r),
            _ => None,
        }
    }

    pub fn equal(&self) -> Option<&Value> {
        match &self.filter {
            Some(Filter::Equal(v)) => Some(v),
            _ => None,
        }
    }

    fn has_comparison(&self) -> bool {
        self.filter.is_some() || !self.excluded.is_empty()
    }

    /// Fold one more constraint into this column.
    pub fn apply(&mut self, op: Operator, value: &Value, kind: FilterKind) -> Result<()> {
        match op {
            Operator::IsNull => {
                if self.nullability == Some(Nullability::NotNull) {
                    return Err(VeneerError::impossible("IS NULL and IS NOT NULL"));
                }
                if self.has_comparison() {
                    return Err(VeneerError::impossible("IS NULL with a comparison"));
                }
                self.nullability = Some(Nullability::Null);
                return Ok(());
            }
            Operator::IsNotNull => {
                if self.nullability == Some(Nullability::Null) {
                    return Err(VeneerError::impossible("IS NULL and IS NOT NULL"));
                }
                self.nullability = Some(Nullability::NotNull);
                return Ok(());
            }
            _ => {}
        }

        if self.nullability == Some(Nullability::Null) {
            return Err(VeneerError::impossible("IS NULL with a comparison"));
        }
        if value.is_null() {
            return Err(VeneerError::impossible(format!("comparison {} NULL", op)));
        }

        let incoming = match op {
            Operator::Eq => match kind {
                FilterKind::Equal => Some(Filter::Equal(value.clone())),
                FilterKind::Range => Some(Filter::Range(Range::point(value.clone()))),
            },
            Operator::Gt => Some(Filter::Range(Range::new(Some(Bound::exclusive(value.clone())), None)?)),
            Operator::Ge => Some(Filter::Range(Range::new(Some(Bound::inclusive(value.clone())), None)?)),
            Operator::Lt => Some(Filter::Range(Range::new(None, Some(Bound::exclusive(value.clone())))?)),
            Operator::Le => Some(Filter::Range(Range::new(None, Some(Bound::inclusive(value.clone())))?)),
            Operator::Ne => {
                if !self.excluded.iter().any(|v| v.compare(value) == Some(Ordering::Equal)) {
                    self.excluded.push(value.clone());
                }
                None
            }
            Operator::IsNull | Operator::IsNotNull => None,
        };

        if let Some(incoming) = incoming {
            self.filter = Some(match &self.filter {
                Some(existing) => existing.intersect(&incoming)?,
                None => incoming,
            });
        }
        self.check_exclusions()
    }

    fn check_exclusions(&self) -> Result<()> {
        if let Some(point) = self.filter.as_ref().and_then(Filter::as_point) {
            if self.excluded.iter().any(|v| v.compare(point) == Some(Ordering::Equal)) {
                return Err(VeneerError::impossible(format!(
                    "{} is both required and excluded",
                    point
                )));
            }
        }
        Ok(())
    }

    /// Whether a produced value satisfies every constraint on the column.
    pub fn matches(&self, value: &Value) -> bool {
        if value.is_null() {
            return self.nullability != Some(Nullability::NotNull) && !self.has_comparison();
        }
        if self.nullability == Some(Nullability::Null) {
            return false;
        }
        if let Some(filter) = &self.filter {
            if !filter.matches(value) {
                return false;
            }
        }
        !self
            .excluded
            .iter()
            .any(|v| value.compare(v) == Some(Ordering::Equal))
    }

    pub fn is_empty(&self) -> bool {
        self.filter.is_none() && self.excluded.is_empty() && self.nullability.is_none()
    }
}

/// Reduced constraints keyed by column name.
pub type Bounds = BTreeMap<String, ColumnFilter>;

/// Reduce raw constraints, each paired with its column's preferred shape.
pub fn reduce<'a, I>(constraints: I) -> Result<Bounds>
where
    I: IntoIterator<Item = (&'a Constraint, FilterKind)>,
{
    let mut bounds = Bounds::new();
    for (constraint, kind) in constraints {
        bounds
            .entry(constraint.column.clone())
            .or_default()
            .apply(constraint.op, &constraint.value, kind)?;
    }
    Ok(bounds)
}
