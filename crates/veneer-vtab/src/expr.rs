//! Translation of DataFusion filter expressions into constraints.

use arrow::datatypes::DataType;
use chrono::DateTime;
use datafusion::logical_expr::{Between, BinaryExpr, Cast, Operator as DfOperator, TryCast};
use datafusion::prelude::Expr;
use datafusion::scalar::ScalarValue;
use veneer_core::{Columns, Constraint, Operator, Value};

use crate::convert::{arrow_type, days_to_date, micros_to_time};

/// Translate `expr` into a conjunction of constraints.
///
/// Returns `None` when any part of the expression cannot be expressed as a
/// column-versus-literal comparison; the host then evaluates it itself.
pub fn to_constraints(expr: &Expr, columns: &Columns) -> Option<Vec<Constraint>> {
    let mut out = Vec::new();
    collect(expr, columns, &mut out)?;
    Some(out)
}

fn collect(expr: &Expr, columns: &Columns, out: &mut Vec<Constraint>) -> Option<()> {
    match expr {
        Expr::BinaryExpr(BinaryExpr { left, op: DfOperator::And, right }) => {
            collect(left, columns, out)?;
            collect(right, columns, out)
        }
        Expr::BinaryExpr(BinaryExpr { left, op, right }) => {
            let op = comparison(*op)?;
            let constraint = match (column_name(left, columns), column_name(right, columns)) {
                (Some(name), None) => Constraint::new(name, op, literal(right, columns, name)?),
                (None, Some(name)) => Constraint::new(name, op.flip(), literal(left, columns, name)?),
                _ => return None,
            };
            out.push(constraint);
            Some(())
        }
        Expr::IsNull(inner) => {
            out.push(Constraint::is_null(column_name(inner, columns)?));
            Some(())
        }
        Expr::IsNotNull(inner) => {
            out.push(Constraint::is_not_null(column_name(inner, columns)?));
            Some(())
        }
        Expr::Between(Between { expr, negated: false, low, high }) => {
            let name = column_name(expr, columns)?;
            let low = literal(low, columns, name)?;
            let high = literal(high, columns, name)?;
            out.push(Constraint::new(name, Operator::Ge, low));
            out.push(Constraint::new(name, Operator::Le, high));
            Some(())
        }
        _ => None,
    }
}

fn comparison(op: DfOperator) -> Option<Operator> {
    match op {
        DfOperator::Eq => Some(Operator::Eq),
        DfOperator::NotEq => Some(Operator::Ne),
        DfOperator::Lt => Some(Operator::Lt),
        DfOperator::LtEq => Some(Operator::Le),
        DfOperator::Gt => Some(Operator::Gt),
        DfOperator::GtEq => Some(Operator::Ge),
        _ => None,
    }
}

fn column_name<'a>(expr: &Expr, columns: &'a Columns) -> Option<&'a str> {
    match expr {
        Expr::Column(column) => columns.get(&column.name).map(|c| c.name.as_str()),
        _ => None,
    }
}

fn literal(expr: &Expr, columns: &Columns, column: &str) -> Option<Value> {
    let scalar = match expr {
        Expr::Literal(scalar) => scalar.clone(),
        Expr::Cast(Cast { expr, .. }) | Expr::TryCast(TryCast { expr, .. }) => match expr.as_ref() {
            Expr::Literal(scalar) => scalar.clone(),
            _ => return None,
        },
        _ => return None,
    };
    let target = arrow_type(columns.get(column)?.column_type);
    if scalar.is_null() {
        return Some(Value::Null);
    }
    let source = scalar.data_type();
    let cast = scalar.cast_to(&target).ok()?;
    // refuse lossy casts such as 1.5 -> 1
    let textual = matches!(source, DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View);
    if !textual && source != target {
        let back = cast.cast_to(&source).ok()?;
        if back != scalar {
            return None;
        }
    }
    scalar_to_value(&cast)
}

fn scalar_to_value(scalar: &ScalarValue) -> Option<Value> {
    let value = match scalar {
        ScalarValue::Utf8(Some(s)) | ScalarValue::LargeUtf8(Some(s)) | ScalarValue::Utf8View(Some(s)) => {
            Value::String(s.clone())
        }
        ScalarValue::Int64(Some(v)) => Value::Integer(*v),
        ScalarValue::Float64(Some(v)) if !v.is_nan() => Value::Float(*v),
        ScalarValue::Boolean(Some(v)) => Value::Boolean(*v),
        ScalarValue::Date32(Some(days)) => Value::Date(days_to_date(*days)?),
        ScalarValue::Time64Microsecond(Some(micros)) => Value::Time(micros_to_time(*micros)?),
        ScalarValue::TimestampMicrosecond(Some(micros), _) => {
            Value::DateTime(DateTime::from_timestamp_micros(*micros)?)
        }
        _ => return None,
    };
    Some(value)
}
