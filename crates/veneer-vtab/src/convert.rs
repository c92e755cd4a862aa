//! Conversions between Veneer rows and Arrow record batches.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray,
    Time64MicrosecondArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use veneer_core::{ColumnType, Columns, Result, Row, Value, VeneerError};

/// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub fn arrow_type(column_type: ColumnType) -> DataType {
    match column_type {
        ColumnType::String => DataType::Utf8,
        ColumnType::Integer => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::Date => DataType::Date32,
        ColumnType::Time => DataType::Time64(TimeUnit::Microsecond),
        ColumnType::DateTime => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
    }
}

/// Arrow schema for an adapter's columns. Every field is nullable.
pub fn schema_for(columns: &Columns) -> SchemaRef {
    let fields: Vec<Field> = columns
        .iter()
        .map(|c| Field::new(&c.name, arrow_type(c.column_type), true))
        .collect();
    Arc::new(Schema::new(fields))
}

pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

pub fn time_to_micros(time: NaiveTime) -> i64 {
    time.num_seconds_from_midnight() as i64 * 1_000_000 + (time.nanosecond() / 1_000) as i64
}

pub fn micros_to_time(micros: i64) -> Option<NaiveTime> {
    let secs = u32::try_from(micros.div_euclid(1_000_000)).ok()?;
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok()?;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
}

fn mismatch(column: &str, value: &Value) -> VeneerError {
    VeneerError::InvalidState(format!(
        "value {:?} does not match the type of column {}",
        value, column
    ))
}

fn build_array(name: &str, column_type: ColumnType, rows: &[Row], index: usize) -> Result<ArrayRef> {
    fn collect<T>(
        name: &str,
        rows: &[Row],
        index: usize,
        get: impl Fn(&Value) -> Option<T>,
    ) -> Result<Vec<Option<T>>> {
        rows.iter()
            .map(|row| match &row[index] {
                Value::Null => Ok(None),
                value => get(value).map(Some).ok_or_else(|| mismatch(name, value)),
            })
            .collect()
    }

    let array: ArrayRef = match column_type {
        ColumnType::String => Arc::new(StringArray::from(collect(name, rows, index, |v| {
            v.as_str().map(str::to_string)
        })?)),
        ColumnType::Integer => Arc::new(Int64Array::from(collect(name, rows, index, Value::as_i64)?)),
        ColumnType::Float => Arc::new(Float64Array::from(collect(name, rows, index, |v| match v {
            Value::Float(f) => Some(*f),
            _ => None,
        })?)),
        ColumnType::Boolean => Arc::new(BooleanArray::from(collect(name, rows, index, Value::as_bool)?)),
        ColumnType::Date => Arc::new(Date32Array::from(collect(name, rows, index, |v| {
            v.as_date().map(date_to_days)
        })?)),
        ColumnType::Time => Arc::new(Time64MicrosecondArray::from(collect(name, rows, index, |v| {
            v.as_time().map(time_to_micros)
        })?)),
        ColumnType::DateTime => Arc::new(
            TimestampMicrosecondArray::from(collect(name, rows, index, |v| {
                v.as_datetime().map(|dt| dt.timestamp_micros())
            })?)
            .with_timezone("UTC"),
        ),
    };
    Ok(array)
}

/// Build a batch holding the `projection` columns of `rows`.
///
/// `rows` must already be coerced to `columns`' declared types.
pub fn rows_to_batch(
    columns: &Columns,
    schema: SchemaRef,
    projection: &[usize],
    rows: &[Row],
) -> Result<RecordBatch> {
    let mut arrays = Vec::with_capacity(projection.len());
    for &index in projection {
        let column = columns
            .iter()
            .nth(index)
            .ok_or_else(|| VeneerError::InvalidState(format!("no column at index {}", index)))?;
        arrays.push(build_array(&column.name, column.column_type, rows, index)?);
    }
    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    RecordBatch::try_new_with_options(schema, arrays, &options)
        .map_err(|e| VeneerError::Engine(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use chrono::{TimeZone, Utc};
    use veneer_core::Column;

    fn columns() -> Columns {
        Columns::new(vec![
            Column::new("name", ColumnType::String),
            Column::new("n", ColumnType::Integer),
            Column::new("x", ColumnType::Float),
            Column::new("flag", ColumnType::Boolean),
            Column::new("day", ColumnType::Date),
            Column::new("at", ColumnType::Time),
            Column::new("ts", ColumnType::DateTime),
        ])
        .unwrap()
    }

    #[test]
    fn test_schema_types() {
        let schema = schema_for(&columns());
        assert_eq!(schema.fields().len(), 7);
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(
            schema.field(6).data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
        );
        assert!(schema.fields().iter().all(|f| f.is_nullable()));
    }

    #[test]
    fn test_date_and_time_conversions() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(date_to_days(epoch), 0);
        let d = NaiveDate::from_ymd_opt(2021, 3, 17).unwrap();
        assert_eq!(days_to_date(date_to_days(d)), Some(d));

        let t = NaiveTime::from_hms_micro_opt(12, 30, 5, 250).unwrap();
        assert_eq!(time_to_micros(t), 45_005_000_250);
        assert_eq!(micros_to_time(45_005_000_250), Some(t));
        assert_eq!(micros_to_time(86_400_000_000), None);
    }

    #[test]
    fn test_rows_to_batch_with_nulls() {
        let columns = columns();
        let schema = schema_for(&columns);
        let ts = Utc.with_ymd_and_hms(2021, 3, 17, 12, 0, 0).unwrap();
        let rows = vec![
            vec![
                Value::from("a"),
                Value::Integer(1),
                Value::Float(0.5),
                Value::Boolean(true),
                Value::Date(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()),
                Value::Time(NaiveTime::from_hms_opt(0, 0, 1).unwrap()),
                Value::DateTime(ts),
            ],
            vec![Value::Null; 7],
        ];
        let batch = rows_to_batch(&columns, schema, &[0, 1, 2, 3, 4, 5, 6], &rows).unwrap();
        assert_eq!(batch.num_rows(), 2);
        let days = batch.column(4).as_any().downcast_ref::<Date32Array>().unwrap();
        assert_eq!(days.value(0), 1);
        let stamps = batch
            .column(6)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .unwrap();
        assert_eq!(stamps.value(0), ts.timestamp_micros());
        assert!(batch.columns().iter().all(|c| c.is_null(1)));
    }

    #[test]
    fn test_projection_and_empty_projection() {
        let columns = columns();
        let full = schema_for(&columns);
        let rows = vec![vec![Value::from("a"), Value::Integer(7), Value::Null, Value::Null, Value::Null, Value::Null, Value::Null]];

        let projected = Arc::new(full.project(&[1]).unwrap());
        let batch = rows_to_batch(&columns, projected, &[1], &rows).unwrap();
        let n = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(n.value(0), 7);

        let empty = Arc::new(full.project(&[]).unwrap());
        let batch = rows_to_batch(&columns, empty, &[], &rows).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.num_columns(), 0);
    }

    #[test]
    fn test_uncoerced_value_is_rejected() {
        let columns = columns();
        let schema = Arc::new(schema_for(&columns).project(&[1]).unwrap());
        let rows = vec![vec![Value::Null, Value::from("1"), Value::Null, Value::Null, Value::Null, Value::Null, Value::Null]];
        let err = rows_to_batch(&columns, schema, &[1], &rows).unwrap_err();
        assert!(matches!(err, VeneerError::InvalidState(_)));
    }
}
