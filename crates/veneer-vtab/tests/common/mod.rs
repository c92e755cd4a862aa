//! Shared fixtures: scripted adapters, a fake HTTP transport and
//! helpers for reading Arrow batches.

#![allow(dead_code)]

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use arrow::array::{Array, Float64Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use futures::StreamExt;
use url::Url;
use veneer_adapters::{HttpResponse, MemoryAdapter, Transport};
use veneer_core::{
    Adapter, Bounds, Column, ColumnType, Columns, Operator, Order, OrderSupport, Result, Row,
    RowStream, SourceError, Value,
};

/// `people(id INTEGER, name STRING, score FLOAT)`; only `id` and `name`
/// accept pushdown.
pub fn people_columns() -> Columns {
    Columns::new(vec![
        Column::new("id", ColumnType::Integer)
            .pushdown(&Operator::ALL)
            .exact()
            .order(OrderSupport::Both),
        Column::new("name", ColumnType::String)
            .pushdown(&[Operator::Eq])
            .exact(),
        Column::new("score", ColumnType::Float),
    ])
    .unwrap()
}

/// Loosely typed rows: scores arrive as floats, blanks and text.
pub fn people_rows() -> Vec<Row> {
    vec![
        vec![Value::Integer(1), Value::from("ada"), Value::Float(2.0)],
        vec![Value::Integer(2), Value::from("bob"), Value::from("")],
        vec![Value::Integer(3), Value::from("cy"), Value::from("1.5")],
        vec![Value::Integer(4), Value::from("dee"), Value::Float(9.25)],
    ]
}

pub fn people() -> MemoryAdapter {
    MemoryAdapter::new("people", people_columns(), people_rows()).unwrap()
}

/// Yields `ok_rows` rows, then fails with an upstream error.
#[derive(Debug)]
pub struct Failing {
    columns: Columns,
    ok_rows: i64,
}

impl Failing {
    pub fn new(ok_rows: i64) -> Self {
        Self {
            columns: Columns::new(vec![Column::new("n", ColumnType::Integer)]).unwrap(),
            ok_rows,
        }
    }
}

#[async_trait]
impl Adapter for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn columns(&self) -> &Columns {
        &self.columns
    }

    async fn rows(&self, _bounds: &Bounds, _order: &[(String, Order)]) -> Result<RowStream> {
        let mut items: Vec<Result<Row>> = (0..self.ok_rows).map(|n| Ok(vec![Value::Integer(n)])).collect();
        items.push(Err(SourceError::new("failing", Some(503), "upstream unavailable").into()));
        Ok(futures::stream::iter(items).boxed())
    }
}

/// Counts `rows` and `close` invocations; produces `0..n`.
#[derive(Debug)]
pub struct Counting {
    columns: Columns,
    n: i64,
    pub rows_calls: AtomicUsize,
    pub close_calls: Arc<AtomicUsize>,
}

impl Counting {
    pub fn new(n: i64) -> Self {
        Self {
            columns: Columns::new(vec![Column::new("n", ColumnType::Integer)
                .pushdown(&[Operator::Eq])
                .exact()])
            .unwrap(),
            n,
            rows_calls: AtomicUsize::new(0),
            close_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Adapter for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    fn columns(&self) -> &Columns {
        &self.columns
    }

    async fn rows(&self, _bounds: &Bounds, _order: &[(String, Order)]) -> Result<RowStream> {
        self.rows_calls.fetch_add(1, Ordering::SeqCst);
        Ok(futures::stream::iter((0..self.n).map(|n| Ok(vec![Value::Integer(n)]))).boxed())
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Answers every WeatherAPI history request with the given hours of the
/// requested day, recording each URL.
pub struct FakeWeather {
    hours: Vec<u32>,
    calls: Mutex<Vec<Url>>,
}

impl FakeWeather {
    pub fn new(hours: &[u32]) -> Self {
        Self {
            hours: hours.to_vec(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<Url> {
        self.calls.lock().unwrap().clone()
    }

    pub fn days(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|u| u.query_pairs().find(|(k, _)| k == "dt").map(|(_, v)| v.into_owned()))
            .collect()
    }
}

impl fmt::Debug for FakeWeather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeWeather").finish()
    }
}

#[async_trait]
impl Transport for FakeWeather {
    async fn get(&self, url: &Url, _bearer: Option<&str>) -> Result<HttpResponse> {
        self.calls.lock().unwrap().push(url.clone());
        let dt = url
            .query_pairs()
            .find(|(k, _)| k == "dt")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        let day = NaiveDate::parse_from_str(&dt, "%Y-%m-%d").unwrap();
        let hours: Vec<serde_json::Value> = self
            .hours
            .iter()
            .map(|h| {
                let at = Utc.from_utc_datetime(&day.and_hms_opt(*h, 0, 0).unwrap());
                serde_json::json!({
                    "time_epoch": at.timestamp(),
                    "time": at.format("%Y-%m-%d %H:%M").to_string(),
                    "temp_c": 6.7,
                    "is_day": 1,
                    "humidity": 96,
                    "wind_dir": "SE",
                    "chance_of_rain": "0"
                })
            })
            .collect();
        let body = serde_json::json!({
            "forecast": {"forecastday": [{"date": dt, "hour": hours}]}
        });
        Ok(HttpResponse {
            status: 200,
            body: body.to_string(),
        })
    }
}

/// A two-column sheet (`country`, `cnt`) answering gviz queries, recording
/// the bearer token of every request.
#[derive(Debug, Default)]
pub struct FakeSheet {
    bearers: Mutex<Vec<Option<String>>>,
}

impl FakeSheet {
    pub fn bearers(&self) -> Vec<Option<String>> {
        self.bearers.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeSheet {
    async fn get(&self, url: &Url, bearer: Option<&str>) -> Result<HttpResponse> {
        self.bearers.lock().unwrap().push(bearer.map(str::to_string));
        let tq = url
            .query_pairs()
            .find(|(k, _)| k == "tq")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        let rows = if tq.contains("LIMIT 0") {
            serde_json::json!([])
        } else {
            serde_json::json!([
                {"c": [{"v": "BR"}, {"v": 1.0}]},
                {"c": [{"v": "IN"}, {"v": 5.0}]}
            ])
        };
        let body = serde_json::json!({
            "status": "ok",
            "table": {
                "cols": [
                    {"id": "A", "label": "country", "type": "string"},
                    {"id": "B", "label": "cnt", "type": "number"}
                ],
                "rows": rows
            }
        });
        Ok(HttpResponse {
            status: 200,
            body: body.to_string(),
        })
    }
}

pub fn total_rows(batches: &[RecordBatch]) -> usize {
    batches.iter().map(|b| b.num_rows()).sum()
}

pub fn int_column(batches: &[RecordBatch], index: usize) -> Vec<Option<i64>> {
    let mut out = Vec::new();
    for batch in batches {
        let array = batch.column(index).as_any().downcast_ref::<Int64Array>().unwrap();
        out.extend((0..array.len()).map(|i| (!array.is_null(i)).then(|| array.value(i))));
    }
    out
}

pub fn float_column(batches: &[RecordBatch], index: usize) -> Vec<Option<f64>> {
    let mut out = Vec::new();
    for batch in batches {
        let array = batch.column(index).as_any().downcast_ref::<Float64Array>().unwrap();
        out.extend((0..array.len()).map(|i| (!array.is_null(i)).then(|| array.value(i))));
    }
    out
}

pub fn string_column(batches: &[RecordBatch], index: usize) -> Vec<Option<String>> {
    let mut out = Vec::new();
    for batch in batches {
        let array = batch.column(index).as_any().downcast_ref::<StringArray>().unwrap();
        out.extend((0..array.len()).map(|i| (!array.is_null(i)).then(|| array.value(i).to_string())));
    }
    out
}
