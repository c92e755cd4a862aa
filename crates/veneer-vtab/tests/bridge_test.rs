//! Planning and cursor behavior of virtual tables over real adapters.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use common::{people, Counting, Failing, FakeWeather};
use futures::TryStreamExt;
use veneer_adapters::WeatherApi;
use veneer_core::{Constraint, Operator, Order, Row, Value, VeneerError};
use veneer_vtab::VirtualTable;

fn at(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 3, d, h, 0, 0).unwrap()
}

fn weather(transport: Arc<FakeWeather>) -> VirtualTable {
    let adapter = WeatherApi::new("iceland", "XXX", 7, transport)
        .unwrap()
        .with_today(NaiveDate::from_ymd_opt(2021, 3, 20).unwrap());
    VirtualTable::from_adapter("weather", Arc::new(adapter))
}

async fn collect(table: &VirtualTable, constraints: &[Constraint]) -> Vec<Row> {
    let plan = table.best_index(constraints, &[]).unwrap();
    table
        .open(&plan)
        .await
        .unwrap()
        .into_stream()
        .try_collect()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_contradictory_equalities_make_no_requests() {
    let transport = Arc::new(FakeWeather::new(&[12]));
    let table = weather(transport.clone());
    let rows = collect(
        &table,
        &[
            Constraint::new("time", Operator::Eq, at(17, 12)),
            Constraint::new("time", Operator::Eq, at(18, 12)),
        ],
    )
    .await;
    assert!(rows.is_empty());
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_inclusive_range_in_source_order() {
    let transport = Arc::new(FakeWeather::new(&[0, 12, 13]));
    let table = weather(transport.clone());
    let rows = collect(
        &table,
        &[
            Constraint::new("time", Operator::Ge, at(17, 12)),
            Constraint::new("time", Operator::Le, at(18, 12)),
        ],
    )
    .await;

    let time = table.columns().position("time").unwrap();
    let times: Vec<Value> = rows.iter().map(|r| r[time].clone()).collect();
    assert_eq!(
        times,
        vec![
            Value::DateTime(at(17, 12)),
            Value::DateTime(at(17, 13)),
            Value::DateTime(at(18, 0)),
            Value::DateTime(at(18, 12)),
        ]
    );
    assert_eq!(transport.days(), vec!["2021-03-17", "2021-03-18"]);
}

#[tokio::test]
async fn test_combined_columns_detect_impossible_scan() {
    let transport = Arc::new(FakeWeather::new(&[12]));
    let table = weather(transport.clone());
    let midnight = at(17, 0).timestamp() as f64;
    let constraints = [
        Constraint::new("time", Operator::Eq, at(17, 12)),
        Constraint::new("time_epoch", Operator::Lt, midnight),
    ];
    let plan = table.best_index(&constraints, &[]).unwrap();
    assert!(plan.is_impossible());
    assert!(collect(&table, &constraints).await.is_empty());
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_rows_are_coerced_to_declared_types() {
    let transport = Arc::new(FakeWeather::new(&[12]));
    let table = weather(transport);
    let rows = collect(
        &table,
        &[Constraint::new("time", Operator::Eq, at(17, 12))],
    )
    .await;
    assert_eq!(rows.len(), 1);
    let columns = table.columns();
    let row = &rows[0];
    assert_eq!(row[columns.position("is_day").unwrap()], Value::Boolean(true));
    assert_eq!(row[columns.position("humidity").unwrap()], Value::Integer(96));
    assert_eq!(row[columns.position("time_epoch").unwrap()], Value::Float(at(17, 12).timestamp() as f64));
    assert_eq!(row[columns.position("temp_f").unwrap()], Value::Null);
}

#[tokio::test]
async fn test_blank_numeric_becomes_typed_null() {
    let table = VirtualTable::from_adapter("people", Arc::new(people()));
    let rows = collect(&table, &[]).await;
    let score: Vec<Value> = rows.iter().map(|r| r[2].clone()).collect();
    assert_eq!(
        score,
        vec![Value::Float(2.0), Value::Null, Value::Float(1.5), Value::Float(9.25)]
    );
}

#[tokio::test]
async fn test_pushed_order_is_consumed() {
    let table = VirtualTable::from_adapter("people", Arc::new(people()));
    let order = [("id".to_string(), Order::Descending)];
    let plan = table.best_index(&[], &order).unwrap();
    assert!(plan.order_by_consumed);
    let rows: Vec<Row> = table.open(&plan).await.unwrap().into_stream().try_collect().await.unwrap();
    let ids: Vec<&Value> = rows.iter().map(|r| &r[0]).collect();
    assert_eq!(
        ids,
        vec![&Value::Integer(4), &Value::Integer(3), &Value::Integer(2), &Value::Integer(1)]
    );
}

#[tokio::test]
async fn test_cost_prefers_selective_plans() {
    let transport = Arc::new(FakeWeather::new(&[12]));
    let table = weather(transport);
    let none = table.best_index(&[], &[]).unwrap().estimated_cost;
    let eq = table
        .best_index(&[Constraint::new("time", Operator::Eq, at(17, 12))], &[])
        .unwrap()
        .estimated_cost;
    let range = table
        .best_index(&[Constraint::new("time", Operator::Ge, at(17, 12))], &[])
        .unwrap()
        .estimated_cost;
    let both = table
        .best_index(
            &[
                Constraint::new("time", Operator::Ge, at(17, 12)),
                Constraint::new("time", Operator::Le, at(18, 12)),
            ],
            &[],
        )
        .unwrap()
        .estimated_cost;
    assert_eq!((none, eq, range, both), (0, 1000, 7000, 14000));
}

#[tokio::test]
async fn test_source_error_surfaces_after_rows() {
    let table = VirtualTable::from_adapter("failing", Arc::new(Failing::new(2)));
    let plan = table.best_index(&[], &[]).unwrap();
    let mut cursor = table.open(&plan).await.unwrap();
    assert!(cursor.next_row().await.unwrap().is_some());
    assert!(cursor.next_row().await.unwrap().is_some());
    match cursor.next_row().await {
        Err(VeneerError::Source(e)) => {
            assert_eq!(e.status, Some(503));
            assert!(e.is_retryable());
        }
        other => panic!("expected a source error, got {:?}", other),
    }
    assert_eq!(cursor.next_row().await.unwrap(), None);
    assert_eq!(cursor.rows_emitted(), 2);
}

#[tokio::test]
async fn test_table_close_reaches_adapter_once() {
    let adapter = Arc::new(Counting::new(3));
    let closes = adapter.close_calls.clone();
    let table = VirtualTable::from_adapter("counting", adapter.clone());
    let plan = table.best_index(&[Constraint::new("n", Operator::Eq, 1i64)], &[]).unwrap();
    assert!(plan.usage[0].omit);
    let mut cursor = table.open(&plan).await.unwrap();
    cursor.close();
    cursor.close();
    table.close();
    table.close();
    drop(table);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(adapter.rows_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_epoch_upper_below_time_lower_is_impossible() {
    let transport = Arc::new(FakeWeather::new(&[12]));
    let table = weather(transport.clone());
    let lower = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
    let upper = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap().timestamp() as f64;
    let constraints = [
        Constraint::new("time", Operator::Ge, lower),
        Constraint::new("time_epoch", Operator::Le, upper),
    ];
    let plan = table.best_index(&constraints, &[]).unwrap();
    assert!(plan.is_impossible());
    assert!(collect(&table, &constraints).await.is_empty());
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_reopening_yields_same_rows() {
    let table = VirtualTable::from_adapter("people", Arc::new(people()));
    let full = collect(&table, &[]).await;
    assert_eq!(full.len(), 4);
    assert_eq!(collect(&table, &[]).await, full);

    let constraints = [Constraint::new("id", Operator::Gt, 1i64)];
    let first = collect(&table, &constraints).await;
    assert_eq!(first.len(), 3);
    assert_eq!(collect(&table, &constraints).await, first);
}
