//! Google Sheets adapter over the Visualization (gviz) query API.
//!
//! Sheets are addressed by their edit URL. Filters and ordering are pushed
//! into the gviz query language using the sheet's column letters.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Timelike};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;
use veneer_core::{
    Adapter, AdapterFactory, AdapterOptions, Bounds, Column, ColumnFilter, ColumnType, Columns,
    Filter, FilterKind, Nullability, Operator, Order, OrderSupport, Result, Row, RowStream,
    SourceError, Value, VeneerError,
};

use crate::auth::{self, TokenSource, SHEETS_SCOPES};
use crate::http::Transport;

pub const ADAPTER_NAME: &str = "gsheets";
const URI_PREFIX: &str = "https://docs.google.com/spreadsheets/";
const RESPONSE_PREFIX: &str = ")]}'";

#[derive(Debug, Clone, Deserialize)]
pub struct GvizError {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub detailed_message: String,
}

/// Join the detailed messages of a gviz error payload.
pub fn format_error_message(errors: &[GvizError]) -> String {
    errors
        .iter()
        .map(|e| e.detailed_message.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Deserialize)]
struct GvizResponse {
    status: String,
    #[serde(default)]
    errors: Vec<GvizError>,
    table: Option<GvizTable>,
}

#[derive(Debug, Deserialize)]
struct GvizTable {
    cols: Vec<GvizColumn>,
    #[serde(default)]
    rows: Vec<GvizRow>,
}

#[derive(Debug, Deserialize)]
struct GvizColumn {
    id: String,
    #[serde(default)]
    label: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct GvizRow {
    c: Vec<Option<GvizCell>>,
}

#[derive(Debug, Deserialize)]
struct GvizCell {
    v: Option<serde_json::Value>,
}

fn column_type(kind: &str) -> Result<ColumnType> {
    match kind {
        "string" => Ok(ColumnType::String),
        "number" => Ok(ColumnType::Float),
        "boolean" => Ok(ColumnType::Boolean),
        "date" => Ok(ColumnType::Date),
        "datetime" => Ok(ColumnType::DateTime),
        "timeofday" => Ok(ColumnType::Time),
        other => Err(VeneerError::unsupported(format!("unknown gviz type: {}", other))),
    }
}

/// Build the gviz endpoint for a sheet URL.
///
/// Parameters are read from both the query string and the fragment of
/// `uri`; explicit arguments override them. `sheet` takes precedence over
/// `gid`.
pub fn get_url(uri: &str, headers: Option<u32>, gid: Option<u32>, sheet: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(uri).map_err(|e| VeneerError::InvalidArgument(format!("{}: {}", uri, e)))?;

    let segments: Vec<String> = url
        .path_segments()
        .map(|s| s.map(str::to_string).collect())
        .unwrap_or_default();
    let id = segments
        .iter()
        .position(|s| s == "d")
        .and_then(|i| segments.get(i + 1))
        .ok_or_else(|| VeneerError::InvalidArgument(format!("no spreadsheet id in {}", uri)))?
        .clone();

    let mut params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if let Some(fragment) = url.fragment() {
        params.extend(url::form_urlencoded::parse(fragment.as_bytes()).into_owned());
    }
    let lookup = |key: &str| {
        params
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };
    let headers = headers.map(|h| h.to_string()).or_else(|| lookup("headers"));
    let sheet = sheet.map(str::to_string).or_else(|| lookup("sheet"));
    let gid = gid.map(|g| g.to_string()).or_else(|| lookup("gid"));

    let mut out: Vec<(&str, String)> = Vec::new();
    if let Some(headers) = headers {
        out.push(("headers", headers));
    }
    match (sheet, gid) {
        (Some(sheet), _) => out.push(("sheet", sheet)),
        (None, Some(gid)) => out.push(("gid", gid)),
        (None, None) => {}
    }

    url.set_path(&format!("/spreadsheets/d/{}/gviz/tq", id));
    url.set_fragment(None);
    url.set_query(None);
    if !out.is_empty() {
        url.query_pairs_mut().extend_pairs(out);
    }
    Ok(url)
}

/// Quote a value the way gviz expects inside a query.
pub fn quote(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => match (s.contains('\''), s.contains('"')) {
            (true, true) => Err(VeneerError::unsupported(format!("Can't quote value: {}", s))),
            (true, false) => Ok(format!("\"{}\"", s)),
            _ => Ok(format!("'{}'", s)),
        },
        Value::Integer(v) => Ok(v.to_string()),
        Value::Float(v) if v.is_finite() && v.fract() == 0.0 => Ok(format!("{:.1}", v)),
        Value::Float(v) if v.is_finite() => Ok(v.to_string()),
        Value::Boolean(v) => Ok(v.to_string()),
        Value::Date(v) => Ok(format!("'{}'", v.format("%Y-%m-%d"))),
        Value::Time(v) => Ok(format!("'{}'", v.format("%H:%M:%S%.3f"))),
        Value::DateTime(v) => Ok(format!("'{}'", v.format("%Y-%m-%dT%H:%M:%S%.3f"))),
        other => Err(VeneerError::unsupported(format!("Can't quote value: {}", other))),
    }
}

/// A literal for the gviz `WHERE` clause, with the type keyword temporal
/// values need.
fn literal(value: &Value) -> Result<String> {
    match value {
        Value::Date(_) => Ok(format!("date {}", quote(value)?)),
        Value::Time(_) => Ok(format!("timeofday {}", quote(value)?)),
        Value::DateTime(v) => Ok(format!("datetime '{}'", v.format("%Y-%m-%d %H:%M:%S%.3f"))),
        other => quote(other),
    }
}

const NANOS_PER_MILLI: u32 = 1_000_000;

/// Nanoseconds below the millisecond. gviz literals and cells stop at
/// milliseconds.
fn sub_milli(value: &Value) -> u32 {
    match value {
        Value::DateTime(v) => v.nanosecond() % NANOS_PER_MILLI,
        Value::Time(v) => v.nanosecond() % NANOS_PER_MILLI,
        _ => 0,
    }
}

/// Round a temporal value onto the millisecond grid. `None` when rounding
/// up leaves the value's domain.
fn snap(value: &Value, up: bool) -> Option<Value> {
    let rest = sub_milli(value);
    if rest == 0 {
        return Some(value.clone());
    }
    let down = Duration::nanoseconds(i64::from(rest));
    let step = Duration::milliseconds(1);
    match value {
        Value::DateTime(v) => {
            let floor = v.checked_sub_signed(down)?;
            if up {
                floor.checked_add_signed(step).map(Value::DateTime)
            } else {
                Some(Value::DateTime(floor))
            }
        }
        Value::Time(v) => {
            let floor = *v - down;
            if up {
                let (ceil, wrapped) = floor.overflowing_add_signed(step);
                (wrapped == 0).then_some(Value::Time(ceil))
            } else {
                Some(Value::Time(floor))
            }
        }
        other => Some(other.clone()),
    }
}

/// Predicate no cell satisfies.
fn nothing(letter: &str) -> Vec<String> {
    vec![format!("{} is null", letter), format!("{} is not null", letter)]
}

/// gviz conditions for one column. Cells hold at most millisecond
/// precision, so finer bounds are moved onto the millisecond grid without
/// changing which cells match.
fn predicates(letter: &str, filter: &ColumnFilter) -> Result<Vec<String>> {
    let mut out = Vec::new();
    match &filter.filter {
        Some(Filter::Equal(v)) if sub_milli(v) != 0 => return Ok(nothing(letter)),
        Some(Filter::Equal(v)) => out.push(format!("{} = {}", letter, literal(v)?)),
        Some(Filter::Range(range)) => match range.as_point() {
            Some(v) if sub_milli(v) != 0 => return Ok(nothing(letter)),
            Some(v) => out.push(format!("{} = {}", letter, literal(v)?)),
            None => {
                if let Some(lo) = &range.lower {
                    if sub_milli(&lo.value) == 0 {
                        let op = if lo.inclusive { Operator::Ge } else { Operator::Gt };
                        out.push(format!("{} {} {}", letter, op, literal(&lo.value)?));
                    } else {
                        match snap(&lo.value, true) {
                            Some(v) => out.push(format!("{} >= {}", letter, literal(&v)?)),
                            None => return Ok(nothing(letter)),
                        }
                    }
                }
                if let Some(hi) = &range.upper {
                    if sub_milli(&hi.value) == 0 {
                        let op = if hi.inclusive { Operator::Le } else { Operator::Lt };
                        out.push(format!("{} {} {}", letter, op, literal(&hi.value)?));
                    } else if let Some(v) = snap(&hi.value, false) {
                        out.push(format!("{} <= {}", letter, literal(&v)?));
                    }
                }
            }
        },
        None => {}
    }
    for v in filter.excluded.iter().filter(|v| sub_milli(v) == 0) {
        out.push(format!("{} != {}", letter, literal(v)?));
    }
    match filter.nullability {
        Some(Nullability::Null) => out.push(format!("{} is null", letter)),
        Some(Nullability::NotNull) => out.push(format!("{} is not null", letter)),
        None => {}
    }
    Ok(out)
}

/// One session against a single sheet.
#[derive(Debug)]
pub struct GSheets {
    url: Url,
    credentials: Option<Arc<dyn TokenSource>>,
    transport: Arc<dyn Transport>,
    columns: Columns,
    letters: Vec<String>,
}

impl GSheets {
    /// Resolve the sheet's columns from a `SELECT * LIMIT 0` query.
    pub async fn connect(
        uri: &str,
        headers: Option<u32>,
        gid: Option<u32>,
        sheet: Option<&str>,
        credentials: Option<Arc<dyn TokenSource>>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let url = get_url(uri, headers, gid, sheet)?;
        let bearer = bearer(credentials.as_deref()).await?;
        let table = run_query(transport.as_ref(), &url, bearer.as_deref(), "SELECT * LIMIT 0").await?;

        let mut columns = Vec::with_capacity(table.cols.len());
        let mut letters = Vec::with_capacity(table.cols.len());
        for col in &table.cols {
            let name = if col.label.is_empty() { &col.id } else { &col.label };
            columns.push(
                Column::new(name.clone(), column_type(&col.kind)?)
                    .pushdown(&Operator::ALL)
                    .exact()
                    .kind(FilterKind::Range)
                    .order(OrderSupport::Both),
            );
            letters.push(col.id.clone());
        }
        Ok(Self {
            url,
            credentials,
            transport,
            columns: Columns::new(columns)?,
            letters,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn letter(&self, column: &str) -> Result<&str> {
        self.columns
            .position(column)
            .and_then(|i| self.letters.get(i))
            .map(String::as_str)
            .ok_or_else(|| VeneerError::UnknownColumn(column.to_string()))
    }

    /// The gviz query for the given constraints and ordering.
    pub fn build_query(&self, bounds: &Bounds, order: &[(String, Order)]) -> Result<String> {
        let mut conditions = Vec::new();
        for (column, filter) in bounds {
            conditions.extend(predicates(self.letter(column)?, filter)?);
        }
        let mut sql = "SELECT *".to_string();
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        if !order.is_empty() {
            let keys = order
                .iter()
                .map(|(column, direction)| {
                    self.letter(column).map(|l| match direction {
                        Order::Ascending => l.to_string(),
                        Order::Descending => format!("{} DESC", l),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }
        Ok(sql)
    }
}

async fn bearer(credentials: Option<&dyn TokenSource>) -> Result<Option<String>> {
    match credentials {
        Some(source) => source.bearer().await.map(Some),
        None => Ok(None),
    }
}

async fn run_query(
    transport: &dyn Transport,
    base: &Url,
    access_token: Option<&str>,
    sql: &str,
) -> Result<GvizTable> {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair("tq", sql);
    debug!("gviz query: {}", sql);

    let response = transport.get(&url, access_token).await?;
    if !response.is_success() {
        return Err(SourceError::new(
            ADAPTER_NAME,
            Some(response.status),
            format!("gviz request failed: {}", response.body.trim()),
        )
        .into());
    }
    let body = response.body.trim_start();
    let body = body.strip_prefix(RESPONSE_PREFIX).unwrap_or(body);
    let payload: GvizResponse = serde_json::from_str(body).map_err(|e| {
        SourceError::new(ADAPTER_NAME, Some(response.status), format!("invalid gviz response: {}", e))
    })?;
    if payload.status == "error" {
        return Err(SourceError::new(
            ADAPTER_NAME,
            Some(response.status),
            format_error_message(&payload.errors),
        )
        .into());
    }
    payload.table.ok_or_else(|| {
        SourceError::new(ADAPTER_NAME, Some(response.status), "gviz response has no table").into()
    })
}

/// Cell values as returned by gviz. The bridge parses `Date(...)` and
/// `[h, m, s, ms]` forms into the declared types.
fn convert_rows(width: usize, table: GvizTable) -> Vec<Row> {
    table
        .rows
        .into_iter()
        .map(|row| {
            let mut values: Row = row
                .c
                .into_iter()
                .map(|cell| {
                    cell.and_then(|c| c.v)
                        .map(|v| Value::from_json(&v))
                        .unwrap_or(Value::Null)
                })
                .collect();
            values.resize(width, Value::Null);
            values
        })
        .collect()
}

#[async_trait]
impl Adapter for GSheets {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    fn columns(&self) -> &Columns {
        &self.columns
    }

    async fn rows(&self, bounds: &Bounds, order: &[(String, Order)]) -> Result<RowStream> {
        let sql = self.build_query(bounds, order)?;
        let transport = self.transport.clone();
        let url = self.url.clone();
        let credentials = self.credentials.clone();
        let width = self.columns.len();

        let stream = futures::stream::once(async move {
            let token = bearer(credentials.as_deref()).await?;
            let table = run_query(transport.as_ref(), &url, token.as_deref(), &sql).await?;
            Ok::<_, VeneerError>(convert_rows(width, table))
        })
        .map_ok(|rows| futures::stream::iter(rows.into_iter().map(Ok)))
        .try_flatten();
        Ok(stream.boxed())
    }
}

/// Creates [`GSheets`] sessions for `https://docs.google.com/spreadsheets/...` URIs.
///
/// Options: `headers`, `gid`, `sheet`, plus credentials: either
/// `service_account_info` (key JSON) with an optional `subject` to
/// impersonate, or a ready `access_token`. Without them sheets are read
/// anonymously.
#[derive(Debug)]
pub struct GSheetsFactory {
    transport: Arc<dyn Transport>,
}

impl GSheetsFactory {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl AdapterFactory for GSheetsFactory {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    fn supports(&self, uri: &str) -> bool {
        uri.starts_with(URI_PREFIX)
    }

    async fn connect(&self, uri: &str, options: &AdapterOptions) -> Result<Arc<dyn Adapter>> {
        let adapter = GSheets::connect(
            uri,
            options.get_parsed::<u32>("headers")?,
            options.get_parsed::<u32>("gid")?,
            options.get("sheet"),
            auth::from_options(options, SHEETS_SCOPES)?,
            self.transport.clone(),
        )
        .await?;
        info!(
            "Google Sheets session for {} with {} column(s), authenticated={}",
            adapter.url,
            adapter.columns.len(),
            adapter.credentials.is_some()
        );
        Ok(Arc::new(adapter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
    use veneer_core::{reduce, Constraint};

    const SHEET: &str = "https://docs.google.com/spreadsheets/d/1_rN3lm0R_bU3NemO0s9pbFkY5LQPcuy1pscv8ZXPtg8";

    #[test]
    fn test_get_url() {
        assert_eq!(
            get_url(&format!("{}/edit#gid=0", SHEET), None, None, None)
                .unwrap()
                .as_str(),
            format!("{}/gviz/tq?gid=0", SHEET)
        );
        assert_eq!(
            get_url(&format!("{}/edit#gid=0", SHEET), Some(2), Some(3), Some("some-sheet"))
                .unwrap()
                .as_str(),
            format!("{}/gviz/tq?headers=2&sheet=some-sheet", SHEET)
        );
        assert_eq!(
            get_url(&format!("{}/edit?headers=2&gid=1", SHEET), None, None, None)
                .unwrap()
                .as_str(),
            format!("{}/gviz/tq?headers=2&gid=1", SHEET)
        );
        assert_eq!(
            get_url(&format!("{}/edit?headers=2&sheet=some-sheet", SHEET), None, None, None)
                .unwrap()
                .as_str(),
            format!("{}/gviz/tq?headers=2&sheet=some-sheet", SHEET)
        );
        assert_eq!(
            get_url(&format!("{}/edit", SHEET), None, None, None)
                .unwrap()
                .as_str(),
            format!("{}/gviz/tq", SHEET)
        );
        assert!(get_url("https://docs.google.com/spreadsheets/", None, None, None).is_err());
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote(&Value::from("value")).unwrap(), "'value'");
        assert_eq!(quote(&Value::from("it's")).unwrap(), "\"it's\"");
        assert!(quote(&Value::from("it's \"x\"")).is_err());
        assert_eq!(quote(&Value::Integer(1)).unwrap(), "1");
        assert_eq!(quote(&Value::Float(5.0)).unwrap(), "5.0");
        assert_eq!(quote(&Value::Float(2.5)).unwrap(), "2.5");
        assert_eq!(quote(&Value::Boolean(true)).unwrap(), "true");
        assert_eq!(
            quote(&Value::DateTime(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())).unwrap(),
            "'2020-01-01T00:00:00.000'"
        );
        assert_eq!(
            quote(&Value::Time(NaiveTime::from_hms_opt(0, 0, 0).unwrap())).unwrap(),
            "'00:00:00.000'"
        );
        assert_eq!(
            quote(&Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())).unwrap(),
            "'2020-01-01'"
        );
        let err = quote(&Value::Null).unwrap_err();
        assert_eq!(err, VeneerError::unsupported("Can't quote value: NULL"));
    }

    #[test]
    fn test_format_error_message() {
        let payload = serde_json::json!({
            "version": "0.6",
            "reqId": "0",
            "status": "error",
            "errors": [
                {
                    "reason": "invalid_query",
                    "message": "INVALID_QUERY",
                    "detailed_message": "Invalid query: NO_COLUMN: C"
                }
            ]
        });
        let response: GvizResponse = serde_json::from_value(payload).unwrap();
        assert_eq!(
            format_error_message(&response.errors),
            "Invalid query: NO_COLUMN: C"
        );
    }

    #[test]
    fn test_literal() {
        let d = Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(literal(&d).unwrap(), "date '2020-01-01'");
        let t = Value::Time(NaiveTime::from_hms_opt(17, 0, 0).unwrap());
        assert_eq!(literal(&t).unwrap(), "timeofday '17:00:00.000'");
        let dt = Value::DateTime(Utc.with_ymd_and_hms(2020, 1, 1, 8, 30, 0).unwrap());
        assert_eq!(literal(&dt).unwrap(), "datetime '2020-01-01 08:30:00.000'");
        let t = Value::Time(NaiveTime::from_hms_milli_opt(17, 0, 0, 250).unwrap());
        assert_eq!(literal(&t).unwrap(), "timeofday '17:00:00.250'");
    }

    fn sheet() -> GSheets {
        GSheets {
            url: get_url("https://docs.google.com/spreadsheets/d/1/edit#gid=0", None, None, None).unwrap(),
            credentials: None,
            transport: Arc::new(crate::http::HttpTransport::uncached()),
            columns: Columns::new(vec![
                Column::new("country", ColumnType::String)
                    .pushdown(&Operator::ALL)
                    .exact(),
                Column::new("cnt", ColumnType::Float)
                    .pushdown(&Operator::ALL)
                    .exact(),
                Column::new("ts", ColumnType::DateTime)
                    .pushdown(&Operator::ALL)
                    .exact(),
                Column::new("at", ColumnType::Time)
                    .pushdown(&Operator::ALL)
                    .exact(),
            ])
            .unwrap(),
            letters: ["A", "B", "C", "D"].iter().map(|l| l.to_string()).collect(),
        }
    }

    fn bounds(constraints: &[Constraint]) -> Bounds {
        reduce(constraints.iter().map(|c| (c, FilterKind::Range))).unwrap()
    }

    #[test]
    fn test_build_query() {
        let s = sheet();
        assert_eq!(s.build_query(&Bounds::new(), &[]).unwrap(), "SELECT *");
        assert_eq!(
            s.build_query(&bounds(&[Constraint::new("cnt", Operator::Lt, 5.0)]), &[])
                .unwrap(),
            "SELECT * WHERE B < 5.0"
        );
        assert_eq!(
            s.build_query(&bounds(&[Constraint::new("cnt", Operator::Gt, 5.0)]), &[])
                .unwrap(),
            "SELECT * WHERE B > 5.0"
        );
        assert_eq!(
            s.build_query(
                &bounds(&[
                    Constraint::new("country", Operator::Eq, "BR"),
                    Constraint::new("cnt", Operator::Ge, 1.0),
                    Constraint::new("cnt", Operator::Ne, 3.0),
                    Constraint::is_not_null("cnt"),
                ]),
                &[("cnt".to_string(), Order::Descending)],
            )
            .unwrap(),
            "SELECT * WHERE B >= 1.0 AND B != 3.0 AND B is not null AND A = 'BR' ORDER BY B DESC"
        );
        assert!(matches!(
            s.build_query(&Bounds::new(), &[("missing".to_string(), Order::Ascending)]),
            Err(VeneerError::UnknownColumn(_))
        ));
    }

    fn ts(millis: i64, nanos: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
            + Duration::milliseconds(millis)
            + Duration::nanoseconds(nanos)
    }

    #[test]
    fn test_sub_second_bounds() {
        let s = sheet();
        assert_eq!(
            s.build_query(&bounds(&[Constraint::new("ts", Operator::Gt, ts(500, 0))]), &[])
                .unwrap(),
            "SELECT * WHERE C > datetime '2020-01-01 00:00:00.500'"
        );
        assert_eq!(
            s.build_query(
                &bounds(&[
                    Constraint::new("ts", Operator::Gt, ts(500, 400)),
                    Constraint::new("ts", Operator::Lt, ts(900, 1)),
                ]),
                &[]
            )
            .unwrap(),
            "SELECT * WHERE C >= datetime '2020-01-01 00:00:00.501' \
             AND C <= datetime '2020-01-01 00:00:00.900'"
        );
        assert_eq!(
            s.build_query(&bounds(&[Constraint::new("ts", Operator::Eq, ts(500, 1))]), &[])
                .unwrap(),
            "SELECT * WHERE C is null AND C is not null"
        );
        assert_eq!(
            s.build_query(&bounds(&[Constraint::new("ts", Operator::Ne, ts(500, 1))]), &[])
                .unwrap(),
            "SELECT *"
        );

        let late = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_000_001).unwrap();
        assert_eq!(
            s.build_query(&bounds(&[Constraint::new("at", Operator::Ge, late)]), &[])
                .unwrap(),
            "SELECT * WHERE D is null AND D is not null"
        );
        assert_eq!(
            s.build_query(&bounds(&[Constraint::new("at", Operator::Lt, late)]), &[])
                .unwrap(),
            "SELECT * WHERE D <= timeofday '23:59:59.999'"
        );
    }

    #[test]
    fn test_convert_rows() {
        let table: GvizTable = serde_json::from_value(serde_json::json!({
            "cols": [
                {"id": "A", "label": "datetime", "type": "datetime"},
                {"id": "B", "label": "number", "type": "number"},
                {"id": "C", "label": "timeofday", "type": "timeofday"}
            ],
            "rows": [
                {"c": [{"v": "Date(2018,8,1,0,0,0)", "f": "9/1/2018 0:00:00"}, {"v": 1.0, "f": "1"}, {"v": [17, 0, 0, 0]}]},
                {"c": [{"v": "Date(2018,8,2,0,0,0)"}, null, null]},
                {"c": [{"v": "Date(2018,8,3,0,0,0)"}]}
            ]
        }))
        .unwrap();
        let rows = convert_rows(3, table);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], Value::from("Date(2018,8,1,0,0,0)"));
        assert_eq!(rows[0][1], Value::Float(1.0));
        assert_eq!(rows[0][2], Value::from("[17,0,0,0]"));
        assert_eq!(rows[1][1], Value::Null);
        assert_eq!(rows[2], vec![Value::from("Date(2018,8,3,0,0,0)"), Value::Null, Value::Null]);
    }

    #[test]
    fn test_column_types() {
        assert_eq!(column_type("number").unwrap(), ColumnType::Float);
        assert_eq!(column_type("timeofday").unwrap(), ColumnType::Time);
        assert!(column_type("blob").is_err());
    }

    #[test]
    fn test_supports() {
        let factory = GSheetsFactory::new(Arc::new(crate::http::HttpTransport::uncached()));
        assert!(factory.supports("https://docs.google.com/spreadsheets/d/1/edit#gid=0"));
        assert!(!factory.supports("https://api.weatherapi.com/v1/history.json?q=London"));
    }
}
