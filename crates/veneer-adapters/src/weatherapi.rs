//! WeatherAPI history adapter.
//!
//! Exposes hourly history for one location. Each day in the requested time
//! range costs one request to `/v1/history.json`, so only the `time` and
//! `time_epoch` columns accept pushdown and an open-ended query is limited
//! to `window` days.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;
use veneer_core::coerce::epoch_to_datetime;
use veneer_core::{
    combine, Adapter, AdapterFactory, AdapterOptions, Bounds, Column, ColumnType, Columns,
    CostModel, EpochSeconds, Equivalence, Operator, Order, OrderSupport, Result, Row, RowStream,
    SortKey, SourceError, Value, VeneerError,
};

use crate::http::Transport;

pub const ADAPTER_NAME: &str = "weatherapi";
const BASE_URL: &str = "https://api.weatherapi.com/v1/history.json";
const DEFAULT_WINDOW: u64 = 7;

const TIME_OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Gt,
    Operator::Ge,
    Operator::Lt,
    Operator::Le,
];

fn weather_columns() -> Result<Columns> {
    use ColumnType::*;
    let plain = [
        ("chance_of_rain", String),
        ("chance_of_snow", String),
        ("cloud", Integer),
        ("dewpoint_c", Float),
        ("dewpoint_f", Float),
        ("feelslike_c", Float),
        ("feelslike_f", Float),
        ("gust_kph", Float),
        ("gust_mph", Float),
        ("heatindex_c", Float),
        ("heatindex_f", Float),
        ("humidity", Integer),
        ("is_day", Boolean),
        ("precip_in", Float),
        ("precip_mm", Float),
        ("pressure_in", Float),
        ("pressure_mb", Float),
        ("temp_c", Float),
        ("temp_f", Float),
    ];
    let trailing = [
        ("vis_km", Float),
        ("vis_miles", Float),
        ("will_it_rain", Boolean),
        ("will_it_snow", Boolean),
        ("wind_degree", Integer),
        ("wind_dir", String),
        ("wind_kph", Float),
        ("wind_mph", Float),
        ("windchill_c", Float),
        ("windchill_f", Float),
    ];

    let mut columns: Vec<Column> = plain
        .into_iter()
        .map(|(name, ty)| Column::new(name, ty))
        .collect();
    for (name, ty) in [("time", DateTime), ("time_epoch", Float)] {
        columns.push(
            Column::new(name, ty)
                .pushdown(TIME_OPERATORS)
                .order(OrderSupport::Ascending),
        );
    }
    columns.extend(trailing.into_iter().map(|(name, ty)| Column::new(name, ty)));
    Columns::new(columns)
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    forecast: Forecast,
}

#[derive(Debug, Deserialize)]
struct Forecast {
    forecastday: Vec<ForecastDay>,
}

#[derive(Debug, Deserialize)]
struct ForecastDay {
    hour: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// One session against the WeatherAPI history endpoint.
#[derive(Debug)]
pub struct WeatherApi {
    location: String,
    api_key: String,
    window: u64,
    transport: Arc<dyn Transport>,
    columns: Columns,
    today: Option<NaiveDate>,
}

impl WeatherApi {
    pub fn new(
        location: impl Into<String>,
        api_key: impl Into<String>,
        window: u64,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        if window == 0 {
            return Err(VeneerError::InvalidArgument(
                "window must be at least one day".to_string(),
            ));
        }
        Ok(Self {
            location: location.into(),
            api_key: api_key.into(),
            window,
            transport,
            columns: weather_columns()?,
            today: None,
        })
    }

    /// Pin the current date, for reproducible windows.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Days to request for the given bounds, inclusive.
    pub fn days(&self, bounds: &Bounds) -> Result<Vec<NaiveDate>> {
        let equivalence = EpochSeconds::new("time", "time_epoch");
        let range = combine(&equivalence, bounds.get("time"), bounds.get("time_epoch"))?;
        let date_of = |bound: &Option<veneer_core::Bound>| {
            bound
                .as_ref()
                .and_then(|b| b.value.as_datetime())
                .map(|dt| dt.date_naive())
        };
        let span = Days::new(self.window - 1);
        let today = self.today();

        let (first, last) = match (date_of(&range.lower), date_of(&range.upper)) {
            (Some(lo), Some(hi)) => (lo, hi),
            (Some(lo), None) => (lo, lo.checked_add_days(span).unwrap_or(lo).min(today)),
            (None, Some(hi)) => (hi.checked_sub_days(span).unwrap_or(hi), hi),
            (None, None) => (today.checked_sub_days(span).unwrap_or(today), today),
        };
        Ok(first.iter_days().take_while(|d| *d <= last).collect())
    }

    fn url_for(&self, day: NaiveDate) -> Result<Url> {
        let dt = day.format("%Y-%m-%d").to_string();
        Url::parse_with_params(
            BASE_URL,
            &[
                ("key", self.api_key.as_str()),
                ("q", self.location.as_str()),
                ("dt", dt.as_str()),
            ],
        )
        .map_err(|e| VeneerError::InvalidArgument(e.to_string()))
    }
}

/// Convert one `hour` record into a row aligned with `columns`. `time` is
/// derived from `time_epoch` so the row is in UTC.
fn hour_to_row(columns: &Columns, hour: &serde_json::Map<String, serde_json::Value>) -> Result<Row> {
    columns
        .iter()
        .map(|column| match column.name.as_str() {
            "time" => match hour.get("time_epoch").and_then(|v| v.as_f64()) {
                Some(epoch) => epoch_to_datetime(epoch).map(Value::DateTime),
                None => Ok(Value::Null),
            },
            name => Ok(hour.get(name).map(Value::from_json).unwrap_or(Value::Null)),
        })
        .collect()
}

async fn fetch_day(
    transport: Arc<dyn Transport>,
    columns: Arc<Columns>,
    url: Url,
) -> Result<Vec<Row>> {
    let response = transport.get(&url, None).await?;
    if !response.is_success() {
        warn!("WeatherAPI returned {} for {}", response.status, url.path());
        let day = url
            .query_pairs()
            .find(|(k, _)| k == "dt")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        return Err(SourceError::new(
            ADAPTER_NAME,
            Some(response.status),
            format!("history request for {} failed", day),
        )
        .into());
    }
    let payload: HistoryResponse = serde_json::from_str(&response.body).map_err(|e| {
        SourceError::new(ADAPTER_NAME, Some(response.status), format!("invalid response: {}", e))
    })?;
    payload
        .forecast
        .forecastday
        .iter()
        .flat_map(|day| day.hour.iter())
        .map(|hour| hour_to_row(&columns, hour))
        .collect()
}

#[async_trait]
impl Adapter for WeatherApi {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    fn columns(&self) -> &Columns {
        &self.columns
    }

    fn equivalences(&self) -> Vec<Arc<dyn Equivalence>> {
        vec![Arc::new(EpochSeconds::new("time", "time_epoch"))]
    }

    fn page_size(&self) -> Option<u64> {
        Some(self.window)
    }

    /// Requests dominate; ordering is always ascending by time and free.
    fn cost(&self, filtered: &[(String, Operator)], _order: &[SortKey]) -> u64 {
        CostModel::with_window(self.window).estimate(filtered, &[])
    }

    async fn rows(&self, bounds: &Bounds, _order: &[(String, Order)]) -> Result<RowStream> {
        let days = self.days(bounds)?;
        debug!(
            "WeatherAPI scan of '{}' over {} day(s)",
            self.location,
            days.len()
        );
        let urls = days
            .into_iter()
            .map(|day| self.url_for(day))
            .collect::<Result<Vec<_>>>()?;

        let transport = self.transport.clone();
        let columns = Arc::new(self.columns.clone());
        let stream = futures::stream::iter(urls)
            .then(move |url| fetch_day(transport.clone(), columns.clone(), url))
            .map_ok(|rows| futures::stream::iter(rows.into_iter().map(Ok)))
            .try_flatten();
        Ok(Box::pin(stream))
    }
}

/// Creates [`WeatherApi`] sessions for `https://api.weatherapi.com/v1/history.json?q=...` URIs.
#[derive(Debug)]
pub struct WeatherApiFactory {
    transport: Arc<dyn Transport>,
    defaults: AdapterOptions,
}

impl WeatherApiFactory {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            defaults: AdapterOptions::new(),
        }
    }

    /// Options used when a connection does not set them, e.g. `api_key`.
    pub fn with_defaults(mut self, defaults: AdapterOptions) -> Self {
        self.defaults = defaults;
        self
    }
}

#[async_trait]
impl AdapterFactory for WeatherApiFactory {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    fn supports(&self, uri: &str) -> bool {
        Url::parse(uri)
            .map(|url| {
                url.host_str() == Some("api.weatherapi.com") && url.path() == "/v1/history.json"
            })
            .unwrap_or(false)
    }

    async fn connect(&self, uri: &str, options: &AdapterOptions) -> Result<Arc<dyn Adapter>> {
        let options = options.merged(&self.defaults);
        let (location, key) = match Url::parse(uri) {
            Ok(url) => {
                let param = |name: &str| {
                    url.query_pairs()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| v.to_string())
                };
                (param("q"), param("key"))
            }
            Err(_) => (None, None),
        };
        let location = location
            .or_else(|| options.get("location").map(str::to_string))
            .ok_or_else(|| VeneerError::InvalidArgument("missing location (q=)".to_string()))?;
        let api_key = key
            .or_else(|| options.get("api_key").map(str::to_string))
            .ok_or_else(|| VeneerError::InvalidArgument("missing WeatherAPI key".to_string()))?;
        let window = options.get_parsed::<u64>("window")?.unwrap_or(DEFAULT_WINDOW);

        let adapter = WeatherApi::new(location, api_key, window, self.transport.clone())?;
        info!(
            "WeatherAPI session for '{}' with a {}-day window",
            adapter.location, adapter.window
        );
        Ok(Arc::new(adapter))
    }
}
