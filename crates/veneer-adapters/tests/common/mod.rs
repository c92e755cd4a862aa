//! Shared test helpers: a scripted HTTP transport and WeatherAPI fixtures.

#![allow(dead_code)]

use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use url::Url;
use veneer_adapters::{HttpResponse, Transport};
use veneer_core::Result;

type Handler = Box<dyn Fn(&Url) -> HttpResponse + Send + Sync>;

/// Transport answering from a closure and recording every requested URL.
pub struct FakeTransport {
    handler: Handler,
    calls: Mutex<Vec<Url>>,
    bearers: Mutex<Vec<Option<String>>>,
}

impl FakeTransport {
    pub fn new(handler: impl Fn(&Url) -> HttpResponse + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            bearers: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Url> {
        self.calls.lock().unwrap().clone()
    }

    /// Bearer token of each request, in order.
    pub fn bearers(&self) -> Vec<Option<String>> {
        self.bearers.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl fmt::Debug for FakeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeTransport")
            .field("calls", &self.call_count())
            .finish()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &Url, bearer: Option<&str>) -> Result<HttpResponse> {
        self.calls.lock().unwrap().push(url.clone());
        self.bearers.lock().unwrap().push(bearer.map(str::to_string));
        Ok((self.handler)(url))
    }
}

pub fn param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

pub fn ok_json(value: serde_json::Value) -> HttpResponse {
    HttpResponse {
        status: 200,
        body: value.to_string(),
    }
}

pub fn status(code: u16) -> HttpResponse {
    HttpResponse {
        status: code,
        body: String::new(),
    }
}

/// A history payload with one record per listed hour of `day`.
pub fn weather_day(day: NaiveDate, hours: &[u32]) -> serde_json::Value {
    let records: Vec<serde_json::Value> = hours
        .iter()
        .map(|h| {
            let at = Utc
                .from_utc_datetime(&day.and_hms_opt(*h, 0, 0).unwrap());
            serde_json::json!({
                "time_epoch": at.timestamp(),
                "time": at.format("%Y-%m-%d %H:%M").to_string(),
                "temp_c": 6.7,
                "temp_f": 44.1,
                "is_day": 1,
                "condition": {"text": "Overcast", "code": 1009},
                "wind_mph": 12.1,
                "wind_kph": 19.4,
                "wind_degree": 139,
                "wind_dir": "SE",
                "pressure_mb": 1023.0,
                "pressure_in": 30.7,
                "precip_mm": 0.13,
                "precip_in": 0.01,
                "humidity": 96,
                "cloud": 90,
                "feelslike_c": 3.3,
                "feelslike_f": 37.9,
                "windchill_c": 3.3,
                "windchill_f": 37.9,
                "heatindex_c": 6.7,
                "heatindex_f": 44.1,
                "dewpoint_c": 6.1,
                "dewpoint_f": 43.0,
                "will_it_rain": 0,
                "chance_of_rain": "0",
                "will_it_snow": 0,
                "chance_of_snow": "0",
                "vis_km": 2.0,
                "vis_miles": 1.0,
                "gust_mph": 21.5,
                "gust_kph": 34.6
            })
        })
        .collect();
    serde_json::json!({
        "location": {"name": "Iceland", "tz_id": "Atlantic/Reykjavik"},
        "forecast": {"forecastday": [{"date": day.format("%Y-%m-%d").to_string(), "hour": records}]}
    })
}
