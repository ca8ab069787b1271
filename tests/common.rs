// Shared fixtures for the integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use geomet_etl::fetch_error::FetchError;
use geomet_etl::station::Station;
use geomet_etl::wms::{FeatureQuery, ForecastSource};
use reqwest::StatusCode;

type ValueFn = Box<dyn Fn(&str, DateTime<Utc>) -> Option<f64> + Send + Sync>;

/// In-memory stand-in for GeoMet
pub struct FakeSource {
    default_descriptor: Option<String>,
    descriptors: HashMap<String, String>,
    missing: HashSet<String>,
    failing: HashSet<String>,
    failures_left: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
    values: ValueFn,
    feature_calls: AtomicUsize,
    capability_calls: AtomicUsize,
}

impl FakeSource {
    /// Every layer answers with `descriptor` and the value 1.0
    pub fn new(descriptor: &str) -> Self {
        Self {
            default_descriptor: Some(descriptor.to_string()),
            descriptors: HashMap::new(),
            missing: HashSet::new(),
            failing: HashSet::new(),
            failures_left: Mutex::new(HashMap::new()),
            delay: None,
            values: Box::new(|_, _| Some(1.0)),
            feature_calls: AtomicUsize::new(0),
            capability_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_descriptor(mut self, layer_id: &str, descriptor: &str) -> Self {
        self.descriptors
            .insert(layer_id.to_string(), descriptor.to_string());
        self
    }

    /// Layer declares no time dimension
    pub fn without_time_dimension(mut self, layer_id: &str) -> Self {
        self.missing.insert(layer_id.to_string());
        self
    }

    /// Every feature query for the layer returns 503
    pub fn failing(mut self, layer_id: &str) -> Self {
        self.failing.insert(layer_id.to_string());
        self
    }

    /// The first `count` feature queries for the layer return 503
    pub fn failing_first(self, layer_id: &str, count: usize) -> Self {
        self.failures_left
            .lock()
            .unwrap()
            .insert(layer_id.to_string(), count);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_values<F>(mut self, values: F) -> Self
    where
        F: Fn(&str, DateTime<Utc>) -> Option<f64> + Send + Sync + 'static,
    {
        self.values = Box::new(values);
        self
    }

    pub fn feature_calls(&self) -> usize {
        self.feature_calls.load(Ordering::SeqCst)
    }

    pub fn capability_calls(&self) -> usize {
        self.capability_calls.load(Ordering::SeqCst)
    }

    fn unavailable(request: &'static str) -> FetchError {
        FetchError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            request,
        }
    }
}

#[async_trait]
impl ForecastSource for FakeSource {
    async fn time_dimension(&self, layer_id: &str) -> Result<String, FetchError> {
        self.capability_calls.fetch_add(1, Ordering::SeqCst);
        if self.missing.contains(layer_id) {
            return Err(FetchError::MissingTimeDimension(layer_id.to_string()));
        }
        self.descriptors
            .get(layer_id)
            .or(self.default_descriptor.as_ref())
            .cloned()
            .ok_or_else(|| FetchError::MissingTimeDimension(layer_id.to_string()))
    }

    async fn feature_info(&self, query: &FeatureQuery<'_>) -> Result<String, FetchError> {
        self.feature_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(query.layer_id) {
            return Err(Self::unavailable("GetFeatureInfo"));
        }
        {
            let mut left = self.failures_left.lock().unwrap();
            if let Some(count) = left.get_mut(query.layer_id) {
                if *count > 0 {
                    *count -= 1;
                    return Err(Self::unavailable("GetFeatureInfo"));
                }
            }
        }

        Ok(match (self.values)(query.layer_id, query.time) {
            Some(value) => format!(
                "Layer '{}'\n  Feature 0:\n    x = '{}'\n    value_0 = '{}'\n",
                query.layer_id,
                query.bbox.min_lon,
                value
            ),
            None => "Search returned no results.".to_string(),
        })
    }
}

pub fn whitehorse() -> Station {
    Station {
        name: "Whitehorse".to_string(),
        lon: -135.05,
        lat: 60.72,
        wind_in: "N".to_string(),
        wind_out: "S".to_string(),
    }
}

pub fn dawson() -> Station {
    Station {
        name: "Dawson".to_string(),
        lon: -139.43,
        lat: 64.06,
        wind_in: "NE".to_string(),
        wind_out: "SW".to_string(),
    }
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
}
