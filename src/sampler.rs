use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use chrono::{DateTime, Utc};
use tracing::{debug, error, instrument, warn};

use crate::fetch_error::FetchError;
use crate::station::Station;
use crate::time_axis::TimeAxis;
use crate::wms::{extract_pixel_value, BoundingBox, FeatureQuery, ForecastSource, PixelGrid};

/// Default half-width of the query box around a station, in degrees
pub const DEFAULT_BBOX_HALF_WIDTH: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub value: f64,
}

/// Outcome of sampling one layer at one station
#[derive(Debug, Clone, PartialEq)]
pub enum SampledSeries {
    Available(Vec<Sample>),
    /// Every attempt failed; no partial series is kept
    Unavailable { attempts: usize, last_error: String },
}

/// How often, and how far apart, a whole sampling loop is attempted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: usize,
    pub delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            jitter: false,
        }
    }

    /// Single attempt, no sleeping
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    fn backoff(&self) -> ConstantBuilder {
        let builder = ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_attempts.saturating_sub(1));
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(5))
    }
}

/// Queries one pixel per timestep for a layer at a station
pub struct PointSampler<S: ?Sized> {
    source: Arc<S>,
    retry: RetryPolicy,
    grid: PixelGrid,
    half_width_deg: f64,
}

impl<S> PointSampler<S>
where
    S: ForecastSource + ?Sized,
{
    pub fn new(source: Arc<S>, retry: RetryPolicy) -> Self {
        Self {
            source,
            retry,
            grid: PixelGrid::default(),
            half_width_deg: DEFAULT_BBOX_HALF_WIDTH,
        }
    }

    pub fn with_grid(mut self, grid: PixelGrid) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_half_width(mut self, half_width_deg: f64) -> Self {
        self.half_width_deg = half_width_deg;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Sample every timestep of `axis`, redoing the whole loop on failure.
    ///
    /// A timestep whose body has no readable value is recorded as `0.0`.
    #[instrument(skip(self, station, axis), fields(station = %station.name, steps = axis.len()))]
    pub async fn sample(&self, layer_id: &str, station: &Station, axis: &TimeAxis) -> SampledSeries {
        let bbox = station.bbox(self.half_width_deg);
        let attempts = AtomicUsize::new(0);

        let result = (|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            self.sample_once(layer_id, bbox, axis)
        })
        .retry(self.retry.backoff())
        .sleep(tokio::time::sleep)
        .notify(|err: &FetchError, delay: Duration| {
            warn!(
                layer = %layer_id,
                station = %station.name,
                attempt = attempts.load(Ordering::SeqCst),
                error = %err,
                "Sampling attempt failed, retrying in {:?}",
                delay
            );
        })
        .await;

        let attempts = attempts.into_inner();
        match result {
            Ok(samples) => SampledSeries::Available(samples),
            Err(e) => {
                error!(
                    layer = %layer_id,
                    station = %station.name,
                    attempts,
                    error = %e,
                    "All sampling attempts failed"
                );
                SampledSeries::Unavailable {
                    attempts,
                    last_error: e.to_string(),
                }
            }
        }
    }

    async fn sample_once(
        &self,
        layer_id: &str,
        bbox: BoundingBox,
        axis: &TimeAxis,
    ) -> Result<Vec<Sample>, FetchError> {
        let mut samples = Vec::with_capacity(axis.len());
        let mut fallbacks = 0;

        for &time in axis.timestamps() {
            let query = FeatureQuery {
                layer_id,
                bbox,
                grid: self.grid,
                time,
            };
            let body = self.source.feature_info(&query).await?;
            let value = extract_pixel_value(&body).unwrap_or_else(|| {
                fallbacks += 1;
                0.0
            });
            samples.push(Sample { time, value });
        }

        if fallbacks > 0 {
            debug!(
                "{} of {} timesteps for {} had no readable value, recorded as 0.0",
                fallbacks,
                samples.len(),
                layer_id
            );
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(5));
        assert!(!policy.jitter);
    }

    #[test]
    fn test_none_policy_is_single_attempt() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay, Duration::ZERO);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::fixed(0, Duration::from_secs(1)).max_attempts, 1);
    }
}
