use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::{debug, instrument};

use crate::fetch_error::FetchError;
use crate::wms::ForecastSource;

const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, thiserror::Error)]
pub enum TimeAxisError {
    #[error("Expected START/END/STEP, got '{0}'")]
    MalformedDescriptor(String),
    #[error("Invalid instant '{0}': {1}")]
    InvalidInstant(String, String),
    #[error("Step '{0}' does not carry a positive hour count")]
    InvalidStep(String),
}

/// Why a layer's time axis could not be resolved
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("time dimension query failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("time dimension unusable: {0}")]
    Descriptor(#[from] TimeAxisError),
}

/// Temporal extent a layer declares in its capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeDimension {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step_hours: i64,
}

/// Parse a `START/END/STEP` descriptor such as
/// `2025-01-10T00:00:00Z/2025-01-26T00:00:00Z/PT3H`.
///
/// Only the first interval of a comma-separated list is used. The step is the
/// integer formed by the token's digits, so `PT3H` is 3 hours.
pub fn parse_time_dimension(descriptor: &str) -> Result<TimeDimension, TimeAxisError> {
    let first = descriptor.split(',').next().unwrap_or_default().trim();
    let parts: Vec<&str> = first.split('/').collect();
    if parts.len() != 3 {
        return Err(TimeAxisError::MalformedDescriptor(descriptor.to_string()));
    }

    let start = parse_instant(parts[0])?;
    let end = parse_instant(parts[1])?;

    let digits: String = parts[2].chars().filter(|c| c.is_ascii_digit()).collect();
    let step_hours = digits
        .parse::<i64>()
        .ok()
        .filter(|hours| *hours > 0)
        .ok_or_else(|| TimeAxisError::InvalidStep(parts[2].to_string()))?;

    Ok(TimeDimension {
        start,
        end,
        step_hours,
    })
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, TimeAxisError> {
    NaiveDateTime::parse_from_str(value.trim(), INSTANT_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| TimeAxisError::InvalidInstant(value.to_string(), e.to_string()))
}

/// Ordered instants to sample for one layer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimeAxis {
    timestamps: Vec<DateTime<Utc>>,
}

impl TimeAxis {
    /// Half-open `[start, end)` walk by the declared step
    pub fn from_dimension(dimension: &TimeDimension) -> Self {
        let step = Duration::hours(dimension.step_hours);
        let mut timestamps = Vec::new();
        let mut current = dimension.start;
        while current < dimension.end {
            timestamps.push(current);
            current += step;
        }
        Self { timestamps }
    }

    pub fn from_timestamps(mut timestamps: Vec<DateTime<Utc>>) -> Self {
        timestamps.sort();
        timestamps.dedup();
        Self { timestamps }
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Ask the remote service for a layer's time dimension and expand it
#[instrument(skip(source))]
pub async fn resolve_time_axis<S>(source: &S, layer_id: &str) -> Result<TimeAxis, ResolveError>
where
    S: ForecastSource + ?Sized,
{
    let descriptor = source.time_dimension(layer_id).await?;
    debug!("Layer {} declares time dimension {}", layer_id, descriptor);

    let dimension = parse_time_dimension(&descriptor)?;
    let axis = TimeAxis::from_dimension(&dimension);
    debug!(
        "Resolved {} timesteps every {}h for {}",
        axis.len(),
        dimension.step_hours,
        layer_id
    );
    Ok(axis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_time_dimension() {
        let dim = parse_time_dimension("2025-01-10T00:00:00Z/2025-01-26T00:00:00Z/PT3H").unwrap();
        assert_eq!(dim.start, utc(2025, 1, 10, 0));
        assert_eq!(dim.end, utc(2025, 1, 26, 0));
        assert_eq!(dim.step_hours, 3);
    }

    #[test]
    fn test_parse_step_strips_non_digits() {
        let dim = parse_time_dimension("2025-01-10T00:00:00Z/2025-01-11T00:00:00Z/PT24H").unwrap();
        assert_eq!(dim.step_hours, 24);
    }

    #[test]
    fn test_parse_uses_first_interval() {
        let dim = parse_time_dimension(
            "2025-01-10T00:00:00Z/2025-01-11T00:00:00Z/PT6H,2025-02-01T00:00:00Z/2025-02-02T00:00:00Z/PT1H",
        )
        .unwrap();
        assert_eq!(dim.step_hours, 6);
        assert_eq!(dim.start, utc(2025, 1, 10, 0));
    }

    #[test]
    fn test_parse_rejects_zero_step() {
        let result = parse_time_dimension("2025-01-10T00:00:00Z/2025-01-11T00:00:00Z/PT0H");
        assert!(matches!(result, Err(TimeAxisError::InvalidStep(_))));
    }

    #[test]
    fn test_parse_rejects_missing_step() {
        let result = parse_time_dimension("2025-01-10T00:00:00Z/2025-01-11T00:00:00Z");
        assert!(matches!(result, Err(TimeAxisError::MalformedDescriptor(_))));
    }

    #[test]
    fn test_parse_rejects_bad_instant() {
        let result = parse_time_dimension("2025-01-10/2025-01-11T00:00:00Z/PT3H");
        assert!(matches!(result, Err(TimeAxisError::InvalidInstant(_, _))));
    }

    #[test]
    fn test_axis_is_half_open() {
        let dim = TimeDimension {
            start: utc(2025, 1, 10, 0),
            end: utc(2025, 1, 11, 0),
            step_hours: 6,
        };
        let axis = TimeAxis::from_dimension(&dim);
        assert_eq!(
            axis.timestamps(),
            &[
                utc(2025, 1, 10, 0),
                utc(2025, 1, 10, 6),
                utc(2025, 1, 10, 12),
                utc(2025, 1, 10, 18)
            ]
        );
    }

    #[test]
    fn test_axis_with_uneven_end() {
        let dim = TimeDimension {
            start: utc(2025, 1, 10, 0),
            end: utc(2025, 1, 10, 7),
            step_hours: 3,
        };
        let axis = TimeAxis::from_dimension(&dim);
        assert_eq!(axis.len(), 3);
        assert_eq!(axis.timestamps()[2], utc(2025, 1, 10, 6));
    }

    #[test]
    fn test_axis_empty_when_end_not_after_start() {
        let dim = TimeDimension {
            start: utc(2025, 1, 10, 0),
            end: utc(2025, 1, 10, 0),
            step_hours: 3,
        };
        assert!(TimeAxis::from_dimension(&dim).is_empty());
    }
}
