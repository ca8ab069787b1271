//! Daily reduction of sampled forecast series
//!
//! Samples are grouped by their UTC calendar day and reduced according to the
//! layer's aggregation kind. Numeric results are rounded half-to-even to whole
//! numbers; mode columns carry text labels.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Duration, NaiveDate};

use crate::catalog::{AggregationKind, ColumnNaming, Layer, Statistic, ValueTransform};
use crate::sampler::Sample;
use crate::station::Station;

/// One cell of a station table
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(v) => write!(f, "{v}"),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

/// Values of one output column keyed by day
#[derive(Debug, Clone, PartialEq)]
pub struct DailyColumn {
    pub name: String,
    pub values: BTreeMap<NaiveDate, Cell>,
}

/// Round to a whole number, ties to even, never producing `-0`
pub fn round_whole(value: f64) -> f64 {
    value.round_ties_even() + 0.0
}

/// Ordinal band for a wind speed in m/s
pub fn wind_speed_band(speed: f64) -> &'static str {
    if speed <= 1.0 {
        "C"
    } else if speed <= 7.0 {
        "L"
    } else if speed <= 11.0 {
        "M"
    } else if speed <= 17.0 {
        "S"
    } else {
        "X"
    }
}

fn group_by_day(samples: &[Sample]) -> BTreeMap<NaiveDate, Vec<f64>> {
    let mut days: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for sample in samples {
        days.entry(sample.time.date_naive())
            .or_default()
            .push(sample.value);
    }
    days
}

fn numeric_column(
    name: String,
    days: &BTreeMap<NaiveDate, Vec<f64>>,
    reduce: impl Fn(&[f64]) -> f64,
) -> DailyColumn {
    let values = days
        .iter()
        .map(|(day, vals)| (*day, Cell::Number(round_whole(reduce(vals)))))
        .collect();
    DailyColumn { name, values }
}

/// Most frequent label; ties go to the lexicographically smallest
fn mode(labels: &[String]) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for label in labels {
        *counts.entry(label.as_str()).or_default() += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (label, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label.to_string())
}

fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// Reduce one layer's samples to its daily output columns
///
/// Columns come back in the order of [`Layer::statistics`]. Days without samples
/// (or, for lagged snapshots, without a sample at the snapshot time) have no
/// entry.
pub fn aggregate_daily(
    layer: &Layer,
    naming: ColumnNaming,
    station: &Station,
    samples: &[Sample],
) -> Vec<DailyColumn> {
    let name = |statistic| layer.column_name(naming, statistic);

    match layer.kind {
        AggregationKind::MinMax => {
            let days = group_by_day(samples);
            vec![
                numeric_column(name(Statistic::Min), &days, |v| {
                    v.iter().copied().fold(f64::INFINITY, f64::min)
                }),
                numeric_column(name(Statistic::Max), &days, |v| {
                    v.iter().copied().fold(f64::NEG_INFINITY, f64::max)
                }),
            ]
        }
        AggregationKind::Mean => {
            let days = group_by_day(samples);
            vec![numeric_column(name(Statistic::Mean), &days, |v| {
                sum(v) / v.len() as f64
            })]
        }
        AggregationKind::Sum => {
            let days = group_by_day(samples);
            vec![numeric_column(name(Statistic::Total), &days, sum)]
        }
        AggregationKind::ScaledSum(bands) => {
            let days = group_by_day(samples);
            bands
                .iter()
                .map(|band| {
                    numeric_column(name(Statistic::Band(band.suffix)), &days, |v| {
                        sum(v) / band.divisor
                    })
                })
                .collect()
        }
        AggregationKind::ModeWithTransform(transform) => {
            let mut labels: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
            for sample in samples {
                let label = match transform {
                    ValueTransform::WindDirection => station.wind_label(sample.value),
                    ValueTransform::WindSpeed => wind_speed_band(sample.value),
                };
                labels
                    .entry(sample.time.date_naive())
                    .or_default()
                    .push(label.to_string());
            }
            let values = labels
                .into_iter()
                .filter_map(|(day, labels)| mode(&labels).map(|m| (day, Cell::Text(m))))
                .collect();
            vec![DailyColumn {
                name: name(Statistic::Value),
                values,
            }]
        }
        AggregationKind::LaggedSnapshot {
            lag_days,
            time_of_day,
        } => {
            let lag = Duration::days(lag_days);
            let mut values = BTreeMap::new();
            for sample in samples {
                let shifted = sample.time - lag;
                if shifted.time() == time_of_day {
                    values
                        .entry(shifted.date_naive())
                        .or_insert(Cell::Number(round_whole(sample.value)));
                }
            }
            vec![DailyColumn {
                name: name(Statistic::Value),
                values,
            }]
        }
    }
}
