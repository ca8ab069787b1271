use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::aggregate::{aggregate_daily, DailyColumn};
use crate::catalog::{CatalogProfile, Layer, LayerCatalog};
use crate::sampler::{PointSampler, SampledSeries};
use crate::station::Station;
use crate::table::{StationTable, TableError, TableLayout};
use crate::time_axis::{resolve_time_axis, ResolveError};
use crate::wms::ForecastSource;

/// Default size of the per-station layer pool
pub const DEFAULT_WORKERS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("Metadata unavailable for {layer}: {source}")]
    MetadataUnavailable {
        layer: String,
        #[source]
        source: ResolveError,
    },
    #[error("Sampling unavailable for {layer} after {attempts} attempts: {last_error}")]
    SamplingUnavailable {
        layer: String,
        attempts: usize,
        last_error: String,
    },
    #[error("Layer {layer} did not finish within {timeout:?}")]
    TimedOut { layer: String, timeout: Duration },
    #[error("Could not merge {layer} into the station table: {source}")]
    Merge {
        layer: String,
        #[source]
        source: TableError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Layers one after another
    Sequential,
    /// Layers on a bounded pool of concurrent tasks
    Parallel,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub mode: ExecutionMode,
    pub workers: usize,
    pub layer_timeout: Duration,
    pub output_dir: PathBuf,
    pub layout: TableLayout,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            workers: DEFAULT_WORKERS,
            layer_timeout: Duration::from_secs(30 * 60),
            output_dir: PathBuf::from("output"),
            layout: TableLayout::DaysAsRows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerFailure {
    pub layer: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationOutcome {
    pub station: String,
    pub file: Option<PathBuf>,
    pub columns: usize,
    pub failed_layers: Vec<LayerFailure>,
    pub persistence_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub profile: CatalogProfile,
    pub mode: ExecutionMode,
    pub horizon_start: Option<NaiveDate>,
    pub horizon_days: usize,
    pub stations: Vec<StationOutcome>,
}

impl RunSummary {
    pub fn files_written(&self) -> usize {
        self.stations.iter().filter(|s| s.file.is_some()).count()
    }

    pub fn failed_layer_count(&self) -> usize {
        self.stations.iter().map(|s| s.failed_layers.len()).sum()
    }

    pub fn persistence_failures(&self) -> usize {
        self.stations
            .iter()
            .filter(|s| s.persistence_error.is_some())
            .count()
    }
}

/// Runs every catalog layer for every station and writes one table per station
pub struct StationOrchestrator<S: ?Sized> {
    sampler: PointSampler<S>,
    catalog: LayerCatalog,
    horizon: Vec<NaiveDate>,
    settings: OrchestratorSettings,
}

impl<S> StationOrchestrator<S>
where
    S: ForecastSource + ?Sized,
{
    /// `horizon` is fixed here and shared by every station of the run.
    pub fn new(
        sampler: PointSampler<S>,
        catalog: LayerCatalog,
        horizon: Vec<NaiveDate>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            sampler,
            catalog,
            horizon,
            settings,
        }
    }

    pub fn catalog(&self) -> &LayerCatalog {
        &self.catalog
    }

    pub fn horizon(&self) -> &[NaiveDate] {
        &self.horizon
    }

    /// Resolve, sample and aggregate one layer for one station
    #[instrument(skip(self, station, layer), fields(station = %station.name, layer = %layer.id))]
    pub async fn process_layer(
        &self,
        station: &Station,
        layer: &Layer,
    ) -> Result<Vec<DailyColumn>, LayerError> {
        info!("Commence WMS calls for {}", layer.id);
        let axis = resolve_time_axis(self.sampler.source(), layer.id)
            .await
            .map_err(|source| LayerError::MetadataUnavailable {
                layer: layer.id.to_string(),
                source,
            })?;

        let samples = match self.sampler.sample(layer.id, station, &axis).await {
            SampledSeries::Available(samples) => samples,
            SampledSeries::Unavailable {
                attempts,
                last_error,
            } => {
                return Err(LayerError::SamplingUnavailable {
                    layer: layer.id.to_string(),
                    attempts,
                    last_error,
                })
            }
        };
        info!("Complete WMS calls for {}: {} samples", layer.id, samples.len());

        Ok(aggregate_daily(
            layer,
            self.catalog.naming(),
            station,
            &samples,
        ))
    }

    async fn process_layer_bounded(
        &self,
        station: &Station,
        layer: &Layer,
    ) -> Result<Vec<DailyColumn>, LayerError> {
        let timeout = self.settings.layer_timeout;
        tokio::time::timeout(timeout, self.process_layer(station, layer))
            .await
            .map_err(|_| LayerError::TimedOut {
                layer: layer.id.to_string(),
                timeout,
            })?
    }

    /// Build a station's table; failed layers are reported and left out
    #[instrument(skip(self, station), fields(station = %station.name, mode = ?self.settings.mode))]
    pub async fn build_table(&self, station: &Station) -> (StationTable, Vec<LayerFailure>) {
        let layers = self.catalog.layers().iter().enumerate();

        let mut results: Vec<(usize, Result<Vec<DailyColumn>, LayerError>)> =
            match self.settings.mode {
                ExecutionMode::Sequential => {
                    let mut results = Vec::with_capacity(self.catalog.layers().len());
                    for (position, layer) in layers {
                        results.push((position, self.process_layer_bounded(station, layer).await));
                    }
                    results
                }
                ExecutionMode::Parallel => {
                    stream::iter(layers)
                        .map(|(position, layer)| async move {
                            (position, self.process_layer_bounded(station, layer).await)
                        })
                        .buffer_unordered(self.settings.workers.max(1))
                        .collect()
                        .await
                }
            };
        results.sort_by_key(|(position, _)| *position);

        let mut table = StationTable::new(station.name.clone(), self.horizon.clone());
        let mut failures = Vec::new();

        for (position, result) in results {
            let layer = &self.catalog.layers()[position];
            let merged = result.and_then(|columns| {
                table
                    .insert_layer(position, columns)
                    .map_err(|source| LayerError::Merge {
                        layer: layer.id.to_string(),
                        source,
                    })
            });
            if let Err(e) = merged {
                error!(station = %station.name, layer = %layer.id, error = %e, "Layer left out of station table");
                failures.push(LayerFailure {
                    layer: layer.id.to_string(),
                    error: e.to_string(),
                });
            }
        }

        debug!(
            "Station {} table has {} columns, {} layers failed",
            station.name,
            table.columns().count(),
            failures.len()
        );
        (table, failures)
    }

    /// Process every station in order, writing each table before moving on
    pub async fn run(&self, stations: &[Station]) -> RunSummary {
        self.run_with_progress(stations, |_| {}).await
    }

    pub async fn run_with_progress<F>(&self, stations: &[Station], mut on_station: F) -> RunSummary
    where
        F: FnMut(&StationOutcome),
    {
        let started_at = Utc::now();
        info!(
            stations = stations.len(),
            layers = self.catalog.layers().len(),
            "Start time: {}",
            started_at
        );

        let mut outcomes = Vec::with_capacity(stations.len());
        for station in stations {
            info!("Station: {}...", station.name);
            let (table, failed_layers) = self.build_table(station).await;
            let columns = table.columns().count();

            let (file, persistence_error) =
                match table.save(&self.settings.output_dir, self.settings.layout) {
                    Ok(path) => {
                        info!("Successfully saved CSV for station {}: {}", station.name, path.display());
                        (Some(path), None)
                    }
                    Err(e) => {
                        error!(station = %station.name, error = %e, "Failed to save CSV");
                        (None, Some(e.to_string()))
                    }
                };

            if !failed_layers.is_empty() {
                warn!(
                    "Station {} finished with {} failed layers",
                    station.name,
                    failed_layers.len()
                );
            }

            let outcome = StationOutcome {
                station: station.name.clone(),
                file,
                columns,
                failed_layers,
                persistence_error,
            };
            on_station(&outcome);
            outcomes.push(outcome);
        }

        let finished_at = Utc::now();
        info!("End time: {}", finished_at);

        RunSummary {
            started_at,
            finished_at,
            profile: self.catalog.profile(),
            mode: self.settings.mode,
            horizon_start: self.horizon.first().copied(),
            horizon_days: self.horizon.len(),
            stations: outcomes,
        }
    }
}
