use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, instrument, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use geomet_etl::catalog::{CatalogProfile, LayerCatalog};
use geomet_etl::config::Config;
use geomet_etl::orchestrator::{ExecutionMode, StationOrchestrator};
use geomet_etl::sampler::PointSampler;
use geomet_etl::station::load_stations;
use geomet_etl::table::{forecast_horizon, TableLayout};
use geomet_etl::wms::GeometClient;

#[derive(Parser)]
#[command(name = "geomet-etl")]
#[command(about = "Sample GeoMet forecast layers at stations and write daily CSV tables", long_about = None)]
struct Cli {
    /// Station directory CSV (name,x,y,wind_in,wind_out)
    #[arg(long)]
    stations: Option<PathBuf>,

    /// Directory receiving one <station>.csv per station
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// GeoMet WMS endpoint
    #[arg(long)]
    wms_url: Option<String>,

    /// Catalog profile: column naming, snow rule and snapshot hour
    #[arg(long, value_enum)]
    profile: Option<CatalogProfile>,

    /// Run layers sequentially or on a bounded worker pool
    #[arg(long, value_enum)]
    mode: Option<ExecutionMode>,

    /// Orientation of the written tables
    #[arg(long, value_enum)]
    layout: Option<TableLayout>,

    /// Number of concurrent layer tasks in parallel mode
    #[arg(long)]
    workers: Option<NonZeroUsize>,

    /// First day of the forecast horizon (default: today, UTC)
    #[arg(long)]
    run_date: Option<NaiveDate>,

    /// Restrict the run to these layer ids (comma separated)
    #[arg(long, value_delimiter = ',')]
    layers: Vec<String>,

    /// Run log file (truncated at start)
    #[arg(long)]
    run_log: Option<PathBuf>,

    /// Do not write a run log file
    #[arg(long)]
    no_run_log: bool,

    /// Write the run summary as JSON to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.stations {
            config.stations_path = path.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(url) = &self.wms_url {
            config.wms_url = url.clone();
        }
        if let Some(profile) = self.profile {
            config.profile = profile;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(layout) = self.layout {
            config.layout = layout;
        }
        if let Some(workers) = self.workers {
            config.worker_concurrency = workers.get();
        }
        if let Some(path) = &self.run_log {
            config.run_log = Some(path.clone());
        }
        if self.no_run_log {
            config.run_log = None;
        }
    }
}

fn init_tracing(run_log: Option<&Path>) -> Result<(), std::io::Error> {
    let file_layer = match run_log {
        Some(path) => {
            let file = File::create(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,geomet_etl=debug")),
        )
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .with(file_layer)
        .init();
    Ok(())
}

fn build_catalog(profile: CatalogProfile, requested: &[String]) -> Result<LayerCatalog, String> {
    if requested.is_empty() {
        return Ok(LayerCatalog::for_profile(profile));
    }

    let full = LayerCatalog::for_profile(profile);
    let unknown: Vec<&str> = requested
        .iter()
        .map(String::as_str)
        .filter(|id| full.get(id).is_none())
        .collect();
    if !unknown.is_empty() {
        return Err(format!("Unknown layer ids: {}", unknown.join(", ")));
    }

    let ids: Vec<&str> = requested.iter().map(String::as_str).collect();
    Ok(LayerCatalog::with_layers(profile, &ids))
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    cli.apply(&mut config);

    init_tracing(config.run_log.as_deref())?;
    info!("Starting geomet-etl with config: {:?}", config);

    // Everything fatal is checked before the first station starts
    let catalog = build_catalog(config.profile, &cli.layers)?;
    let stations = load_stations(&config.stations_path)?;
    let client = Arc::new(GeometClient::new(
        config.wms_url.clone(),
        config.request_timeout(),
    )?);

    let run_date = cli.run_date.unwrap_or_else(|| Utc::now().date_naive());
    let horizon = forecast_horizon(run_date, config.horizon_days);
    info!(
        "Forecast horizon {} .. {} ({} days), {} layers, {} stations",
        run_date,
        horizon.last().copied().unwrap_or(run_date),
        horizon.len(),
        catalog.layers().len(),
        stations.len()
    );

    let sampler = PointSampler::new(client, config.retry_policy())
        .with_half_width(config.bbox_half_width_deg);
    let orchestrator =
        StationOrchestrator::new(sampler, catalog, horizon, config.orchestrator_settings());

    let pb = ProgressBar::new(stations.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} stations ({msg})")?
            .progress_chars("##-"),
    );

    let summary = orchestrator
        .run_with_progress(&stations, |outcome| {
            pb.set_message(outcome.station.clone());
            pb.inc(1);
        })
        .await;
    pb.finish_with_message("done");

    println!("\n============================================================");
    println!("GeoMet Forecast Run Summary");
    println!("============================================================");
    println!("Profile:            {:?}", summary.profile);
    println!("Mode:               {:?}", summary.mode);
    println!("Stations:           {}", summary.stations.len());
    println!("Files written:      {}", summary.files_written());
    println!("Failed layers:      {}", summary.failed_layer_count());
    println!(
        "Total Time:         {:.2}s",
        (summary.finished_at - summary.started_at).num_milliseconds() as f64 / 1000.0
    );
    println!("============================================================");

    for outcome in &summary.stations {
        for failure in &outcome.failed_layers {
            println!("  {} / {}: {}", outcome.station, failure.layer, failure.error);
        }
    }

    if let Some(path) = &cli.summary_json {
        std::fs::write(path, serde_json::to_string_pretty(&summary)?)?;
        info!("Wrote run summary to {}", path.display());
    }

    let persistence_failures = summary.persistence_failures();
    if persistence_failures > 0 {
        warn!("{} station tables could not be written", persistence_failures);
        return Err(format!("{persistence_failures} station tables could not be written").into());
    }

    Ok(())
}
