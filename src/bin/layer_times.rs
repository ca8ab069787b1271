use std::time::Duration;

use clap::Parser;

use geomet_etl::catalog::{CatalogProfile, LayerCatalog};
use geomet_etl::time_axis::{parse_time_dimension, TimeAxis};
use geomet_etl::wms::client::DEFAULT_WMS_URL;
use geomet_etl::wms::{ForecastSource, GeometClient};

#[derive(Parser)]
#[command(name = "layer-times")]
#[command(about = "Show the time axis GeoMet declares for a forecast layer", long_about = None)]
struct Cli {
    /// Layer id, e.g. GDPS.ETA_TT
    layer_id: String,

    /// GeoMet WMS endpoint
    #[arg(long, env = "GEOMET_WMS_URL", default_value = DEFAULT_WMS_URL)]
    wms_url: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Print every timestep instead of the first and last few
    #[arg(long)]
    all: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let client = GeometClient::new(cli.wms_url.clone(), Duration::from_secs(cli.timeout_secs))?;

    println!("Querying {} for {}...\n", cli.wms_url, cli.layer_id);

    if let Some(layer) = LayerCatalog::for_profile(CatalogProfile::Labelled).get(&cli.layer_id) {
        println!("Catalog entry: {} ({:?})", layer.label, layer.kind);
    } else {
        println!("Catalog entry: none (layer is not aggregated by geomet-etl)");
    }

    let descriptor = client.time_dimension(&cli.layer_id).await?;
    let dimension = parse_time_dimension(&descriptor)?;
    let axis = TimeAxis::from_dimension(&dimension);

    println!("Descriptor: {}", descriptor);
    println!("Start:      {}", dimension.start);
    println!("End:        {}", dimension.end);
    println!("Step:       {}h", dimension.step_hours);
    println!("Timesteps:  {}", axis.len());

    let timestamps = axis.timestamps();
    if cli.all || timestamps.len() <= 10 {
        println!();
        for time in timestamps {
            println!("  {}", time.format("%Y-%m-%dT%H:%M:%SZ"));
        }
    } else {
        println!();
        for time in &timestamps[..5] {
            println!("  {}", time.format("%Y-%m-%dT%H:%M:%SZ"));
        }
        println!("  ... {} more ...", timestamps.len() - 10);
        for time in &timestamps[timestamps.len() - 5..] {
            println!("  {}", time.format("%Y-%m-%dT%H:%M:%SZ"));
        }
    }

    Ok(())
}
