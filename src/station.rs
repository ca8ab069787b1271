use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::wms::BoundingBox;

#[derive(Debug, thiserror::Error)]
pub enum StationLoadError {
    #[error("Failed to read station directory {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("Invalid station at row {row}: {msg}")]
    Invalid { row: usize, msg: String },
    #[error("Station directory {0} lists no stations")]
    Empty(String),
}

/// A forecast point, one CSV output per station
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Station {
    pub name: String,
    /// Longitude in degrees
    #[serde(rename = "x")]
    pub lon: f64,
    /// Latitude in degrees
    #[serde(rename = "y")]
    pub lat: f64,
    /// Label for winds blowing from roughly 315°–135°
    pub wind_in: String,
    /// Label for winds blowing from roughly 135°–315°
    pub wind_out: String,
}

impl Station {
    pub fn bbox(&self, half_width_deg: f64) -> BoundingBox {
        BoundingBox::around(self.lat, self.lon, half_width_deg)
    }

    /// Label for a wind direction in degrees: `trunc((deg + 45) / 180) mod 2`
    /// selects `wind_in` (0) or `wind_out` (1).
    pub fn wind_label(&self, degrees: f64) -> &str {
        let bucket = ((degrees + 45.0) / 180.0).trunc() as i64;
        if bucket.rem_euclid(2) == 0 {
            &self.wind_in
        } else {
            &self.wind_out
        }
    }
}

/// Load the station directory, failing on the first unusable record
#[instrument]
pub fn load_stations(path: &Path) -> Result<Vec<Station>, StationLoadError> {
    let origin = path.display().to_string();
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| StationLoadError::Csv {
            path: origin.clone(),
            source,
        })?;
    let stations = read_stations(reader, &origin)?;
    info!("Loaded {} stations from {}", stations.len(), origin);
    Ok(stations)
}

/// Parse stations from any CSV source with a `name,x,y,wind_in,wind_out` header
pub fn parse_stations<R: Read>(input: R, origin: &str) -> Result<Vec<Station>, StationLoadError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input);
    read_stations(reader, origin)
}

fn read_stations<R: Read>(
    mut reader: csv::Reader<R>,
    origin: &str,
) -> Result<Vec<Station>, StationLoadError> {
    let mut stations = Vec::new();
    let mut names = HashSet::new();

    for (idx, record) in reader.deserialize::<Station>().enumerate() {
        // Header is row 1
        let row = idx + 2;
        let station = record.map_err(|source| StationLoadError::Csv {
            path: origin.to_string(),
            source,
        })?;
        validate_station(&station, row)?;
        if !names.insert(station.name.clone()) {
            return Err(StationLoadError::Invalid {
                row,
                msg: format!("duplicate station name '{}'", station.name),
            });
        }
        debug!("Station {} at ({}, {})", station.name, station.lat, station.lon);
        stations.push(station);
    }

    if stations.is_empty() {
        return Err(StationLoadError::Empty(origin.to_string()));
    }
    Ok(stations)
}

fn validate_station(station: &Station, row: usize) -> Result<(), StationLoadError> {
    let invalid = |msg: String| Err(StationLoadError::Invalid { row, msg });

    if station.name.is_empty() {
        return invalid("empty station name".to_string());
    }
    if station.name.contains(['/', '\\']) || station.name == "." || station.name == ".." {
        return invalid(format!("'{}' cannot be used as a file name", station.name));
    }
    if !(-90.0..=90.0).contains(&station.lat) {
        return invalid(format!("latitude {} out of range", station.lat));
    }
    if !(-180.0..=180.0).contains(&station.lon) {
        return invalid(format!("longitude {} out of range", station.lon));
    }
    Ok(())
}
