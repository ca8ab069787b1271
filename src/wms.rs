// WMS access for the forecast pipeline
//
// Only two requests are used against GeoMet:
// - GetCapabilities (one layer): the layer's declared time dimension
// - GetFeatureInfo: the pixel value under a station at one instant

pub mod capabilities;
pub mod client;
pub mod feature_info;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::fetch_error::FetchError;

pub use client::GeometClient;
pub use feature_info::extract_pixel_value;

/// Remote forecast service the sampler and resolver talk to
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Raw `START/END/STEP` time descriptor declared for a layer
    async fn time_dimension(&self, layer_id: &str) -> Result<String, FetchError>;

    /// Text body of a feature query for one pixel at one instant
    async fn feature_info(&self, query: &FeatureQuery<'_>) -> Result<String, FetchError>;
}

/// Geographic box in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn around(lat: f64, lon: f64, half_width_deg: f64) -> Self {
        Self {
            min_lon: lon - half_width_deg,
            min_lat: lat - half_width_deg,
            max_lon: lon + half_width_deg,
            max_lat: lat + half_width_deg,
        }
    }

    /// `BBOX` value for WMS 1.3.0 with `CRS=EPSG:4326` (latitude first)
    pub fn to_wms_130_epsg4326(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lat, self.min_lon, self.max_lat, self.max_lon
        )
    }
}

/// Size of the image the feature query is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelGrid {
    pub width: u32,
    pub height: u32,
}

impl PixelGrid {
    /// Pixel under the box centre
    pub fn centre(&self) -> (u32, u32) {
        (self.width / 2, self.height / 2)
    }
}

impl Default for PixelGrid {
    fn default() -> Self {
        Self {
            width: 100,
            height: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureQuery<'a> {
    pub layer_id: &'a str,
    pub bbox: BoundingBox,
    pub grid: PixelGrid,
    pub time: DateTime<Utc>,
}

impl FeatureQuery<'_> {
    /// `TIME` value: ISO8601 with a trailing `Z`
    pub fn time_param(&self) -> String {
        self.time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}
