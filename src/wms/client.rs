use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{capabilities, FeatureQuery, ForecastSource};
use crate::fetch_error::FetchError;

/// Default GeoMet WMS endpoint
pub const DEFAULT_WMS_URL: &str = "https://geo.weather.gc.ca/geomet";

const WMS_VERSION: &str = "1.3.0";

/// HTTP client for the MSC GeoMet WMS service
#[derive(Clone)]
pub struct GeometClient {
    client: reqwest::Client,
    base_url: String,
}

impl GeometClient {
    /// Every request made through this client is bounded by `request_timeout`.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_text(
        &self,
        request: &'static str,
        params: &[(&str, String)],
    ) -> Result<String, FetchError> {
        let response = self.client.get(&self.base_url).query(params).send().await?;
        let status = response.status();
        debug!("Received {} response with status: {}", request, status);

        if !status.is_success() {
            return Err(FetchError::Status { status, request });
        }

        let text = response.text().await?;
        debug!("Retrieved {} body, size: {} bytes", request, text.len());
        Ok(text)
    }
}

#[async_trait]
impl ForecastSource for GeometClient {
    #[instrument(skip(self), fields(url = %self.base_url))]
    async fn time_dimension(&self, layer_id: &str) -> Result<String, FetchError> {
        let params = [
            ("SERVICE", "WMS".to_string()),
            ("VERSION", WMS_VERSION.to_string()),
            ("REQUEST", "GetCapabilities".to_string()),
            ("LAYER", layer_id.to_string()),
        ];
        let xml = self.get_text("GetCapabilities", &params).await?;
        capabilities::find_time_dimension(&xml, layer_id)
    }

    #[instrument(skip(self, query), fields(layer = %query.layer_id, time = %query.time_param()))]
    async fn feature_info(&self, query: &FeatureQuery<'_>) -> Result<String, FetchError> {
        let (i, j) = query.grid.centre();
        let params = [
            ("SERVICE", "WMS".to_string()),
            ("VERSION", WMS_VERSION.to_string()),
            ("REQUEST", "GetFeatureInfo".to_string()),
            ("LAYERS", query.layer_id.to_string()),
            ("QUERY_LAYERS", query.layer_id.to_string()),
            ("CRS", "EPSG:4326".to_string()),
            ("BBOX", query.bbox.to_wms_130_epsg4326()),
            ("WIDTH", query.grid.width.to_string()),
            ("HEIGHT", query.grid.height.to_string()),
            ("I", i.to_string()),
            ("J", j.to_string()),
            ("FORMAT", "image/jpeg".to_string()),
            ("INFO_FORMAT", "text/plain".to_string()),
            ("FEATURE_COUNT", "1".to_string()),
            ("TIME", query.time_param()),
        ];
        self.get_text("GetFeatureInfo", &params).await
    }
}
