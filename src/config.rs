use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;

use crate::catalog::CatalogProfile;
use crate::orchestrator::{ExecutionMode, OrchestratorSettings, DEFAULT_WORKERS};
use crate::sampler::{RetryPolicy, DEFAULT_BBOX_HALF_WIDTH};
use crate::table::{TableLayout, DEFAULT_HORIZON_DAYS};
use crate::wms::client::DEFAULT_WMS_URL;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}': {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub wms_url: String,
    pub stations_path: PathBuf,
    pub output_dir: PathBuf,
    pub run_log: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub layer_timeout_secs: u64,
    pub retry_max_attempts: usize,
    pub retry_delay_secs: u64,
    pub worker_concurrency: usize,
    pub horizon_days: u32,
    pub bbox_half_width_deg: f64,
    pub profile: CatalogProfile,
    pub mode: ExecutionMode,
    pub layout: TableLayout,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wms_url: DEFAULT_WMS_URL.to_string(),
            stations_path: PathBuf::from("stations.csv"),
            output_dir: PathBuf::from("output"),
            run_log: Some(PathBuf::from("run_log.log")),
            request_timeout_secs: 30,
            layer_timeout_secs: 30 * 60,
            retry_max_attempts: 3,
            retry_delay_secs: 5,
            worker_concurrency: DEFAULT_WORKERS,
            horizon_days: DEFAULT_HORIZON_DAYS,
            bbox_half_width_deg: DEFAULT_BBOX_HALF_WIDTH,
            profile: CatalogProfile::Labelled,
            mode: ExecutionMode::Parallel,
            layout: TableLayout::DaysAsRows,
        }
    }
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                name,
                reason: e.to_string(),
                value,
            }),
        Err(_) => Ok(default),
    }
}

fn parse_enum<T: ValueEnum>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => T::from_str(value.trim(), true).map_err(|reason| ConfigError::InvalidValue {
            name,
            value,
            reason,
        }),
        Err(_) => Ok(default),
    }
}

fn positive<T: PartialOrd + Default + ToString>(name: &'static str, value: T) -> Result<T, ConfigError> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        })
    }
}

fn finite_positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() {
        positive(name, value)
    } else {
        Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: "must be a finite number".to_string(),
        })
    }
}

impl Config {
    /// Read configuration from the environment, falling back to defaults.
    ///
    /// An empty `RUN_LOG` disables the run log file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let run_log = match env::var("RUN_LOG") {
            Ok(path) if path.trim().is_empty() => None,
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => defaults.run_log,
        };

        Ok(Config {
            wms_url: env::var("GEOMET_WMS_URL").unwrap_or(defaults.wms_url),
            stations_path: env::var("STATIONS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.stations_path),
            output_dir: env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            run_log,
            request_timeout_secs: positive(
                "REQUEST_TIMEOUT_SECS",
                parse_var("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            )?,
            layer_timeout_secs: positive(
                "LAYER_TIMEOUT_SECS",
                parse_var("LAYER_TIMEOUT_SECS", defaults.layer_timeout_secs)?,
            )?,
            retry_max_attempts: positive(
                "RETRY_MAX_ATTEMPTS",
                parse_var("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts)?,
            )?,
            retry_delay_secs: parse_var("RETRY_DELAY_SECS", defaults.retry_delay_secs)?,
            worker_concurrency: positive(
                "WORKER_CONCURRENCY",
                parse_var("WORKER_CONCURRENCY", defaults.worker_concurrency)?,
            )?,
            horizon_days: positive(
                "HORIZON_DAYS",
                parse_var("HORIZON_DAYS", defaults.horizon_days)?,
            )?,
            bbox_half_width_deg: finite_positive(
                "BBOX_HALF_WIDTH_DEG",
                parse_var("BBOX_HALF_WIDTH_DEG", defaults.bbox_half_width_deg)?,
            )?,
            profile: parse_enum("CATALOG_PROFILE", defaults.profile)?,
            mode: parse_enum("EXECUTION_MODE", defaults.mode)?,
            layout: parse_enum("TABLE_LAYOUT", defaults.layout)?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.retry_max_attempts,
            Duration::from_secs(self.retry_delay_secs),
        )
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            mode: self.mode,
            workers: self.worker_concurrency,
            layer_timeout: Duration::from_secs(self.layer_timeout_secs),
            output_dir: self.output_dir.clone(),
            layout: self.layout,
        }
    }
}
