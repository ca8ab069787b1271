pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod fetch_error;
pub mod orchestrator;
pub mod sampler;
pub mod station;
pub mod table;
pub mod time_axis;
pub mod wms;
