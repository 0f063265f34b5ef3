pub mod config;
pub mod crds;
pub mod date_time;
pub mod error;
pub mod index;
pub mod notify;
pub mod proxy;
pub mod reconciler;
pub mod resources;
pub mod telemetry;
