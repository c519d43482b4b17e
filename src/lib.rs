pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod table;
pub mod types;

// Layered boundaries: ports in app, reqwest adapters in infra
pub mod app;
pub mod infra;
