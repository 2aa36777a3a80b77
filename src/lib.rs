pub mod backend;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod logging;
pub mod observability;
pub mod placeholders;
pub mod query;
pub mod scaling;
pub mod timeframe;
pub mod types;

// Application boundary and infrastructure adapters
pub mod app;
pub mod infra;
