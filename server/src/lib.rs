//! Flareprof HTTP server
//!
//! Wraps a [`flareprof_agent::Profiler`] in the REST control surface, admin
//! endpoints, Prometheus metrics and an optional demo workload.

pub mod audit;
pub mod config;
pub mod metrics;
pub mod server;
pub mod workload;
