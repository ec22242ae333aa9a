//! Metrics and instrumentation for the relayer.
//!
//! This module defines Prometheus-compatible metrics for the indexer,
//! dispatcher and submitter, and exposes a small HTTP exporter that serves
//! `/metrics` in Prometheus text format.
//!
//! Typical usage in a node:
//!
//! ```ignore
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use relayer::metrics::{MetricsRegistry, run_prometheus_http_server};
//!
//! let registry = Arc::new(MetricsRegistry::new()?);
//! let addr: SocketAddr = "127.0.0.1:9898".parse()?;
//!
//! // Spawn the HTTP exporter in the background:
//! tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
//!
//! // Elsewhere in the code:
//! registry.relayer.blocks_indexed.inc();
//! ```

pub mod prometheus;

pub use self::prometheus::{MetricsRegistry, RelayerMetrics, run_prometheus_http_server};
