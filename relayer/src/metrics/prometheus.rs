//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and the strongly-typed [`RelayerMetrics`], and an async HTTP
//! exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header::HeaderValue,
    server::conn::http1, service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

/// Pipeline metrics.
///
/// These are registered into a [`Registry`] and updated by the indexer,
/// dispatcher and shard manager through the relayer context.
#[derive(Clone)]
pub struct RelayerMetrics {
    /// Blocks whose records were persisted by the indexer.
    pub blocks_indexed: IntCounter,
    /// Current index watermark (`high_local_block`).
    pub index_watermark: IntGauge,
    /// Blocks whose summary was persisted by the dispatcher.
    pub blocks_executed: IntCounter,
    /// Current execution watermark (`high_local_execution_block`).
    pub execution_watermark: IntGauge,
    /// Latency of one execution engine invocation, in seconds.
    pub engine_call_seconds: Histogram,
    /// Calls dropped before execution (authorization, transfers).
    pub calls_rejected: IntCounter,
    /// Transactions added to the outbound buffer.
    pub transactions_queued: IntCounter,
    /// Batches accepted by the ledger.
    pub batches_submitted: IntCounter,
    /// Batch submissions that failed.
    pub submissions_failed: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let c = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, prometheus::Error> {
    let g = IntGauge::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

impl RelayerMetrics {
    /// Registers relayer metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let engine_call_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "engine_call_seconds",
                "Time spent in one execution engine invocation in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ]),
        )?;
        registry.register(Box::new(engine_call_seconds.clone()))?;

        Ok(Self {
            blocks_indexed: counter(
                registry,
                "indexer_blocks_indexed",
                "Total number of blocks persisted by the indexer",
            )?,
            index_watermark: gauge(
                registry,
                "indexer_watermark",
                "Highest block durably indexed (high_local_block)",
            )?,
            blocks_executed: counter(
                registry,
                "dispatcher_blocks_executed",
                "Total number of blocks executed by the dispatcher",
            )?,
            execution_watermark: gauge(
                registry,
                "dispatcher_watermark",
                "Highest block durably executed (high_local_execution_block)",
            )?,
            engine_call_seconds,
            calls_rejected: counter(
                registry,
                "dispatcher_calls_rejected",
                "Total number of calls dropped before execution",
            )?,
            transactions_queued: counter(
                registry,
                "submitter_transactions_queued",
                "Total number of transactions added to the outbound buffer",
            )?,
            batches_submitted: counter(
                registry,
                "submitter_batches_submitted",
                "Total number of transaction batches accepted by the ledger",
            )?,
            submissions_failed: counter(
                registry,
                "submitter_submissions_failed",
                "Total number of failed batch submissions",
            )?,
        })
    }

    /// Metrics registered into a throwaway registry.
    pub fn detached() -> Result<Self, prometheus::Error> {
        Self::register(&Registry::new())
    }
}

/// Wrapper around a Prometheus registry and the relayer metrics.
///
/// This is the main handle you pass around in the node. It can be wrapped
/// in an [`Arc`] and shared across threads/tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub relayer: RelayerMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the relayer metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("relayer".to_string()), None)?;
        let relayer = RelayerMetrics::register(&registry)?;
        Ok(Self { registry, relayer })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::debug!("prometheus HTTP connection error: {err}");
            }
        });
    }
}

fn response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body.into()));
    *resp.status_mut() = status;
    resp
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let mut resp = response(StatusCode::OK, metrics.gather_text());
            resp.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            Ok(resp)
        }
        _ => Ok(response(StatusCode::NOT_FOUND, "not found")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn relayer_metrics_register_and_record() {
        let registry = Registry::new();
        let metrics = RelayerMetrics::register(&registry).expect("register metrics");

        metrics.blocks_indexed.inc();
        metrics.index_watermark.set(41);
        metrics.engine_call_seconds.observe(0.2);
        metrics.calls_rejected.inc();

        let metric_families = registry.gather();
        assert!(!metric_families.is_empty());
    }

    #[test]
    fn metrics_registry_gather_text_works() {
        let registry = MetricsRegistry::new().expect("create metrics registry");
        registry.relayer.execution_watermark.set(7);
        let text = registry.gather_text();
        assert!(text.contains("relayer_dispatcher_watermark 7"));
    }
}
