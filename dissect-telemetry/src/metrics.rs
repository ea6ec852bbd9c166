//! ## dissect-telemetry::metrics
//! **Prometheus export of arena statistics**
//!
//! Allocator counters are copied into gauges labelled by arena name whenever
//! [`ArenaMetrics::record`] is called (typically on scope exit or on a
//! scrape), then encoded with the Prometheus text format.

use dissect_config::TelemetryConfig;
use dissect_mem::{Allocator, StatsSnapshot};
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct ArenaMetrics {
    pub registry: Registry,
    allocations: IntGaugeVec,
    reallocations: IntGaugeVec,
    frees: IntGaugeVec,
    free_alls: IntGaugeVec,
    compactions: IntGaugeVec,
    bytes_requested: IntGaugeVec,
}

fn arena_gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGaugeVec, prometheus::Error> {
    let gauge = IntGaugeVec::new(Opts::new(name, help), &["arena"])?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl ArenaMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        Ok(Self {
            allocations: arena_gauge(&registry, "dissect_arena_allocations", "Allocations served by the arena")?,
            reallocations: arena_gauge(&registry, "dissect_arena_reallocations", "Reallocations served by the arena")?,
            frees: arena_gauge(&registry, "dissect_arena_frees", "Individual frees requested from the arena")?,
            free_alls: arena_gauge(&registry, "dissect_arena_free_alls", "Bulk frees of the arena")?,
            compactions: arena_gauge(&registry, "dissect_arena_compactions", "Compaction passes over the arena")?,
            bytes_requested: arena_gauge(&registry, "dissect_arena_bytes_requested", "Bytes requested from the arena")?,
            registry,
        })
    }

    /// Builds the exporter when `config.metrics` is enabled.
    pub fn from_config(config: &TelemetryConfig) -> Result<Option<Self>, prometheus::Error> {
        if config.metrics {
            Self::new().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Publishes `stats` under the `arena` label.
    pub fn record(&self, arena: &str, stats: &StatsSnapshot) {
        let labels = [arena];
        self.allocations.with_label_values(&labels).set(clamp(stats.allocations));
        self.reallocations.with_label_values(&labels).set(clamp(stats.reallocations));
        self.frees.with_label_values(&labels).set(clamp(stats.frees));
        self.free_alls.with_label_values(&labels).set(clamp(stats.free_alls));
        self.compactions.with_label_values(&labels).set(clamp(stats.compactions));
        self.bytes_requested.with_label_values(&labels).set(clamp(stats.bytes_requested));
        trace!(arena, allocations = stats.allocations, "arena stats recorded");
    }

    /// Publishes the current statistics of `allocator` under its label.
    pub fn record_allocator(&self, allocator: &Allocator) {
        self.record(allocator.label(), &allocator.stats());
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
