/*!
Logging setup and optional Prometheus metrics.
*/

#[cfg(feature = "metrics")]
use prometheus::core::Collector;
#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::Instant;
use tracing::subscriber::set_global_default;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry as TracingRegistry};

use crate::{Result, VaultError};

/// Directive applied on top of `RUST_LOG`
pub const DEFAULT_LOG_DIRECTIVE: &str = "appvault=info";
/// Directive used instead of [`DEFAULT_LOG_DIRECTIVE`] in verbose mode
pub const VERBOSE_LOG_DIRECTIVE: &str = "appvault=debug";

#[cfg(feature = "metrics")]
static METRICS: OnceLock<VaultMetrics> = OnceLock::new();

/// Counters and histograms for extraction and restoration
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct VaultMetrics {
    pub extractions_total: Counter,
    pub restores_total: Counter,
    pub restore_failures_total: Counter,
    pub restore_item_failures_total: Counter,
    pub artifact_size_bytes: Histogram,
    pub restore_duration_seconds: Histogram,

    registry: Registry,
}

#[cfg(feature = "metrics")]
fn register<M>(registry: &Registry, metric: M) -> Result<M>
where
    M: Collector + Clone + 'static,
{
    registry
        .register(Box::new(metric.clone()))
        .map_err(|e| VaultError::storage(format!("Failed to register metric: {e}")))?;
    Ok(metric)
}

#[cfg(feature = "metrics")]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let metric = Counter::new(name, help)
        .map_err(|e| VaultError::storage(format!("Failed to create {name} metric: {e}")))?;
    register(registry, metric)
}

#[cfg(feature = "metrics")]
fn histogram(registry: &Registry, opts: HistogramOpts) -> Result<Histogram> {
    let name = opts.common_opts.name.clone();
    let metric = Histogram::with_opts(opts)
        .map_err(|e| VaultError::storage(format!("Failed to create {name} metric: {e}")))?;
    register(registry, metric)
}

#[cfg(feature = "metrics")]
impl VaultMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        Ok(Self {
            extractions_total: counter(
                &registry,
                "appvault_extractions_total",
                "Snapshots extracted from application data directories",
            )?,
            restores_total: counter(
                &registry,
                "appvault_restores_total",
                "Artifacts restored into a target",
            )?,
            restore_failures_total: counter(
                &registry,
                "appvault_restore_failures_total",
                "Artifacts that could not be opened or decoded",
            )?,
            restore_item_failures_total: counter(
                &registry,
                "appvault_restore_item_failures_total",
                "Preference values, rows and files that failed to restore",
            )?,
            artifact_size_bytes: histogram(
                &registry,
                HistogramOpts::new("appvault_artifact_size_bytes", "Size of sealed artifacts")
                    .buckets(prometheus::exponential_buckets(1024.0, 4.0, 10).unwrap_or_default()),
            )?,
            restore_duration_seconds: histogram(
                &registry,
                HistogramOpts::new(
                    "appvault_restore_duration_seconds",
                    "Duration of check-and-restore runs",
                ),
            )?,
            registry,
        })
    }

    /// Get or initialize the global metrics instance
    pub fn global() -> &'static VaultMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize AppVault metrics"))
    }

    pub fn record_extraction(&self) {
        self.extractions_total.inc();
    }

    pub fn record_artifact_size(&self, size_bytes: usize) {
        self.artifact_size_bytes.observe(size_bytes as f64);
    }

    pub fn record_restore(&self, item_failures: usize) {
        self.restores_total.inc();
        self.restore_item_failures_total.inc_by(item_failures as f64);
    }

    pub fn record_restore_failure(&self) {
        self.restore_failures_total.inc();
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| VaultError::storage(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| VaultError::storage(format!("Failed to convert metrics to string: {e}")))
    }
}

/// Records the duration of a restore run when finished
#[cfg(feature = "metrics")]
pub struct RestoreTimer {
    start: Instant,
}

#[cfg(feature = "metrics")]
impl RestoreTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        VaultMetrics::global()
            .restore_duration_seconds
            .observe(self.start.elapsed().as_secs_f64());
    }
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr, as JSON lines when `json` is set. `RUST_LOG` is
/// honoured, with [`DEFAULT_LOG_DIRECTIVE`] (or [`VERBOSE_LOG_DIRECTIVE`])
/// added on top.
pub fn init_observability(json: bool, verbose: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    VaultMetrics::global();

    let directive: Directive = if verbose {
        VERBOSE_LOG_DIRECTIVE
    } else {
        DEFAULT_LOG_DIRECTIVE
    }
    .parse()
    .map_err(|e| VaultError::validation(format!("Invalid log directive: {e}")))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));

    let subscriber = TracingRegistry::default()
        .with(filter)
        .with(json_layer)
        .with(text_layer);

    set_global_default(subscriber).map_err(|e| {
        VaultError::storage(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("AppVault observability initialized");
    Ok(())
}
