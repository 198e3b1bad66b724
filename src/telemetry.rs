use once_cell::sync::OnceCell;
use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};
use tracing_subscriber::EnvFilter;

static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Install the tracing subscriber for a host process. Safe to call more than
/// once; later calls are no-ops.
pub fn init_tracing(verbose: bool) {
    if TRACING_INITIALIZED.get().is_some() {
        return;
    }
    let default_level = if verbose {
        "waylink=debug"
    } else {
        "waylink=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
    let _ = TRACING_INITIALIZED.set(());
}

/// Counters exported by the gateway. One instance per process, shared across
/// handlers behind an `Arc`.
pub struct ResolverMetrics {
    registry: Registry,
    resolve_requests_total: IntCounter,
    resolved_total: IntCounter,
    fallback_total: IntCounter,
    parse_errors_total: IntCounter,
}

impl ResolverMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let opts = Opts::new(name, help);
            IntCounter::with_opts(opts)
        };

        let resolve_requests_total = counter(
            "waylink_resolve_requests_total",
            "Total number of resolve requests received",
        )?;
        let resolved_total = counter(
            "waylink_resolved_total",
            "Number of requests resolved to a registered target application",
        )?;
        let fallback_total = counter(
            "waylink_fallback_total",
            "Number of requests answered with the discovery-store fallback link",
        )?;
        let parse_errors_total = counter(
            "waylink_parse_errors_total",
            "Number of requests rejected because the intent URI did not parse",
        )?;

        registry.register(Box::new(resolve_requests_total.clone()))?;
        registry.register(Box::new(resolved_total.clone()))?;
        registry.register(Box::new(fallback_total.clone()))?;
        registry.register(Box::new(parse_errors_total.clone()))?;

        Ok(Self {
            registry,
            resolve_requests_total,
            resolved_total,
            fallback_total,
            parse_errors_total,
        })
    }

    pub fn inc_request(&self) {
        self.resolve_requests_total.inc();
    }

    pub fn inc_resolved(&self) {
        self.resolved_total.inc();
    }

    pub fn inc_fallback(&self) {
        self.fallback_total.inc();
    }

    pub fn inc_parse_error(&self) {
        self.parse_errors_total.inc();
    }

    pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_appear_in_rendered_output() {
        let metrics = ResolverMetrics::new().expect("metrics build");
        metrics.inc_request();
        metrics.inc_resolved();
        metrics.inc_request();
        metrics.inc_fallback();

        let rendered = String::from_utf8(metrics.render().expect("render ok")).expect("utf8");
        assert!(rendered.contains("waylink_resolve_requests_total 2"));
        assert!(rendered.contains("waylink_resolved_total 1"));
        assert!(rendered.contains("waylink_fallback_total 1"));
        assert!(rendered.contains("waylink_parse_errors_total 0"));
    }
}
