use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub offers_total: IntCounterVec,
    pub dispatch_attempts_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub orders_in_queue: IntGauge,
    pub sweeps_total: IntCounter,
    pub sweep_failures_total: IntCounter,
    pub directory_fallbacks_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let offers_total = IntCounterVec::new(
            Opts::new("offers_total", "Offer lifecycle transitions by outcome"),
            &["outcome"],
        )
        .expect("valid offers_total metric");

        let dispatch_attempts_total = IntCounterVec::new(
            Opts::new("dispatch_attempts_total", "CreateOffer runs by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_attempts_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of CreateOffer in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let orders_in_queue = IntGauge::new("orders_in_queue", "Ready orders waiting for dispatch")
            .expect("valid orders_in_queue metric");

        let sweeps_total = IntCounter::new("sweeps_total", "Completed expiry sweeper ticks")
            .expect("valid sweeps_total metric");

        let sweep_failures_total = IntCounter::new(
            "sweep_failures_total",
            "Per-order failures inside expiry sweeper ticks",
        )
        .expect("valid sweep_failures_total metric");

        let directory_fallbacks_total = IntCounter::new(
            "directory_fallbacks_total",
            "Courier searches that fell back from the geospatial index to a full scan",
        )
        .expect("valid directory_fallbacks_total metric");

        registry
            .register(Box::new(offers_total.clone()))
            .expect("register offers_total");
        registry
            .register(Box::new(dispatch_attempts_total.clone()))
            .expect("register dispatch_attempts_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(orders_in_queue.clone()))
            .expect("register orders_in_queue");
        registry
            .register(Box::new(sweeps_total.clone()))
            .expect("register sweeps_total");
        registry
            .register(Box::new(sweep_failures_total.clone()))
            .expect("register sweep_failures_total");
        registry
            .register(Box::new(directory_fallbacks_total.clone()))
            .expect("register directory_fallbacks_total");

        Self {
            registry,
            offers_total,
            dispatch_attempts_total,
            dispatch_latency_seconds,
            orders_in_queue,
            sweeps_total,
            sweep_failures_total,
            directory_fallbacks_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
