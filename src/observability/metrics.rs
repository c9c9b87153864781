use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub offers_total: IntCounterVec,
    pub dispatch_outcomes_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub vendor_lock_conflicts_total: IntCounter,
    pub vendors_locked: IntGauge,
    pub bookings_in_queue: IntGauge,
    pub fare_quotes_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let offers_total = IntCounterVec::new(
            Opts::new("offers_total", "Offers by lifecycle outcome"),
            &["outcome"],
        )
        .expect("valid offers_total metric");

        let dispatch_outcomes_total = IntCounterVec::new(
            Opts::new("dispatch_outcomes_total", "Dispatch attempts by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_outcomes_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of a single dispatch attempt in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let vendor_lock_conflicts_total = IntCounter::new(
            "vendor_lock_conflicts_total",
            "Vendor locks lost to a concurrent dispatch",
        )
        .expect("valid vendor_lock_conflicts_total metric");

        let vendors_locked = IntGauge::new("vendors_locked", "Vendors currently holding an offer")
            .expect("valid vendors_locked metric");

        let bookings_in_queue =
            IntGauge::new("bookings_in_queue", "Bookings waiting for the dispatch worker")
                .expect("valid bookings_in_queue metric");

        let fare_quotes_total = IntCounterVec::new(
            Opts::new("fare_quotes_total", "Fare quotes by pricing mode"),
            &["mode"],
        )
        .expect("valid fare_quotes_total metric");

        registry
            .register(Box::new(offers_total.clone()))
            .expect("register offers_total");
        registry
            .register(Box::new(dispatch_outcomes_total.clone()))
            .expect("register dispatch_outcomes_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(vendor_lock_conflicts_total.clone()))
            .expect("register vendor_lock_conflicts_total");
        registry
            .register(Box::new(vendors_locked.clone()))
            .expect("register vendors_locked");
        registry
            .register(Box::new(bookings_in_queue.clone()))
            .expect("register bookings_in_queue");
        registry
            .register(Box::new(fare_quotes_total.clone()))
            .expect("register fare_quotes_total");

        Self {
            registry,
            offers_total,
            dispatch_outcomes_total,
            dispatch_latency_seconds,
            vendor_lock_conflicts_total,
            vendors_locked,
            bookings_in_queue,
            fare_quotes_total,
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
