//! Check instrumentation.
//!
//! Checks report through [`InstrumentationSink`]; the agent wires it to a Prometheus registry
//! that `/metrics` renders in the text exposition format.

use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

const METRICS_NAMESPACE: &str = "netnurse";

pub trait InstrumentationSink: Send + Sync {
    fn observe_duration(&self, label: &str, seconds: f64);

    fn increment_error(&self, label: &str);

    /// Sizes of the discovered neighbourhood and of the filtered neighbour set.
    fn record_neighbourhood(&self, _discovered: usize, _selected: usize) {}

    /// An outgoing HTTP request was sent.
    fn request_started(&self) {}

    /// A request started with [`request_started`](Self::request_started) is over. `status`
    /// is `None` when no response arrived.
    fn request_finished(&self, _status: Option<u16>) {}
}

pub struct PrometheusSink {
    registry: Registry,
    durations: HistogramVec,
    errors: IntCounterVec,
    neighbourhood_size: IntGauge,
    selected_neighbours: IntGauge,
    client_requests: IntCounterVec,
    client_in_flight: IntGauge,
}

impl PrometheusSink {
    pub fn new(duration_buckets: Vec<f64>) -> Result<Self> {
        let registry = Registry::new();

        let durations = HistogramVec::new(
            HistogramOpts::new(
                "request_duration",
                "Netnurse request duration partitioned by target path",
            )
            .namespace(METRICS_NAMESPACE)
            .buckets(duration_buckets),
            &["type"],
        )?;

        let errors = IntCounterVec::new(
            Opts::new("errors_total", "Netnurse error counter partitioned by error type")
                .namespace(METRICS_NAMESPACE),
            &["type"],
        )?;

        let neighbourhood_size = IntGauge::with_opts(
            Opts::new(
                "neighbourhood_size",
                "Number of eligible neighbours discovered in the last cycle",
            )
            .namespace(METRICS_NAMESPACE),
        )?;

        let selected_neighbours = IntGauge::with_opts(
            Opts::new(
                "selected_neighbours",
                "Number of neighbours checked in the last cycle",
            )
            .namespace(METRICS_NAMESPACE),
        )?;

        let client_requests = IntCounterVec::new(
            Opts::new(
                "httpclient_requests_total",
                "Requests made by the check client partitioned by response status code",
            )
            .namespace(METRICS_NAMESPACE),
            &["code"],
        )?;

        let client_in_flight = IntGauge::with_opts(
            Opts::new(
                "httpclient_in_flight_requests",
                "Requests of the check client waiting for a response",
            )
            .namespace(METRICS_NAMESPACE),
        )?;

        registry.register(Box::new(durations.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(neighbourhood_size.clone()))?;
        registry.register(Box::new(selected_neighbours.clone()))?;
        registry.register(Box::new(client_requests.clone()))?;
        registry.register(Box::new(client_in_flight.clone()))?;

        Ok(Self {
            registry,
            durations,
            errors,
            neighbourhood_size,
            selected_neighbours,
            client_requests,
            client_in_flight,
        })
    }

    /// Renders all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }
}

impl InstrumentationSink for PrometheusSink {
    fn observe_duration(&self, label: &str, seconds: f64) {
        self.durations.with_label_values(&[label]).observe(seconds);
    }

    fn increment_error(&self, label: &str) {
        self.errors.with_label_values(&[label]).inc();
    }

    fn record_neighbourhood(&self, discovered: usize, selected: usize) {
        self.neighbourhood_size.set(discovered as i64);
        self.selected_neighbours.set(selected as i64);
    }

    fn request_started(&self) {
        self.client_in_flight.inc();
    }

    fn request_finished(&self, status: Option<u16>) {
        self.client_in_flight.dec();

        if let Some(status) = status {
            self.client_requests
                .with_label_values(&[status.to_string().as_str()])
                .inc();
        }
    }
}
