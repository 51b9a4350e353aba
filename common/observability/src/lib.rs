use prometheus::{Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct CheckoutMetrics {
    pub registry: Registry,
    pub http_errors_total: IntCounterVec,
    pub gateway_requests_total: IntCounterVec,
    pub gateway_request_duration_seconds: HistogramVec,
    pub payment_notifications_total: IntCounterVec,
}

impl CheckoutMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let http_errors_total = IntCounterVec::new(
            Opts::new(
                "http_errors_total",
                "Count of HTTP error responses emitted (status >= 400)",
            ),
            &["service", "code", "status"],
        )?;
        let gateway_requests_total = IntCounterVec::new(
            Opts::new(
                "gateway_requests_total",
                "Outbound payment gateway calls grouped by operation and outcome",
            ),
            &["operation", "outcome"],
        )?;
        let gateway_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gateway_request_duration_seconds",
                "Latency of outbound payment gateway calls",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
            &["operation"],
        )?;
        let payment_notifications_total = IntCounterVec::new(
            Opts::new(
                "payment_notifications_total",
                "Verified payment notifications grouped by derived payment status",
            ),
            &["payment_status"],
        )?;
        registry.register(Box::new(http_errors_total.clone()))?;
        registry.register(Box::new(gateway_requests_total.clone()))?;
        registry.register(Box::new(gateway_request_duration_seconds.clone()))?;
        registry.register(Box::new(payment_notifications_total.clone()))?;
        Ok(Self {
            registry,
            http_errors_total,
            gateway_requests_total,
            gateway_request_duration_seconds,
            payment_notifications_total,
        })
    }

    pub fn record_http_error(&self, service: &str, code: &str, status: u16) {
        self.http_errors_total
            .with_label_values(&[service, code, &status.to_string()])
            .inc();
    }

    /// Histogram for one gateway operation.
    pub fn gateway_timer(&self, operation: &str) -> Histogram {
        self.gateway_request_duration_seconds.with_label_values(&[operation])
    }

    pub fn record_gateway_call(&self, operation: &str, outcome: &str) {
        self.gateway_requests_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn record_notification(&self, payment_status: &str) {
        self.payment_notifications_total
            .with_label_values(&[payment_status])
            .inc();
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
