//! Metrics collection for the API service.
//!
//! Metrics live in a registry owned by [`ServiceMetrics`] rather than the
//! prometheus default registry, so several instances can coexist in one
//! process (tests, embedded use).

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use settlehook_core::{EventType, Subscription, SubscriptionStatus};
use std::sync::Arc;
use std::time::Duration;

/// Service metrics for observability
pub struct ServiceMetrics {
    registry: Registry,

    // HTTP request metrics
    pub http_requests_total: IntCounterVec,
    pub http_request_duration: HistogramVec,

    // Notification metrics
    pub notifications_total: IntCounterVec,
    pub deliveries_scheduled_total: IntCounter,
    pub test_deliveries_total: IntCounterVec,

    // Subscription health
    pub subscriptions: IntGaugeVec,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )?;
        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request processing time",
            )
            .buckets(vec![0.001, 0.01, 0.1, 1.0, 10.0]),
            &["method", "path"],
        )?;
        let notifications_total = IntCounterVec::new(
            Opts::new(
                "webhook_notifications_total",
                "Notifications accepted for fan-out",
            ),
            &["event_type"],
        )?;
        let deliveries_scheduled_total = IntCounter::new(
            "webhook_deliveries_scheduled_total",
            "Per-subscription delivery tasks started",
        )?;
        let test_deliveries_total = IntCounterVec::new(
            Opts::new(
                "webhook_test_deliveries_total",
                "Operator test deliveries by result",
            ),
            &["result"],
        )?;
        let subscriptions = IntGaugeVec::new(
            Opts::new("webhook_subscriptions", "Registered subscriptions by status"),
            &["status"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(notifications_total.clone()))?;
        registry.register(Box::new(deliveries_scheduled_total.clone()))?;
        registry.register(Box::new(test_deliveries_total.clone()))?;
        registry.register(Box::new(subscriptions.clone()))?;

        Ok(Arc::new(Self {
            registry,
            http_requests_total,
            http_request_duration,
            notifications_total,
            deliveries_scheduled_total,
            test_deliveries_total,
            subscriptions,
        }))
    }

    /// Record HTTP request metrics
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration: Duration) {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status.as_str()])
            .inc();
        self.http_request_duration
            .with_label_values(&[method, path])
            .observe(duration.as_secs_f64());
    }

    /// Record an accepted notification and its fan-out size
    pub fn record_notification(&self, event_type: EventType, recipients: usize) {
        self.notifications_total
            .with_label_values(&[event_type.as_str()])
            .inc();
        self.deliveries_scheduled_total.inc_by(recipients as u64);
    }

    pub fn record_test_delivery(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.test_deliveries_total.with_label_values(&[result]).inc();
    }

    /// Refresh the per-status subscription gauge from a registry snapshot
    pub fn set_subscription_counts(&self, subscriptions: &[Subscription]) {
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::Inactive,
            SubscriptionStatus::Failed,
        ] {
            let count = subscriptions.iter().filter(|s| s.status == status).count();
            self.subscriptions
                .with_label_values(&[status.as_str()])
                .set(count as i64);
        }
    }

    /// Prometheus text exposition of every metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}
