//! Tracer metrics
//!
//! Up/down counters for active sessions and room participants, plus pipeline
//! counters. Rendered in Prometheus text format for scraping.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector shared between the engine, pipeline and scrape endpoint
#[derive(Debug)]
pub struct MetricsCollector {
    /// When the collector was started
    start_time: Instant,
    /// Value of the `service` label
    service_name: String,
    /// Active sessions (+1 created, -1 destroyed)
    pub sessions: AtomicI64,
    /// Active room participants (+1 joined, -1 leaving)
    pub participants: AtomicI64,
    /// Pipeline metrics
    pub pipeline: PipelineMetrics,
    /// Classified events by sub-event name
    pub classified: parking_lot::RwLock<BTreeMap<String, u64>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new("janus-tracer")
    }
}

impl MetricsCollector {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            start_time: Instant::now(),
            service_name: service_name.into(),
            sessions: AtomicI64::new(0),
            participants: AtomicI64::new(0),
            pipeline: PipelineMetrics::default(),
            classified: parking_lot::RwLock::new(BTreeMap::new()),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn session_opened(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn participant_joined(&self) {
        self.participants.fetch_add(1, Ordering::Relaxed);
    }

    pub fn participant_left(&self) {
        self.participants.fetch_sub(1, Ordering::Relaxed);
    }

    /// Count a classified event by its sub-event name
    pub fn record_classified(&self, sub_event: &str) {
        let mut classified = self.classified.write();
        *classified.entry(sub_event.to_string()).or_default() += 1;
    }

    /// Export metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        let service = &self.service_name;

        output.push_str("# HELP janus_tracer_uptime_seconds Time since tracer started\n");
        output.push_str("# TYPE janus_tracer_uptime_seconds gauge\n");
        output.push_str(&format!(
            "janus_tracer_uptime_seconds{{service=\"{}\"}} {}\n\n",
            service,
            self.uptime_seconds()
        ));

        output.push_str("# HELP janus_tracer_sessions Session Counters\n");
        output.push_str("# TYPE janus_tracer_sessions gauge\n");
        output.push_str(&format!(
            "janus_tracer_sessions{{service=\"{}\"}} {}\n\n",
            service,
            self.sessions.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP janus_tracer_events Event Counters\n");
        output.push_str("# TYPE janus_tracer_events gauge\n");
        output.push_str(&format!(
            "janus_tracer_events{{service=\"{}\"}} {}\n\n",
            service,
            self.participants.load(Ordering::Relaxed)
        ));

        let counters = [
            (
                "janus_tracer_events_received_total",
                "Total raw events received",
                &self.pipeline.events_received,
            ),
            (
                "janus_tracer_events_dropped_total",
                "Total malformed events dropped",
                &self.pipeline.events_dropped,
            ),
            (
                "janus_tracer_spans_emitted_total",
                "Total spans synthesized",
                &self.pipeline.spans_emitted,
            ),
            (
                "janus_tracer_spans_exported_total",
                "Total spans delivered to the backend",
                &self.pipeline.spans_exported,
            ),
            (
                "janus_tracer_spans_failed_total",
                "Total span deliveries that failed",
                &self.pipeline.spans_failed,
            ),
            (
                "janus_tracer_spans_discarded_total",
                "Total spans discarded because the export queue was full",
                &self.pipeline.spans_discarded,
            ),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!(
                "{}{{service=\"{}\"}} {}\n\n",
                name,
                service,
                value.load(Ordering::Relaxed)
            ));
        }

        let classified = self.classified.read();
        if !classified.is_empty() {
            output.push_str(
                "# HELP janus_tracer_events_classified_total Classified events by sub-event\n",
            );
            output.push_str("# TYPE janus_tracer_events_classified_total counter\n");
            for (event, count) in classified.iter() {
                output.push_str(&format!(
                    "janus_tracer_events_classified_total{{service=\"{}\",event=\"{}\"}} {}\n",
                    service, event, count
                ));
            }
            output.push('\n');
        }

        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        let classified = self.classified.read().clone();
        serde_json::json!({
            "service": self.service_name,
            "uptime_seconds": self.uptime_seconds(),
            "sessions": self.sessions.load(Ordering::Relaxed),
            "events": self.participants.load(Ordering::Relaxed),
            "pipeline": {
                "events_received": self.pipeline.events_received.load(Ordering::Relaxed),
                "events_dropped": self.pipeline.events_dropped.load(Ordering::Relaxed),
                "spans_emitted": self.pipeline.spans_emitted.load(Ordering::Relaxed),
                "spans_exported": self.pipeline.spans_exported.load(Ordering::Relaxed),
                "spans_failed": self.pipeline.spans_failed.load(Ordering::Relaxed),
                "spans_discarded": self.pipeline.spans_discarded.load(Ordering::Relaxed),
            },
            "classified": classified,
        })
    }
}

/// Pipeline-related metrics
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub events_received: AtomicU64,
    pub events_dropped: AtomicU64,
    pub spans_emitted: AtomicU64,
    pub spans_exported: AtomicU64,
    pub spans_failed: AtomicU64,
    pub spans_discarded: AtomicU64,
}

/// Shared metrics instance
pub type SharedMetrics = Arc<MetricsCollector>;

/// Create a new shared metrics collector
pub fn create_metrics(service_name: &str) -> SharedMetrics {
    Arc::new(MetricsCollector::new(service_name))
}
