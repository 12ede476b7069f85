//! Janus Tracer Core - Event classification, correlation and span synthesis
//!
//! This crate turns the Janus event-handler stream into distributed traces:
//!
//! - **Events**: raw Janus events classified into typed records
//! - **Store**: the session directory and pending-pair correlation caches
//! - **Engine**: per-category state machines that pair start/end events into spans
//! - **Plugins**: trait definitions for span exporters
//! - **Pipeline**: line ingestion, bypass output and the export queue

pub mod config;
pub mod engine;
pub mod events;
pub mod metrics;
pub mod pipeline;
pub mod plugins;
pub mod store;
pub mod trace;

// Re-export commonly used types
pub use config::{ConfigLoader, TracerConfig};
pub use engine::{EngineConfig, TraceEngine};
pub use events::{ClassifiedEvent, ClassifyError, EventCategory, EventKind};
pub use metrics::{create_metrics, MetricsCollector, SharedMetrics};
pub use pipeline::{Pipeline, PipelineConfig, PipelineStats};
pub use plugins::{ExportPlugin, Plugin, PluginConfig, PluginError, PluginInfo, PluginResult};
pub use store::{PendingCache, PendingSpan, SessionDirectory, SessionDirectoryEntry};
pub use trace::Span;
