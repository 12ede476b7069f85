//! Export plugins for Janus Tracer

pub mod zipkin;

pub use zipkin::{to_wire, WireSpan, ZipkinExporter, ZipkinExporterConfig, ZipkinStats};
