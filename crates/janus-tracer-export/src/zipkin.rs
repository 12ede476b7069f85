//! Zipkin exporter
//!
//! Sends spans as Zipkin v2 JSON (`[{"id", "traceId", ...}]`) to a
//! Zipkin-compatible endpoint such as Tempo's `/api/push`. One POST per span,
//! no batching and no retry.

use async_trait::async_trait;
use janus_tracer_core::plugins::{
    ExportPlugin, Plugin, PluginConfig, PluginError, PluginInfo, PluginResult,
};
use janus_tracer_core::trace::{expand_timestamp, Span};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use reqwest::{Client, StatusCode};

/// Default Tempo push endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3100/tempo/api/push";

/// Zipkin exporter configuration
#[derive(Debug, Clone)]
pub struct ZipkinExporterConfig {
    /// Backend URL; `None` only logs spans
    pub endpoint: Option<String>,

    /// Request timeout
    pub timeout: Duration,

    /// Accept gzip-compressed responses
    pub compression: bool,

    /// User-Agent header
    pub user_agent: String,

    /// Log every payload and response status at info
    pub debug: bool,
}

impl Default for ZipkinExporterConfig {
    fn default() -> Self {
        Self {
            endpoint: Some(DEFAULT_ENDPOINT.to_string()),
            timeout: Duration::from_secs(10),
            compression: true,
            user_agent: format!("janus-tracer/{}", env!("CARGO_PKG_VERSION")),
            debug: false,
        }
    }
}

/// Zipkin v2 span as sent on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSpan {
    pub id: String,
    pub trace_id: String,
    pub timestamp: u64,
    pub duration: u64,

    /// Sub-event name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    pub local_endpoint: LocalEndpoint,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalEndpoint {
    /// The span's human readable name, which is what trace UIs group by
    pub service_name: String,
}

/// Wire payload for one span: a single-element array
pub fn to_wire(span: &Span) -> Vec<WireSpan> {
    let tags = if span.tags.is_empty() {
        BTreeMap::from([("event".to_string(), span.event.clone())])
    } else {
        span.tags.clone()
    };

    vec![WireSpan {
        id: span.span_id.clone(),
        trace_id: span.trace_id.clone(),
        timestamp: expand_timestamp(span.timestamp),
        duration: span.duration,
        name: span.event.clone(),
        parent_id: span.parent_id.clone(),
        local_endpoint: LocalEndpoint {
            service_name: span.name.clone(),
        },
        tags,
    }]
}

/// Zipkin exporter for sending spans to a trace backend
pub struct ZipkinExporter {
    config: ZipkinExporterConfig,
    client: Option<Client>,
    spans_exported: AtomicU64,
    spans_logged: AtomicU64,
    errors: AtomicU64,
}

impl ZipkinExporter {
    pub fn new(config: ZipkinExporterConfig) -> Self {
        Self {
            config,
            client: None,
            spans_exported: AtomicU64::new(0),
            spans_logged: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Create an exporter with its HTTP client ready
    pub fn connect(config: ZipkinExporterConfig) -> PluginResult<Self> {
        let mut exporter = Self::new(config);
        exporter.init_client()?;
        Ok(exporter)
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.config.endpoint.as_deref()
    }

    fn init_client(&mut self) -> PluginResult<()> {
        let client = Client::builder()
            .timeout(self.config.timeout)
            .user_agent(&self.config.user_agent)
            .gzip(self.config.compression)
            .build()
            .map_err(|e| {
                PluginError::InitializationFailed(format!("Failed to create HTTP client: {}", e))
            })?;

        self.client = Some(client);
        Ok(())
    }

    async fn send_request(&self, endpoint: &str, payload: String) -> Result<StatusCode, ZipkinError> {
        let client = self.client.as_ref().ok_or(ZipkinError::NotInitialized)?;

        let response = client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await
            .map_err(ZipkinError::Network)?;

        let status = response.status();
        if status.is_success() {
            Ok(status)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ZipkinError::Status { status, body })
        }
    }

    /// Get export statistics
    pub fn stats(&self) -> ZipkinStats {
        ZipkinStats {
            spans_exported: self.spans_exported.load(Ordering::Relaxed),
            spans_logged: self.spans_logged.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Zipkin export statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZipkinStats {
    pub spans_exported: u64,

    /// Spans only logged because no endpoint is configured
    pub spans_logged: u64,

    pub errors: u64,
}

#[derive(Debug)]
enum ZipkinError {
    NotInitialized,
    Network(reqwest::Error),
    Status { status: StatusCode, body: String },
}

impl std::fmt::Display for ZipkinError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZipkinError::NotInitialized => write!(f, "HTTP client not initialized"),
            ZipkinError::Network(e) => write!(f, "Network error: {}", e),
            ZipkinError::Status { status, body } => {
                write!(f, "Backend responded {}: {}", status, body)
            }
        }
    }
}

impl std::error::Error for ZipkinError {}

impl PluginInfo for ZipkinExporter {
    fn name(&self) -> &str {
        "zipkin-exporter"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Exports spans as Zipkin v2 JSON over HTTP"
    }
}

impl Plugin for ZipkinExporter {
    fn init(&mut self, config: &PluginConfig) -> PluginResult<()> {
        if let Some(endpoint) = config.get::<String>("endpoint") {
            let endpoint = endpoint.trim();
            self.config.endpoint = (!endpoint.is_empty()).then(|| endpoint.to_string());
        }
        if let Some(timeout_ms) = config.get::<u64>("timeout_ms") {
            self.config.timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(debug) = config.get::<bool>("debug") {
            self.config.debug = debug;
        }
        if let Some(user_agent) = config.get::<String>("user_agent") {
            self.config.user_agent = user_agent;
        }

        self.init_client()?;

        info!(
            "Zipkin exporter initialized: endpoint={}",
            self.config.endpoint.as_deref().unwrap_or("<none, logging only>")
        );
        Ok(())
    }

    fn shutdown(&mut self) -> PluginResult<()> {
        self.client = None;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[async_trait]
impl ExportPlugin for ZipkinExporter {
    async fn export(&self, span: &Span) -> PluginResult<()> {
        let payload = serde_json::to_string(&to_wire(span))?;

        let Some(endpoint) = self.config.endpoint.as_deref() else {
            if self.config.debug {
                info!("Span (not sent): {}", payload);
            } else {
                debug!("Span (not sent): {}", payload);
            }
            self.spans_logged.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        if self.config.debug {
            info!("Sending span: {}", payload);
        }

        match self.send_request(endpoint, payload).await {
            Ok(status) => {
                self.spans_exported.fetch_add(1, Ordering::Relaxed);
                if self.config.debug {
                    info!("Span {} accepted: {}", span.span_id, status);
                }
                Ok(())
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                Err(PluginError::OperationFailed(format!(
                    "Span delivery to {} failed: {}",
                    endpoint, e
                )))
            }
        }
    }
}
