//! Event pipeline - orchestrates the flow from raw lines to export
//!
//! Lines are read one at a time, optionally echoed to the bypass output,
//! classified and fed to the [`TraceEngine`]. Emitted spans go onto a bounded
//! queue drained by an export worker, so a slow backend never stalls
//! ingestion. A full queue drops spans instead of applying backpressure.

use crate::engine::TraceEngine;
use crate::events::classify_line;
use crate::metrics::SharedMetrics;
use crate::plugins::{ExportPlugin, PluginError, PluginResult};
use crate::trace::Span;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Echo every raw line to the output before processing
    pub bypass: bool,

    /// Export queue capacity
    pub export_buffer: usize,

    /// Max sends in flight at once
    pub export_concurrency: usize,

    /// Log every emitted span
    pub debug: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bypass: true,
            export_buffer: 10000,
            export_concurrency: 64,
            debug: false,
        }
    }
}

/// Totals for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub lines_read: u64,
    pub events_traced: u64,
    pub events_dropped: u64,
    pub spans_emitted: u64,
    pub spans_discarded: u64,
    pub spans_exported: u64,
    pub spans_failed: u64,
}

/// The main event pipeline
pub struct Pipeline {
    config: PipelineConfig,
    engine: TraceEngine,
    exporter: Arc<dyn ExportPlugin>,
    metrics: Option<SharedMetrics>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, engine: TraceEngine, exporter: Arc<dyn ExportPlugin>) -> Self {
        Self {
            config,
            engine,
            exporter,
            metrics: None,
        }
    }

    /// Share a metrics collector with the pipeline and its engine
    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.engine.set_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn engine(&mut self) -> &mut TraceEngine {
        &mut self.engine
    }

    /// Process `input` until EOF, then wait for in-flight exports.
    ///
    /// Only I/O errors on the input or bypass output end the run; bad events
    /// and failed deliveries are counted and skipped.
    pub async fn run<R, W>(&mut self, input: R, output: &mut W) -> PluginResult<PipelineStats>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.run_until(input, output, std::future::pending()).await
    }

    /// Like [`Pipeline::run`], but stops reading once `shutdown` completes.
    ///
    /// A partially read line is discarded. Spans already queued are still
    /// exported before returning.
    pub async fn run_until<R, W, S>(
        &mut self,
        mut input: R,
        output: &mut W,
        shutdown: S,
    ) -> PluginResult<PipelineStats>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + ?Sized,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let (tx, rx) = mpsc::channel::<Span>(self.config.export_buffer.max(1));
        let worker = tokio::spawn(export_worker(
            rx,
            self.exporter.clone(),
            self.config.export_concurrency.max(1),
            self.metrics.clone(),
        ));

        info!(
            "Pipeline started (bypass: {}, exporter: {})",
            self.config.bypass,
            self.exporter.name()
        );

        let mut stats = PipelineStats::default();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = tokio::select! {
                read = input.read_until(b'\n', &mut buf) => read?,
                _ = &mut shutdown => {
                    info!("Shutdown requested, draining export queue");
                    break;
                }
            };
            if read == 0 {
                break;
            }
            stats.lines_read += 1;

            if self.config.bypass {
                output.write_all(&buf).await?;
                if buf.last() != Some(&b'\n') {
                    output.write_all(b"\n").await?;
                }
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(metrics) = &self.metrics {
                metrics
                    .pipeline
                    .events_received
                    .fetch_add(1, Ordering::Relaxed);
            }

            let event = match classify_line(line) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Dropping event: {}", e);
                    stats.events_dropped += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics
                            .pipeline
                            .events_dropped
                            .fetch_add(1, Ordering::Relaxed);
                    }
                    continue;
                }
            };
            stats.events_traced += 1;

            for span in self.engine.handle(&event) {
                stats.spans_emitted += 1;
                if let Some(metrics) = &self.metrics {
                    metrics.pipeline.spans_emitted.fetch_add(1, Ordering::Relaxed);
                }
                if self.config.debug {
                    info!(
                        "Span: {}",
                        serde_json::to_string(&span).unwrap_or_default()
                    );
                }

                match tx.try_send(span) {
                    Ok(()) => {}
                    Err(TrySendError::Full(span)) | Err(TrySendError::Closed(span)) => {
                        warn!("Export queue unavailable, dropping span {}", span.span_id);
                        stats.spans_discarded += 1;
                        if let Some(metrics) = &self.metrics {
                            metrics
                                .pipeline
                                .spans_discarded
                                .fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        }

        output.flush().await?;
        drop(tx);

        let delivered = worker
            .await
            .map_err(|e| PluginError::OperationFailed(format!("Export worker failed: {}", e)))?;
        stats.spans_exported = delivered.exported;
        stats.spans_failed = delivered.failed;

        info!(
            "Pipeline finished: {} lines, {} spans emitted, {} exported, {} failed",
            stats.lines_read, stats.spans_emitted, stats.spans_exported, stats.spans_failed
        );
        Ok(stats)
    }
}

#[derive(Debug, Default)]
struct Delivered {
    exported: u64,
    failed: u64,
}

impl Delivered {
    fn record(
        &mut self,
        result: Result<(String, PluginResult<()>), JoinError>,
        metrics: Option<&SharedMetrics>,
    ) {
        let ok = match result {
            Ok((_, Ok(()))) => true,
            Ok((span_id, Err(e))) => {
                warn!("Failed to export span {}: {}", span_id, e);
                false
            }
            Err(e) => {
                warn!("Export task failed: {}", e);
                false
            }
        };

        let counter = if ok {
            self.exported += 1;
            metrics.map(|m| &m.pipeline.spans_exported)
        } else {
            self.failed += 1;
            metrics.map(|m| &m.pipeline.spans_failed)
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Drain the export queue with at most `limit` sends in flight.
///
/// The queue is not read while the limit is reached, so a slow backend fills
/// it and the producer starts discarding.
async fn export_worker(
    mut rx: mpsc::Receiver<Span>,
    exporter: Arc<dyn ExportPlugin>,
    limit: usize,
    metrics: Option<SharedMetrics>,
) -> Delivered {
    let mut delivered = Delivered::default();
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            next = rx.recv(), if in_flight.len() < limit => match next {
                Some(span) => {
                    let exporter = exporter.clone();
                    in_flight.spawn(async move {
                        let result = exporter.export(&span).await;
                        (span.span_id, result)
                    });
                }
                None => break,
            },
            Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                delivered.record(done, metrics.as_ref());
            }
        }
    }

    while let Some(done) = in_flight.join_next().await {
        delivered.record(done, metrics.as_ref());
    }

    if let Err(e) = exporter.flush().await {
        warn!("Error flushing exporter {}: {}", exporter.name(), e);
    }

    delivered
}
