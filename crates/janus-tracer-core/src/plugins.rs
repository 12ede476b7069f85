//! Plugin traits for span exporters
//!
//! The engine only produces spans. Delivering them is the job of an
//! [`ExportPlugin`], so backends can be swapped without touching correlation.

use crate::trace::Span;
use async_trait::async_trait;
use std::any::Any;
use thiserror::Error;

/// Plugin error type
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Plugin operation failed: {0}")]
    OperationFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type PluginResult<T> = Result<T, PluginError>;

/// Basic plugin information
pub trait PluginInfo {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }
}

/// Base plugin trait
pub trait Plugin: PluginInfo + Send + Sync {
    /// Initialize the plugin with configuration
    fn init(&mut self, config: &PluginConfig) -> PluginResult<()> {
        let _ = config;
        Ok(())
    }

    fn shutdown(&mut self) -> PluginResult<()> {
        Ok(())
    }

    /// Get plugin as Any for downcasting
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Free-form plugin configuration
#[derive(Debug, Clone, Default)]
pub struct PluginConfig {
    pub values: std::collections::HashMap<String, serde_json::Value>,
}

impl PluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set<T: serde::Serialize>(&mut self, key: &str, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.values.insert(key.to_string(), v);
        }
    }
}

/// Export plugin - delivers spans to a trace backend.
///
/// Delivery is best effort: one attempt per span, no retry.
#[async_trait]
pub trait ExportPlugin: Plugin {
    /// Export a single span
    async fn export(&self, span: &Span) -> PluginResult<()>;

    /// Flush any buffered spans
    async fn flush(&self) -> PluginResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_config_roundtrip() {
        let mut config = PluginConfig::new();
        config.set("endpoint", "http://localhost:3100/tempo/api/push");
        config.set("timeout_ms", 2500u64);

        assert_eq!(
            config.get::<String>("endpoint").as_deref(),
            Some("http://localhost:3100/tempo/api/push")
        );
        assert_eq!(config.get::<u64>("timeout_ms"), Some(2500));
        assert_eq!(config.get::<u64>("endpoint"), None);
        assert_eq!(config.get::<bool>("missing"), None);
    }

    struct Unreachable;

    impl PluginInfo for Unreachable {
        fn name(&self) -> &str {
            "unreachable"
        }

        fn version(&self) -> &str {
            "0.0.0"
        }
    }

    impl Plugin for Unreachable {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[async_trait]
    impl ExportPlugin for Unreachable {
        async fn export(&self, span: &Span) -> PluginResult<()> {
            Err(PluginError::OperationFailed(format!(
                "no route for span {}",
                span.span_id
            )))
        }
    }

    #[test]
    fn test_default_flush_and_downcast() {
        let mut exporter = Unreachable;
        let span = Span {
            span_id: "a".to_string(),
            trace_id: "S1".to_string(),
            parent_id: None,
            name: "Session S1".to_string(),
            event: "created".to_string(),
            timestamp: 1000,
            duration: 4000,
            tags: Default::default(),
        };

        let err = tokio_test::block_on(exporter.export(&span)).unwrap_err();
        assert_eq!(err.to_string(), "Plugin operation failed: no route for span a");
        assert!(tokio_test::block_on(exporter.flush()).is_ok());
        assert!(exporter.init(&PluginConfig::new()).is_ok());
        assert!(exporter.as_any().downcast_ref::<Unreachable>().is_some());
    }

    #[test]
    fn test_error_display() {
        let err = PluginError::OperationFailed("HTTP 500".into());
        assert_eq!(err.to_string(), "Plugin operation failed: HTTP 500");
    }
}
