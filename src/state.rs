//! # Application State Management
//!
//! Shared state accessed by HTTP handlers and WebSocket actors: the live
//! configuration, pipeline counters, and the server start time.
//!
//! Everything mutable sits behind `Arc<RwLock<_>>` so that request handlers
//! take short read locks and the counters take short write locks. Snapshots
//! are cloned out so no lock is held while a response is serialized.

use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The state shared across all HTTP request handlers and connection actors.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<RwLock<AppConfig>>,

    /// Pipeline and HTTP counters
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Counters collected across the lifetime of the process.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of HTTP errors since server start
    pub error_count: u64,

    /// Current number of open audio-streaming connections
    pub active_sessions: u32,

    /// Recording sessions accepted since server start
    pub sessions_started: u64,

    /// Recording sessions that ran their shutdown sequence to completion
    pub sessions_completed: u64,

    /// Binary audio chunks received across all sessions
    pub chunks_received: u64,

    /// Raw audio bytes received across all sessions
    pub bytes_received: u64,

    /// Transcript events relayed to clients
    pub transcript_events: u64,

    /// Detailed metrics for each HTTP endpoint, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Per-endpoint request statistics.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the read lock immediately; `AppConfig` is cheap to
    /// clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Called by the telemetry middleware for every request.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
        if is_error {
            metrics.error_count += 1;
        }

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// A streaming connection was accepted.
    pub fn session_started(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_sessions += 1;
        metrics.sessions_started += 1;
    }

    /// A streaming connection went away (whatever the cause).
    pub fn session_ended(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
    }

    /// Fold one completed session's totals into the process counters.
    pub fn record_session_totals(&self, chunks: u64, bytes: u64) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.sessions_completed += 1;
        metrics.chunks_received += chunks;
        metrics.bytes_received += bytes;
    }

    /// A transcript event reached a client's send path.
    pub fn record_transcript_event(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.transcript_events += 1;
    }

    /// Consistent copy of the counters for the health/metrics endpoints.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
