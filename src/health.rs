use crate::registry::ConnectionRegistry;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(
    state: web::Data<AppState>,
    registry: web::Data<ConnectionRegistry>,
) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "voice-relay-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "pipeline": {
            "active_sessions": metrics.active_sessions,
            "sessions_started": metrics.sessions_started,
            "sessions_completed": metrics.sessions_completed,
            "chunks_received": metrics.chunks_received,
            "bytes_received": metrics.bytes_received,
            "transcript_events": metrics.transcript_events,
            "recognizer_configured": !config.recognizer.api_key.is_empty()
        },
        "echo_connections": registry.len()
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "error_rate": metric.error_rate(),
            "average_duration_ms": metric.average_duration_ms(),
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            }
        },
        "pipeline": {
            "active_sessions": metrics.active_sessions,
            "sessions_started": metrics.sessions_started,
            "sessions_completed": metrics.sessions_completed,
            "chunks_received": metrics.chunks_received,
            "bytes_received": metrics.bytes_received,
            "transcript_events": metrics.transcript_events
        },
        "endpoints": endpoint_stats
    }))
}
