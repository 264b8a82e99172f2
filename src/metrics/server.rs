use actix_web::{web, HttpResponse};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

use super::Metrics;

/// Encode every registered metric family in the Prometheus text format.
pub fn render(registry: &Registry) -> anyhow::Result<Vec<u8>> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

/// `GET /metrics`
pub async fn metrics_handler(metrics: web::Data<Arc<Metrics>>) -> HttpResponse {
    match render(metrics.registry()) {
        Ok(buffer) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}
