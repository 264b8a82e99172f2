use actix::Addr;
use actix_web::{error::InternalError, web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::actors::{ComponentHealth, GetSystemHealth, HealthMonitorActor, HealthStatus, SystemHealth};
use crate::domain::order::OrderService;
use crate::metrics::metrics_handler;

// ============================================================================
// HTTP API - thin actix-web adapter over OrderService
// ============================================================================
//
//   POST   /api/v1/orders
//   GET    /api/v1/orders?customerId&status&page&size&sortDir
//   GET    /api/v1/orders/{id}
//   PUT    /api/v1/orders/{id}
//   PATCH  /api/v1/orders/{id}/status
//   DELETE /api/v1/orders/{id}
//   GET    /api/v1/orders/{id}/history
//   GET    /health
//   GET    /metrics
//
// ============================================================================

mod context;
mod dto;
mod error;
mod orders;

pub use context::{context_from, CORRELATION_ID_HEADER, USER_ID_HEADER};
pub use dto::*;
pub use error::{ApiError, ApiResult, ErrorBody};

pub struct AppState {
    pub service: Arc<OrderService>,
    pub health: Option<Addr<HealthMonitorActor>>,
}

impl AppState {
    pub fn new(service: Arc<OrderService>, health: Option<Addr<HealthMonitorActor>>) -> Self {
        Self { service, health }
    }
}

/// Registers every route. Expects `web::Data<AppState>` and
/// `web::Data<Arc<Metrics>>` in the app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, req| {
        let api = ApiError::validation(format!("Malformed request body: {}", err)).at(req.path());
        InternalError::from_response(err, actix_web::ResponseError::error_response(&api)).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, req| {
        let api = ApiError::validation(format!("Invalid query parameters: {}", err)).at(req.path());
        InternalError::from_response(err, actix_web::ResponseError::error_response(&api)).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|err, req| {
        let api = ApiError::validation(format!("Invalid order id: {}", err)).at(req.path());
        InternalError::from_response(err, actix_web::ResponseError::error_response(&api)).into()
    }))
    .route("/health", web::get().to(health))
    .route("/metrics", web::get().to(metrics_handler))
    .service(
        web::scope("/api/v1/orders")
            .route("", web::post().to(orders::create_order))
            .route("", web::get().to(orders::list_orders))
            .route("/{id}", web::get().to(orders::get_order))
            .route("/{id}", web::put().to(orders::update_order))
            .route("/{id}", web::delete().to(orders::delete_order))
            .route("/{id}/status", web::patch().to(orders::update_order_status))
            .route("/{id}/history", web::get().to(orders::order_history)),
    );
}

/// `GET /health` - 503 when any component is unhealthy.
async fn health(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let report = match state.health {
        Some(ref monitor) => match monitor.send(GetSystemHealth).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, path = %req.path(), "Health monitor unreachable");
                return HttpResponse::ServiceUnavailable().json(ComponentHealth::new(
                    "health_monitor",
                    HealthStatus::Unhealthy(e.to_string()),
                ));
            }
        },
        None => {
            // No monitor running: report the store alone.
            let status = match state.service.store().ping().await {
                Ok(()) => HealthStatus::Healthy,
                Err(e) => HealthStatus::Unhealthy(e.to_string()),
            };
            let mut components = BTreeMap::new();
            components.insert("store".to_string(), ComponentHealth::new("store", status.clone()));
            SystemHealth {
                overall_status: status,
                components,
                check_time: Utc::now(),
            }
        }
    };

    if report.overall_status.is_unhealthy() {
        HttpResponse::ServiceUnavailable().json(report)
    } else {
        HttpResponse::Ok().json(report)
    }
}
