use actix_web::{http::header::LOCATION, web, HttpRequest, HttpResponse};
use uuid::Uuid;

use super::dto::{
    CreateOrderRequest, ListOrdersParams, OrderAuditResponse, OrderResponse, UpdateOrderRequest,
    UpdateOrderStatusRequest,
};
use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::domain::order::{OrderStatus, RequestContext};

// ============================================================================
// /api/v1/orders handlers
// ============================================================================

/// `POST /api/v1/orders`
pub async fn create_order(
    state: web::Data<AppState>,
    ctx: RequestContext,
    req: HttpRequest,
    body: web::Json<CreateOrderRequest>,
) -> ApiResult<HttpResponse> {
    let (customer_id, lines) = body.into_inner().into_parts().map_err(|e| e.at(req.path()))?;
    let order = state
        .service
        .create_order(&ctx, customer_id, &lines)
        .await
        .map_err(|e| ApiError::from_order(e, &req))?;

    Ok(HttpResponse::Created()
        .insert_header((LOCATION, format!("{}/{}", req.path().trim_end_matches('/'), order.id)))
        .json(OrderResponse::from(order)))
}

/// `GET /api/v1/orders`
pub async fn list_orders(
    state: web::Data<AppState>,
    req: HttpRequest,
    params: web::Query<ListOrdersParams>,
) -> ApiResult<HttpResponse> {
    let query = params.into_inner().into_query().map_err(|e| e.at(req.path()))?;
    let page = state
        .service
        .list_orders(&query)
        .await
        .map_err(|e| ApiError::from_order(e, &req))?;

    Ok(HttpResponse::Ok().json(page.map(OrderResponse::from)))
}

/// `GET /api/v1/orders/{id}`
pub async fn get_order(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let order = state
        .service
        .get_order(path.into_inner())
        .await
        .map_err(|e| ApiError::from_order(e, &req))?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// `PUT /api/v1/orders/{id}`
pub async fn update_order(
    state: web::Data<AppState>,
    ctx: RequestContext,
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Json<UpdateOrderRequest>,
) -> ApiResult<HttpResponse> {
    let lines = body.into_inner().into_lines().map_err(|e| e.at(req.path()))?;
    let order = state
        .service
        .update_order(&ctx, path.into_inner(), &lines)
        .await
        .map_err(|e| ApiError::from_order(e, &req))?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// `PATCH /api/v1/orders/{id}/status`
pub async fn update_order_status(
    state: web::Data<AppState>,
    ctx: RequestContext,
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Json<UpdateOrderStatusRequest>,
) -> ApiResult<HttpResponse> {
    let order_id = path.into_inner();
    let target = body.target().map_err(|e| e.at(req.path()))?;

    let result = if target == OrderStatus::Cancelled {
        state
            .service
            .cancel_order(&ctx, order_id, body.reason.as_deref())
            .await
    } else {
        state.service.update_order_status(&ctx, order_id, target).await
    };

    let order = result.map_err(|e| ApiError::from_order(e, &req))?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// `DELETE /api/v1/orders/{id}`
pub async fn delete_order(
    state: web::Data<AppState>,
    ctx: RequestContext,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    state
        .service
        .delete_order(&ctx, path.into_inner())
        .await
        .map_err(|e| ApiError::from_order(e, &req))?;
    Ok(HttpResponse::NoContent().finish())
}

/// `GET /api/v1/orders/{id}/history`
pub async fn order_history(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let history = state
        .service
        .get_order_history(path.into_inner())
        .await
        .map_err(|e| ApiError::from_order(e, &req))?;

    let body: Vec<OrderAuditResponse> = history.into_iter().map(OrderAuditResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}
