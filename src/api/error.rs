use actix_web::{http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;

use crate::domain::order::{ErrorKind, OrderError};

// ============================================================================
// HTTP error mapping
// ============================================================================

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub error: &'static str,
    pub message: String,
    pub path: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    path: String,
    details: Map<String, Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            path: String::new(),
            details: Map::new(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Maps a domain failure raised while serving `req`.
    pub fn from_order(err: OrderError, req: &HttpRequest) -> Self {
        ApiError::from(err).at(req.path())
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            timestamp: Utc::now(),
            status: self.status.as_u16(),
            error: self.status.canonical_reason().unwrap_or("Error"),
            message: self.message.clone(),
            path: self.path.clone(),
            details: self.details.clone(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidOrderState | ErrorKind::InsufficientStock | ErrorKind::Validation => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        let status = status_for(err.kind());
        let details = match &err {
            OrderError::InvalidTransition { current, target } => {
                json!({ "currentStatus": current, "targetStatus": target })
            }
            OrderError::NotModifiable { current } => json!({ "currentStatus": current }),
            OrderError::InsufficientStock {
                product_id,
                requested,
                available,
            } => json!({
                "productId": product_id,
                "requestedQuantity": requested,
                "availableStock": available,
            }),
            _ => json!({}),
        };

        // Persistence details stay in the logs.
        let message = if status.is_server_error() {
            tracing::error!(error = %err, "Request failed with internal error");
            "Internal server error".to_string()
        } else {
            err.to_string()
        };

        let mut api = ApiError::new(status, message);
        if let Value::Object(map) = details {
            api.details = map;
        }
        api
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status).json(self.body())
    }
}
