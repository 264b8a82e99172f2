use actix_web::{dev::Payload, FromRequest, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::domain::order::{RequestContext, SYSTEM_ACTOR};

pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";
pub const USER_ID_HEADER: &str = "X-User-ID";

/// Builds the caller context from request headers. A missing or malformed
/// correlation id is replaced with a fresh one.
impl FromRequest for RequestContext {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(context_from(req)))
    }
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn context_from(req: &HttpRequest) -> RequestContext {
    let correlation_id = header(req, CORRELATION_ID_HEADER)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .unwrap_or_else(Uuid::new_v4);
    let changed_by = header(req, USER_ID_HEADER).unwrap_or(SYSTEM_ACTOR);
    RequestContext::new(correlation_id, changed_by)
}
