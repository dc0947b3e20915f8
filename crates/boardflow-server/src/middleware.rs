use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Request id carried in request extensions for downstream logging.
#[derive(Debug, Clone)]
pub struct RequestId(pub HeaderValue);

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    // Preserve an incoming request-id; otherwise generate one
    let req_id_value = match req.headers().get(&header_name) {
        Some(v) => v.clone(),
        None => match HeaderValue::from_str(&Uuid::new_v4().to_string()) {
            Ok(v) => v,
            Err(_) => HeaderValue::from_static("unknown"),
        },
    };

    req.extensions_mut().insert(RequestId(req_id_value.clone()));

    let mut res = next.run(req).await;

    res.headers_mut().insert(header_name, req_id_value);

    res
}
