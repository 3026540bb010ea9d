//! Rate limiting middleware for axum.
//!
//! Resolves the client identity from the request (authenticated user >
//! session > API-key prefix > forwarded IP > socket address), enforces
//! admission through the [`RateLimiter`], and decorates responses with the
//! rate-limit headers.
//!
//! Rejections map to `429 Too Many Requests` with `Retry-After: 60`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::application::rate_limiter::{resolve_client_id, RateLimiter};

/// Shared middleware state.
pub type RateLimiterState = Arc<RateLimiter>;

/// Identity extension the outer auth layer may attach to requests.
#[derive(Debug, Clone, Default)]
pub struct RequestIdentity {
    pub user_id: Option<i64>,
    pub session_id: Option<String>,
}

/// Rate-limit header names.
pub mod headers {
    use super::HeaderName;

    pub static X_RATELIMIT_LIMIT_MINUTE: HeaderName =
        HeaderName::from_static("x-ratelimit-limit-minute");
    pub static X_RATELIMIT_LIMIT_HOUR: HeaderName =
        HeaderName::from_static("x-ratelimit-limit-hour");
    pub static X_RATELIMIT_REMAINING_MINUTE: HeaderName =
        HeaderName::from_static("x-ratelimit-remaining-minute");
    pub static X_RATELIMIT_REMAINING_HOUR: HeaderName =
        HeaderName::from_static("x-ratelimit-remaining-hour");
    pub static RETRY_AFTER: HeaderName = HeaderName::from_static("retry-after");
}

/// Admission middleware. Attach with `middleware::from_fn_with_state`.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiterState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let client_id = client_id_for(&request, connect_info.as_ref());

    let (allowed, reason) = limiter.is_allowed(&client_id).await;
    if !allowed {
        tracing::warn!(client = %client_id, reason = %reason, "rate limit exceeded");
        let mut response =
            (StatusCode::TOO_MANY_REQUESTS, Json(serde_json::json!({ "detail": reason })))
                .into_response();
        response
            .headers_mut()
            .insert(headers::RETRY_AFTER.clone(), HeaderValue::from_static("60"));
        return response;
    }

    let mut response = next.run(request).await;

    let stats = limiter.stats(&client_id).await;
    let headers = response.headers_mut();
    let set = |headers: &mut axum::http::HeaderMap, name: &HeaderName, value: u32| {
        if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
            headers.insert(name.clone(), value);
        }
    };
    set(headers, &headers::X_RATELIMIT_LIMIT_MINUTE, stats.limit_per_minute);
    set(headers, &headers::X_RATELIMIT_LIMIT_HOUR, stats.limit_per_hour);
    set(
        headers,
        &headers::X_RATELIMIT_REMAINING_MINUTE,
        stats.limit_per_minute.saturating_sub(stats.requests_last_minute),
    );
    set(
        headers,
        &headers::X_RATELIMIT_REMAINING_HOUR,
        stats.limit_per_hour.saturating_sub(stats.requests_last_hour),
    );

    response
}

fn client_id_for(request: &Request, connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    let identity = request.extensions().get::<RequestIdentity>();
    let user_id = identity.and_then(|i| i.user_id);
    let session_id = identity.and_then(|i| i.session_id.as_deref());

    let api_key = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());
    let forwarded_for = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    let remote = connect_info.map(|info| info.0.ip().to_string());

    resolve_client_id(user_id, session_id, api_key, forwarded_for, remote.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request() -> Request {
        Request::builder().uri("/query").body(Body::empty()).unwrap()
    }

    #[test]
    fn identity_extension_wins_over_headers() {
        let mut request = request();
        request.extensions_mut().insert(RequestIdentity {
            user_id: Some(7),
            session_id: None,
        });
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4"));
        assert_eq!(client_id_for(&request, None), "user:7");
    }

    #[test]
    fn forwarded_header_takes_first_entry() {
        let mut request = request();
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("9.8.7.6, 10.0.0.1"));
        assert_eq!(client_id_for(&request, None), "ip:9.8.7.6");
    }

    #[test]
    fn api_key_uses_a_privacy_prefix() {
        let mut request = request();
        request.headers_mut().insert(
            "x-api-key",
            HeaderValue::from_static("sk-live-abcdefghijklmnop"),
        );
        assert_eq!(client_id_for(&request, None), "apikey:sk-live-abcdefgh");
    }

    #[test]
    fn socket_address_is_the_last_resort() {
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let info = ConnectInfo(addr);
        assert_eq!(client_id_for(&request(), Some(&info)), "ip:127.0.0.1");
    }
}
