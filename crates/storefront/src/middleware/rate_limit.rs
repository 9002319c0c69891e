//! Rate limiting middleware using governor and `tower_governor`.
//!
//! - `auth_rate_limiter`: signup and login, ~10/min per IP
//! - `api_rate_limiter`: everything else under `/api`, ~100/min per IP
//!
//! Clients are keyed by the socket peer address. Proxy headers such as
//! `X-Forwarded-For` are only read when `STOREFRONT_TRUST_PROXY_HEADERS` is
//! set, which is only safe behind a proxy that overwrites them.
//!
//! Throttled requests get the usual `{"message": ...}` error body.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

use crate::error::AppError;

/// Proxy headers carrying a single client IP, in order of trust.
const SINGLE_IP_HEADERS: &[&str] = &["cf-connecting-ip", "x-real-ip", "fly-client-ip"];

/// Key extractor for the client IP.
///
/// With `trust_proxy_headers`, looks at proxy headers first, then the first
/// hop of `X-Forwarded-For`. Otherwise, and as a fallback, uses the socket
/// peer address when the server was started with connect info.
#[derive(Clone, Copy)]
pub struct ClientIpKeyExtractor {
    pub trust_proxy_headers: bool,
}

fn header_ip<T>(req: &Request<T>, name: &str) -> Option<IpAddr> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let from_proxy = if self.trust_proxy_headers {
            SINGLE_IP_HEADERS
                .iter()
                .chain(std::iter::once(&"x-forwarded-for"))
                .find_map(|name| header_ip(req, name))
        } else {
            None
        };

        from_proxy
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Render limiter rejections as [`AppError`] responses.
fn error_response(err: GovernorError) -> Response<axum::body::Body> {
    match err {
        GovernorError::TooManyRequests { wait_time, headers } => {
            tracing::debug!(wait_time, "Rate limit exceeded");
            let mut response = AppError::RateLimited.into_response();
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
        GovernorError::UnableToExtractKey => {
            AppError::Internal("unable to determine client address".to_string()).into_response()
        }
        other @ GovernorError::Other { .. } => Response::from(other),
    }
}

/// Build a limiter replenishing one token every `period_secs`, with `burst` tokens.
///
/// # Panics
///
/// Panics if `period_secs` or `burst` is zero. Callers in this module pass
/// fixed positive values.
fn limiter(period_secs: u64, burst: u32, trust_proxy_headers: bool) -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor {
            trust_proxy_headers,
        })
        .per_second(period_secs)
        .burst_size(burst)
        .finish()
        .expect("rate limiter period and burst are positive");
    GovernorLayer::new(Arc::new(config)).error_handler(error_response)
}

/// Create rate limiter for auth endpoints: ~10 requests per minute per IP.
///
/// One token every 6 seconds, burst of 5.
#[must_use]
pub fn auth_rate_limiter(trust_proxy_headers: bool) -> RateLimiterLayer {
    limiter(6, 5, trust_proxy_headers)
}

/// Create rate limiter for general API: ~100 requests per minute per IP.
///
/// One token per second, burst of 50.
#[must_use]
pub fn api_rate_limiter(trust_proxy_headers: bool) -> RateLimiterLayer {
    limiter(1, 50, trust_proxy_headers)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tower_governor::key_extractor::KeyExtractor;

    use super::*;

    const BEHIND_PROXY: ClientIpKeyExtractor = ClientIpKeyExtractor {
        trust_proxy_headers: true,
    };
    const DIRECT: ClientIpKeyExtractor = ClientIpKeyExtractor {
        trust_proxy_headers: false,
    };

    fn request(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri("/api/cart/get");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn prefers_cloudflare_header() {
        let req = request(&[
            ("x-forwarded-for", "10.0.0.1, 10.0.0.2"),
            ("cf-connecting-ip", "203.0.113.7"),
        ]);
        let ip = BEHIND_PROXY.extract(&req).unwrap();
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn uses_first_forwarded_hop() {
        let req = request(&[("x-forwarded-for", "198.51.100.4, 10.0.0.2")]);
        let ip = BEHIND_PROXY.extract(&req).unwrap();
        assert_eq!(ip, "198.51.100.4".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn falls_back_to_peer_address() {
        let mut req = request(&[]);
        req.extensions_mut()
            .insert(ConnectInfo("192.0.2.9:5000".parse::<SocketAddr>().unwrap()));
        let ip = BEHIND_PROXY.extract(&req).unwrap();
        assert_eq!(ip, "192.0.2.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn ignores_proxy_headers_unless_trusted() {
        let mut req = request(&[("x-forwarded-for", "198.51.100.4")]);
        req.extensions_mut()
            .insert(ConnectInfo("192.0.2.9:5000".parse::<SocketAddr>().unwrap()));
        let ip = DIRECT.extract(&req).unwrap();
        assert_eq!(ip, "192.0.2.9".parse::<IpAddr>().unwrap());

        let spoofed_only = request(&[("x-real-ip", "198.51.100.4")]);
        assert!(DIRECT.extract(&spoofed_only).is_err());
    }

    #[test]
    fn fails_without_any_source() {
        assert!(BEHIND_PROXY.extract(&request(&[])).is_err());
    }

    #[tokio::test]
    async fn throttled_response_is_json_message() {
        let response = error_response(GovernorError::TooManyRequests {
            wait_time: 6,
            headers: None,
        });
        assert_eq!(response.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "message": "Too many requests" }));
    }
}
