/// Security headers middleware
///
/// Adds security-related HTTP headers to every response, following OWASP
/// recommendations.
///
/// # Headers Applied
///
/// - `X-Content-Type-Options: nosniff`
/// - `X-Frame-Options: DENY`
/// - `Referrer-Policy: strict-origin-when-cross-origin`
/// - `Permissions-Policy`
/// - `Content-Security-Policy` with the map tile host allowed in `img-src`
/// - `Strict-Transport-Security` (production only)
///
/// # Example
///
/// ```no_run
/// use axum::Router;
/// use leadbook_api::middleware::security::SecurityHeadersLayer;
///
/// let app: Router = Router::new()
///     .layer(SecurityHeadersLayer::new(true, "https://tile.openstreetmap.org"));
/// ```

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    response::Response,
};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Security headers middleware layer
#[derive(Clone)]
pub struct SecurityHeadersLayer {
    headers: Vec<(HeaderName, HeaderValue)>,
}

/// Content Security Policy allowing images from `tile_host`
///
/// A host that is not a valid header value is left out of the policy.
pub fn content_security_policy(tile_host: &str) -> String {
    let tile_host = tile_host.trim().trim_end_matches('/');
    let img_src = if tile_host.is_empty() || HeaderValue::from_str(tile_host).is_err() {
        "'self' data:".to_string()
    } else {
        format!("'self' data: {}", tile_host)
    };

    format!(
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; \
         img-src {}; font-src 'self'; connect-src 'self'; frame-ancestors 'none'",
        img_src
    )
}

impl SecurityHeadersLayer {
    /// Creates the layer
    ///
    /// # Arguments
    ///
    /// * `enable_hsts` - Send HSTS (production behind HTTPS)
    /// * `tile_host` - Map tile origin, e.g. `https://tile.openstreetmap.org`
    pub fn new(enable_hsts: bool, tile_host: &str) -> Self {
        let mut headers = vec![
            (
                HeaderName::from_static("x-content-type-options"),
                HeaderValue::from_static("nosniff"),
            ),
            (
                HeaderName::from_static("x-frame-options"),
                HeaderValue::from_static("DENY"),
            ),
            (
                HeaderName::from_static("referrer-policy"),
                HeaderValue::from_static("strict-origin-when-cross-origin"),
            ),
            (
                HeaderName::from_static("permissions-policy"),
                HeaderValue::from_static("geolocation=(), microphone=(), camera=(), payment=(), usb=()"),
            ),
        ];

        if let Ok(csp) = HeaderValue::from_str(&content_security_policy(tile_host)) {
            headers.push((HeaderName::from_static("content-security-policy"), csp));
        }

        if enable_hsts {
            headers.push((
                HeaderName::from_static("strict-transport-security"),
                HeaderValue::from_static("max-age=31536000; includeSubDomains; preload"),
            ));
        }

        Self { headers }
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeadersMiddleware {
            inner,
            headers: self.headers.clone(),
        }
    }
}

/// Security headers middleware service
#[derive(Clone)]
pub struct SecurityHeadersMiddleware<S> {
    inner: S,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl<S> Service<Request> for SecurityHeadersMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let future = self.inner.call(request);
        let headers = self.headers.clone();

        Box::pin(async move {
            let mut response = future.await?;

            let response_headers = response.headers_mut();
            for (name, value) in headers {
                response_headers.insert(name, value);
            }

            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, response::IntoResponse, routing::get, Router};
    use tower::Service as _;

    async fn handler() -> impl IntoResponse {
        (StatusCode::OK, "test")
    }

    async fn headers_for(layer: SecurityHeadersLayer) -> axum::http::HeaderMap {
        let mut app = Router::new().route("/test", get(handler)).layer(layer);

        let response = app
            .call(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        response.headers().clone()
    }

    #[tokio::test]
    async fn test_security_headers_applied() {
        let headers = headers_for(SecurityHeadersLayer::new(false, "https://tile.openstreetmap.org")).await;

        assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
        assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
        assert_eq!(
            headers.get("Referrer-Policy").unwrap(),
            "strict-origin-when-cross-origin"
        );
        assert!(headers.get("Permissions-Policy").is_some());

        let csp = headers.get("Content-Security-Policy").unwrap().to_str().unwrap();
        assert!(csp.contains("img-src 'self' data: https://tile.openstreetmap.org;"));
    }

    #[tokio::test]
    async fn test_hsts_enabled_in_production() {
        let headers = headers_for(SecurityHeadersLayer::new(true, "")).await;
        assert!(headers.get("Strict-Transport-Security").is_some());
    }

    #[tokio::test]
    async fn test_hsts_disabled_in_dev() {
        let headers = headers_for(SecurityHeadersLayer::new(false, "")).await;
        assert!(headers.get("Strict-Transport-Security").is_none());
    }

    #[test]
    fn test_csp_without_tile_host() {
        let csp = content_security_policy("  ");
        assert!(csp.contains("img-src 'self' data:;"));
    }

    #[test]
    fn test_csp_trims_trailing_slash() {
        let csp = content_security_policy("https://tiles.example.com/");
        assert!(csp.contains("data: https://tiles.example.com;"));
    }
}
