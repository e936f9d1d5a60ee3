/// Request metadata extraction
///
/// The client IP is the socket address the server accepted the connection
/// from. `X-Forwarded-For` (first hop) and `X-Real-IP` are read only when
/// `TRUST_PROXY` is enabled, since any client can set them otherwise. A
/// forwarded value that does not parse as an IP address is ignored. The IP
/// keys the public rate limits and is stored on sessions and audit entries.

use crate::app::AppState;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{header, request::Parts, Extensions, HeaderMap},
};
use leadbook_shared::models::audit_log::RequestMeta;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// Width of `sessions.ip_address` and `audit_logs.ip_address`
pub const MAX_IP_LEN: usize = 64;

/// Width of `sessions.user_agent`
const MAX_USER_AGENT_LEN: usize = 512;

/// Client IP and User-Agent of the current request
#[derive(Debug, Clone, Default)]
pub struct ClientMeta(pub RequestMeta);

impl ClientMeta {
    pub fn from_parts(headers: &HeaderMap, extensions: &Extensions, trust_proxy: bool) -> Self {
        let forwarded = if trust_proxy { forwarded_ip(headers) } else { None };

        let ip_address = forwarded
            .or_else(|| {
                extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .map(|ip| ip.to_string().chars().take(MAX_IP_LEN).collect());

        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect());

        Self(RequestMeta {
            ip_address,
            user_agent,
        })
    }

    /// Rate limit subject: the IP, or `unknown`
    pub fn subject(&self) -> &str {
        self.0.ip_address.as_deref().unwrap_or("unknown")
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header_ip = |name: &str, first_hop: bool| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| if first_hop { v.split(',').next().unwrap_or(v) } else { v })
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    header_ip("x-forwarded-for", true).or_else(|| header_ip("x-real-ip", false))
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientMeta
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let trust_proxy = AppState::from_ref(state).config.api.trust_proxy;
        Ok(Self::from_parts(&parts.headers, &parts.extensions, trust_proxy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn socket(ip: [u8; 4]) -> Extensions {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from((ip, 4000))));
        extensions
    }

    #[test]
    fn test_forwarded_for_wins_behind_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8"));

        let meta = ClientMeta::from_parts(&headers, &socket([192, 0, 2, 1]), true);
        assert_eq!(meta.0.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(meta.0.user_agent.as_deref(), Some("curl/8"));
    }

    #[test]
    fn test_spoofed_headers_ignored_without_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.8"));

        let meta = ClientMeta::from_parts(&headers, &socket([192, 0, 2, 1]), false);
        assert_eq!(meta.subject(), "192.0.2.1");
    }

    #[test]
    fn test_real_ip_used_when_forwarded_for_missing() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("2001:db8::1"));

        let meta = ClientMeta::from_parts(&headers, &Extensions::new(), true);
        assert_eq!(meta.subject(), "2001:db8::1");
    }

    #[test]
    fn test_garbage_forwarded_value_falls_back_to_socket() {
        let long = "a".repeat(200);
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_str(&long).unwrap());

        let meta = ClientMeta::from_parts(&headers, &socket([192, 0, 2, 9]), true);
        assert_eq!(meta.subject(), "192.0.2.9");
        assert!(meta.subject().len() <= MAX_IP_LEN);
    }

    #[test]
    fn test_falls_back_to_connect_info() {
        let meta = ClientMeta::from_parts(&HeaderMap::new(), &socket([192, 0, 2, 1]), true);
        assert_eq!(meta.subject(), "192.0.2.1");
    }

    #[test]
    fn test_unknown_subject() {
        let meta = ClientMeta::from_parts(&HeaderMap::new(), &Extensions::new(), false);
        assert_eq!(meta.subject(), "unknown");
    }
}
