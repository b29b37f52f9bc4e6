//! Streaming reverse proxy to the backend services.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{self, HeaderName};
use axum::http::{HeaderMap, HeaderValue, Uri};
use axum::response::Response;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use crate::error::GatewayError;
use crate::rate_limit::X_FORWARDED_FOR;
use crate::routes::ServiceRoute;

/// HTTP/1 client shared by the proxy and the health prober.
pub type HttpClient = Client<HttpConnector, Body>;

/// Builds the shared backend client.
#[must_use]
pub fn build_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// Removes connection-scoped headers before a message crosses the proxy.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in [
        header::CONNECTION,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ] {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Forwards requests to a backend and streams the answer back.
#[derive(Debug, Clone)]
pub struct Proxy {
    client: HttpClient,
    timeout: Option<Duration>,
}

impl Proxy {
    #[must_use]
    pub fn new(client: HttpClient, timeout: Option<Duration>) -> Self {
        Self { client, timeout }
    }

    #[must_use]
    pub const fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Sends `request` to `route`'s backend.
    ///
    /// Method, path, query, body and end-to-end headers are preserved. The
    /// `Host` header is rewritten for the backend and `X-Forwarded-For` is
    /// set to the observed peer address. The response status, headers and
    /// body are returned unmodified apart from hop-by-hop headers. The
    /// timeout, when set, bounds the wait for response headers; the body is
    /// streamed without a deadline.
    pub async fn forward(
        &self,
        route: &ServiceRoute,
        request: Request,
        remote: Option<SocketAddr>,
    ) -> Result<Response, GatewayError> {
        let (mut parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path(), |pq| pq.as_str());
        let target = format!("{}{path_and_query}", route.upstream);
        parts.uri = target.parse::<Uri>().map_err(|e| {
            GatewayError::Internal(format!("invalid upstream URI {target}: {e}"))
        })?;

        strip_hop_by_hop(&mut parts.headers);
        parts.headers.remove(header::HOST);
        if let Some(value) =
            remote.and_then(|addr| HeaderValue::from_str(&addr.ip().to_string()).ok())
        {
            parts.headers.insert(X_FORWARDED_FOR, value);
        }

        let upstream = self.client.request(Request::from_parts(parts, body));
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, upstream).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(unavailable(route, format!("no response within {limit:?}")));
                },
            },
            None => upstream.await,
        };
        let response = result.map_err(|e| unavailable(route, e.to_string()))?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

fn unavailable(route: &ServiceRoute, reason: String) -> GatewayError {
    tracing::warn!(service = route.name, upstream = %route.upstream, %reason, "backend unavailable");
    GatewayError::Unavailable {
        service: route.name.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-secret-hop"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-secret-hop", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        headers.insert("x-user-id", HeaderValue::from_static("spoof"));

        strip_hop_by_hop(&mut headers);

        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get("x-secret-hop").is_none());
        assert!(headers.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(headers[header::AUTHORIZATION], "Bearer t");
        // Identity headers pass through; backends overwrite them.
        assert_eq!(headers["x-user-id"], "spoof");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let proxy = Proxy::new(build_client(), Some(Duration::from_secs(5)));
        let route = ServiceRoute {
            name: "patient",
            prefix: "/api/patients",
            upstream: format!("http://{addr}"),
        };
        let request = axum::http::Request::builder()
            .uri("/api/patients/profile")
            .body(Body::empty())
            .unwrap();

        let err = proxy.forward(&route, request, None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable { ref service, .. } if service == "patient"));
    }
}
