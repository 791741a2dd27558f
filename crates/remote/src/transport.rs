use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use std::sync::Arc;

pub type TransportHandle = Arc<dyn HttpTransport>;

/// A completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}
impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal HTTP GET client.
///
/// Implementations must be safe to call concurrently; cancellation happens by
/// dropping the returned future.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// [`HttpTransport`] on a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}
impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tsundoku/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Transport)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client.get(url).send().await.or_raise(|| ErrorKind::Transport)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.or_raise(|| ErrorKind::Transport)?;
        Ok(HttpResponse { status, body: body.to_vec() })
    }
}

#[cfg(any(test, feature = "mock"))]
pub use self::mock::{MockRoute, MockTransport};

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::{HttpResponse, HttpTransport};
    use crate::error::{ErrorKind, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// How the mock answers one URL.
    #[derive(Debug, Clone)]
    pub enum MockRoute {
        Respond { status: u16, body: Vec<u8> },
        /// Never completes; only a timeout gets the caller out.
        Hang,
        /// Fails below the HTTP layer.
        Fail,
    }

    /// In-memory transport for tests. Unrouted URLs answer `404`.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        routes: Mutex<HashMap<String, MockRoute>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn route(self, url: impl Into<String>, route: MockRoute) -> Self {
            self.set_route(url, route);
            self
        }

        pub fn json(self, url: impl Into<String>, body: &serde_json::Value) -> Self {
            let body = serde_json::to_vec(body).unwrap_or_default();
            self.route(url, MockRoute::Respond { status: 200, body })
        }

        pub fn set_route(&self, url: impl Into<String>, route: MockRoute) {
            self.routes.lock().unwrap_or_else(|e| e.into_inner()).insert(url.into(), route);
        }

        /// Every requested URL, in request order.
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn get(&self, url: &str) -> Result<HttpResponse> {
            self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(url.to_string());
            let route = self.routes.lock().unwrap_or_else(|e| e.into_inner()).get(url).cloned();
            match route {
                Some(MockRoute::Respond { status, body }) => Ok(HttpResponse { status, body }),
                Some(MockRoute::Hang) => std::future::pending().await,
                Some(MockRoute::Fail) => exn::bail!(ErrorKind::Transport),
                None => Ok(HttpResponse { status: 404, body: Vec::new() }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range() {
        assert!(HttpResponse { status: 200, body: vec![] }.is_success());
        assert!(HttpResponse { status: 204, body: vec![] }.is_success());
        assert!(!HttpResponse { status: 301, body: vec![] }.is_success());
        assert!(!HttpResponse { status: 503, body: vec![] }.is_success());
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new().is_ok());
    }
}
