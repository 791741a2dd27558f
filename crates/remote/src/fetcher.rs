use crate::error::{ErrorKind, Result};
use crate::pointer::COMPONENT;
use crate::transport::{HttpResponse, TransportHandle};
use percent_encoding::utf8_percent_encode;
use std::time::Duration;
use tracing::instrument;

const URL_PLACEHOLDER: &str = "{url}";
const BACKOFF_BASE_MS: u64 = 200;
const BACKOFF_CAP_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Bound on each individual attempt.
    pub timeout: Duration,
    /// Extra rotations over `[direct, proxies…]` after the first.
    pub retries: u32,
}
impl Default for FetchOptions {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(10), retries: 1 }
    }
}

/// Apply a proxy (or image proxy) prefix to `url`.
///
/// A prefix containing `{url}` receives the escaped target at that position;
/// any other prefix has the target appended verbatim.
pub fn apply_prefix(prefix: &str, url: &str) -> String {
    match prefix.contains(URL_PLACEHOLDER) {
        true => prefix.replace(URL_PLACEHOLDER, &utf8_percent_encode(url, COMPONENT).to_string()),
        false => format!("{prefix}{url}"),
    }
}

fn backoff(round: u32) -> Duration {
    let exponent = round.saturating_sub(1);
    Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(2_u64.saturating_pow(exponent)).min(BACKOFF_CAP_MS))
}

/// GET with ordered proxy fallback.
///
/// Every call tries the direct URL first, then each proxy prefix in
/// configuration order. The first 2xx response wins for that call only; no
/// route is remembered across calls. Each attempt carries its own timeout,
/// and the fetcher holds no mutable state, so calls may run concurrently.
#[derive(Clone)]
pub struct ProxyFallbackFetcher {
    transport: TransportHandle,
    proxies: Vec<String>,
}

impl ProxyFallbackFetcher {
    pub fn new(transport: TransportHandle, proxies: Vec<String>) -> Self {
        Self { transport, proxies }
    }

    pub fn proxies(&self) -> &[String] {
        &self.proxies
    }

    fn routes(&self, url: &str) -> Vec<String> {
        std::iter::once(url.to_string()).chain(self.proxies.iter().map(|prefix| apply_prefix(prefix, url))).collect()
    }

    /// Fetch `url`, failing with [`ErrorKind::AllProxiesFailed`] once every
    /// route of every round has failed.
    #[instrument(skip(self, options), fields(proxies = self.proxies.len()))]
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<HttpResponse> {
        let routes = self.routes(url);
        let mut attempts = 0;
        for round in 0..=options.retries {
            if round > 0 {
                let delay = backoff(round);
                tracing::debug!(round, delay_ms = delay.as_millis() as u64, "Retrying all routes after backoff");
                tokio::time::sleep(delay).await;
            }
            for (index, route) in routes.iter().enumerate() {
                attempts += 1;
                match tokio::time::timeout(options.timeout, self.transport.get(route)).await {
                    Ok(Ok(response)) if response.is_success() => {
                        if index > 0 {
                            tracing::debug!(proxy = index, "Fetched through proxy");
                        }
                        return Ok(response);
                    },
                    Ok(Ok(response)) => tracing::debug!(route = index, status = response.status, "Non-success status"),
                    Ok(Err(error)) => tracing::debug!(route = index, ?error, "Transport failure"),
                    Err(_) => tracing::debug!(route = index, timeout_ms = options.timeout.as_millis() as u64, "Timed out"),
                }
            }
        }
        tracing::warn!(attempts, "All proxies failed");
        exn::bail!(ErrorKind::AllProxiesFailed(attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockRoute, MockTransport};
    use rstest::rstest;
    use std::sync::Arc;

    const TARGET: &str = "https://raw.example/doc.json";

    fn ok(body: &str) -> MockRoute {
        MockRoute::Respond { status: 200, body: body.as_bytes().to_vec() }
    }

    fn options(retries: u32) -> FetchOptions {
        FetchOptions { timeout: Duration::from_millis(500), retries }
    }

    #[rstest]
    #[case("https://proxy.one/", "https://proxy.one/https://raw.example/doc.json")]
    #[case("https://proxy.two/?url={url}", "https://proxy.two/?url=https%3A%2F%2Fraw.example%2Fdoc.json")]
    fn test_apply_prefix(#[case] prefix: &str, #[case] expected: &str) {
        assert_eq!(apply_prefix(prefix, TARGET), expected);
    }

    #[rstest]
    #[case(1, 200)]
    #[case(2, 400)]
    #[case(3, 800)]
    #[case(10, 2_000)]
    fn test_backoff_is_capped(#[case] round: u32, #[case] expected_ms: u64) {
        assert_eq!(backoff(round), Duration::from_millis(expected_ms));
    }

    #[tokio::test]
    async fn test_direct_success_skips_proxies() {
        let transport = Arc::new(MockTransport::new().route(TARGET, ok("direct")));
        let fetcher = ProxyFallbackFetcher::new(transport.clone(), vec!["https://proxy.one/".to_string()]);
        let response = fetcher.fetch(TARGET, &options(0)).await.unwrap();
        assert_eq!(response.body, b"direct");
        assert_eq!(transport.calls(), vec![TARGET]);
    }

    #[tokio::test]
    async fn test_falls_back_in_order() {
        let second = format!("https://proxy.two/{TARGET}");
        let transport = Arc::new(
            MockTransport::new()
                .route(TARGET, MockRoute::Respond { status: 503, body: vec![] })
                .route(format!("https://proxy.one/{TARGET}"), MockRoute::Fail)
                .route(second.clone(), ok("second")),
        );
        let proxies = vec!["https://proxy.one/".to_string(), "https://proxy.two/".to_string()];
        let fetcher = ProxyFallbackFetcher::new(transport.clone(), proxies);
        let response = fetcher.fetch(TARGET, &options(0)).await.unwrap();
        assert_eq!(response.body, b"second");
        assert_eq!(transport.call_count(), 3);
        assert_eq!(transport.calls().last(), Some(&second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_attempt_times_out() {
        let transport = Arc::new(
            MockTransport::new().route(TARGET, MockRoute::Hang).route(format!("https://p/{TARGET}"), ok("proxied")),
        );
        let fetcher = ProxyFallbackFetcher::new(transport, vec!["https://p/".to_string()]);
        let response = fetcher.fetch(TARGET, &options(0)).await.unwrap();
        assert_eq!(response.body, b"proxied");
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_non_success_is_systemic() {
        let transport = Arc::new(MockTransport::new());
        let proxies = vec!["https://proxy.one/".to_string(), "https://proxy.two/".to_string()];
        let fetcher = ProxyFallbackFetcher::new(transport.clone(), proxies);
        let err = fetcher.fetch(TARGET, &options(1)).await.unwrap_err();
        assert_eq!(*err, ErrorKind::AllProxiesFailed(6));
        assert!(err.is_systemic());
        // Two full rotations, in the same order each time.
        let calls = transport.calls();
        assert_eq!(calls.len(), 6);
        assert_eq!(calls[..3], calls[3..]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_round_recovers() {
        let transport = Arc::new(MockTransport::new().route(TARGET, MockRoute::Fail));
        let fetcher = ProxyFallbackFetcher::new(transport.clone(), vec![]);
        let handle = {
            let transport = transport.clone();
            tokio::spawn(async move {
                // Let the first round fail, then bring the route back.
                tokio::time::sleep(Duration::from_millis(50)).await;
                transport.set_route(TARGET, MockRoute::Respond { status: 200, body: b"late".to_vec() });
            })
        };
        let response = fetcher.fetch(TARGET, &options(1)).await.unwrap();
        handle.await.unwrap();
        assert_eq!(response.body, b"late");
        assert_eq!(transport.call_count(), 2);
    }
}
