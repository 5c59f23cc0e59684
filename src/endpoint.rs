//! # Endpoint Resolver
//!
//! A self-hosted server is often reachable at a LAN address at home and at a
//! public address elsewhere. Before each operation the primary endpoint's ping
//! route is probed with a short timeout, then the fallback. When neither answers
//! the primary is used anyway and the real request reports the failure.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use crate::http::normalize_base_url;

/// Upper bound for a single health probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Health-check route appended to a base URL.
pub const PING_PATH: &str = "/api/server-info/ping";

/// Answers whether a base endpoint is reachable.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn is_healthy(&self, base_url: &str) -> bool;
}

/// Probes `{base}/api/server-info/ping` over HTTP.
pub struct PingProbe<'a> {
    client: &'a reqwest::Client,
}

impl<'a> PingProbe<'a> {
    pub fn new(client: &'a reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthProbe for PingProbe<'_> {
    async fn is_healthy(&self, base_url: &str) -> bool {
        let url = format!("{base_url}{PING_PATH}");
        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Probe of {base_url} failed: {e}");
                false
            }
        }
    }
}

/// Picks the endpoint to use for this operation. Never fails.
pub async fn resolve_endpoint(probe: &dyn HealthProbe, primary: &str, fallback: &str) -> String {
    let primary = normalize_base_url(primary);
    let fallback = normalize_base_url(fallback);

    if probe.is_healthy(&primary).await {
        debug!("Using primary endpoint {primary}");
        return primary;
    }

    if !fallback.is_empty() && fallback != primary && probe.is_healthy(&fallback).await {
        info!("Primary endpoint unreachable, using fallback {fallback}");
        return fallback;
    }

    info!("No endpoint answered the health check, trying primary {primary} anyway");
    primary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::stub;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Probe answering from a fixed set of healthy URLs and recording every call.
    struct FakeProbe {
        healthy: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeProbe {
        fn new(healthy: &[&str]) -> Self {
            Self {
                healthy: healthy.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HealthProbe for FakeProbe {
        async fn is_healthy(&self, base_url: &str) -> bool {
            self.calls.lock().unwrap().push(base_url.to_string());
            self.healthy.contains(base_url)
        }
    }

    const LAN: &str = "http://192.168.1.10:2283";
    const WAN: &str = "https://photos.example.com";

    #[tokio::test]
    async fn test_healthy_primary_skips_fallback_probe() {
        let probe = FakeProbe::new(&[LAN, WAN]);
        assert_eq!(resolve_endpoint(&probe, LAN, WAN).await, LAN);
        assert_eq!(probe.calls(), vec![LAN]);
    }

    #[tokio::test]
    async fn test_failed_primary_uses_healthy_fallback() {
        let probe = FakeProbe::new(&[WAN]);
        assert_eq!(resolve_endpoint(&probe, LAN, WAN).await, WAN);
    }

    #[tokio::test]
    async fn test_both_failing_returns_primary() {
        let probe = FakeProbe::new(&[]);
        assert_eq!(resolve_endpoint(&probe, LAN, WAN).await, LAN);
        assert_eq!(probe.calls(), vec![LAN, WAN]);
    }

    #[tokio::test]
    async fn test_empty_fallback_is_not_probed() {
        let probe = FakeProbe::new(&[]);
        assert_eq!(resolve_endpoint(&probe, LAN, "  ").await, LAN);
        assert_eq!(probe.calls(), vec![LAN]);
    }

    #[tokio::test]
    async fn test_trailing_slashes_are_trimmed() {
        let probe = FakeProbe::new(&[WAN]);
        let chosen = resolve_endpoint(&probe, "http://192.168.1.10:2283/", "https://photos.example.com/").await;
        assert_eq!(chosen, WAN);
    }

    #[tokio::test]
    async fn test_ping_route_status_decides_health() {
        let (base, server) = stub::serve(vec![(200, r#"{"res":"pong"}"#), (503, "")]).await;
        let client = reqwest::Client::new();
        let probe = PingProbe::new(&client);

        assert!(probe.is_healthy(&base).await);
        assert!(!probe.is_healthy(&base).await);

        let requests = server.await.unwrap();
        assert!(requests[0].line.starts_with("GET /api/server-info/ping "));
    }

    #[tokio::test]
    async fn test_unreachable_primary_falls_over_to_live_server() {
        let (fallback, _server) = stub::serve(vec![(200, r#"{"res":"pong"}"#)]).await;
        let primary = stub::dead_endpoint().await;
        let client = reqwest::Client::new();

        let chosen = resolve_endpoint(&PingProbe::new(&client), &primary, &format!("{fallback}/")).await;

        assert_eq!(chosen, fallback);
    }
}
