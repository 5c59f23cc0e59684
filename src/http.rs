//! # HTTP Session
//!
//! Every pipeline operation builds its own `reqwest::Client` with the provider's
//! authentication baked into the default headers. Nothing is shared between
//! operations, so an API key or bearer token can never leak from one run into
//! another.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::time::Duration;

use crate::error::PipelineError;

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Header carrying the Immich API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// How requests of one operation authenticate.
#[derive(Clone)]
pub enum Auth {
    /// No credential (token endpoint, local files)
    Anonymous,
    /// Static Immich API key
    ApiKey(String),
    /// Short-lived OAuth access token
    Bearer(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::ApiKey(_) => write!(f, "ApiKey(<redacted>)"),
            Self::Bearer(_) => write!(f, "Bearer(<redacted>)"),
        }
    }
}

/// Creates an HTTP client for a single operation.
pub fn create_client(auth: &Auth) -> Result<reqwest::Client, PipelineError> {
    let mut headers = HeaderMap::new();
    match auth {
        Auth::Anonymous => {}
        Auth::ApiKey(key) => {
            headers.insert(API_KEY_HEADER, sensitive(key)?);
        }
        Auth::Bearer(token) => {
            headers.insert(AUTHORIZATION, sensitive(&format!("Bearer {token}"))?);
        }
    }

    reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .default_headers(headers)
        .build()
        .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {e}")))
}

fn sensitive(value: &str) -> Result<HeaderValue, PipelineError> {
    let mut header = HeaderValue::from_str(value.trim())
        .map_err(|_| PipelineError::Config("credential contains invalid characters".into()))?;
    header.set_sensitive(true);
    Ok(header)
}

/// Downloads a URL and returns the body, failing on any non-success status.
pub async fn download_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, PipelineError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::NetworkFailure(format!(
            "Download returned HTTP {status}"
        )));
    }
    Ok(response.bytes().await?.to_vec())
}

/// Trims whitespace and trailing slashes from a configured base URL.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url(" http://immich.lan:2283/ "), "http://immich.lan:2283");
        assert_eq!(normalize_base_url("https://photos.example.com//"), "https://photos.example.com");
    }

    #[test]
    fn test_auth_debug_redacts_secrets() {
        let debug = format!("{:?}", Auth::ApiKey("secret-key".into()));
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn test_invalid_header_value_is_config_error() {
        let err = create_client(&Auth::ApiKey("bad\nkey".into())).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_clients_build_for_every_auth() {
        assert!(create_client(&Auth::Anonymous).is_ok());
        assert!(create_client(&Auth::ApiKey("k".into())).is_ok());
        assert!(create_client(&Auth::Bearer("t".into())).is_ok());
    }

    #[tokio::test]
    async fn test_download_fails_on_error_status() {
        let (base, server) = stub::serve(vec![(404, "{}"), (200, "jpeg")]).await;
        let client = create_client(&Auth::ApiKey("k".into())).unwrap();

        let err = download_bytes(&client, &format!("{base}/missing")).await.unwrap_err();
        assert!(matches!(err, PipelineError::NetworkFailure(m) if m.contains("404")));

        let bytes = download_bytes(&client, &format!("{base}/found")).await.unwrap();
        assert_eq!(bytes, b"jpeg");

        let requests = server.await.unwrap();
        assert!(requests[1].headers.contains("x-api-key: k"));
    }
}
