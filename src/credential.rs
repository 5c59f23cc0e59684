//! # Credential Refresher
//!
//! Exchanges the stored Google refresh token for a short-lived access token
//! using the OAuth2 `refresh_token` grant. One attempt per operation, no retry
//! and no caching: the token lives only as long as the operation that asked
//! for it.

use serde::Deserialize;
use tracing::{debug, warn};

/// Google's OAuth2 token endpoint.
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Token endpoint response. Only `access_token` matters here.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Bearer token valid for the current operation.
#[derive(Clone)]
pub struct AccessCredential(String);

impl AccessCredential {
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessCredential(<redacted>)")
    }
}

impl TokenResponse {
    /// Extracts a usable credential, ignoring blank tokens.
    pub fn into_credential(self) -> Option<AccessCredential> {
        self.access_token
            .filter(|t| !t.trim().is_empty())
            .map(AccessCredential)
    }
}

/// Performs the refresh grant.
///
/// Returns `None` on a missing refresh token, a transport error, a non-success
/// response or a body without `access_token`. Callers decide whether that is a
/// silent skip (timer) or a user-visible error (manual refresh).
pub async fn refresh_access_token(
    client: &reqwest::Client,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Option<AccessCredential> {
    if refresh_token.trim().is_empty() {
        debug!("No refresh token configured");
        return None;
    }

    let form = [
        ("client_id", client_id.trim()),
        ("client_secret", client_secret.trim()),
        ("refresh_token", refresh_token.trim()),
        ("grant_type", "refresh_token"),
    ];

    let response = match client.post(TOKEN_URL).form(&form).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("Token refresh request failed: {e}");
            return None;
        }
    };

    if !response.status().is_success() {
        warn!("Token refresh rejected with HTTP {}", response.status());
        return None;
    }

    match response.json::<TokenResponse>().await {
        Ok(body) => {
            debug!("Access token refreshed (expires in {:?}s)", body.expires_in);
            body.into_credential()
        }
        Err(e) => {
            warn!("Token refresh returned an unreadable body: {e}");
            None
        }
    }
}
