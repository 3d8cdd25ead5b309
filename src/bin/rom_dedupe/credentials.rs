//! IGDB app access token.
//!
//! IGDB authenticates through Twitch. A client id and secret are exchanged
//! for an app access token with the OAuth client credentials flow.
//!
//! Documentation:
//! <https://api-docs.igdb.com/#authentication>

use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde::Deserialize;

const TWITCH_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Exchange a client id and secret for an app access token.
///
/// # Errors
/// Returns an error if the request fails or the response has no token.
pub async fn fetch_igdb_token(client_id: &str, client_secret: &str) -> Result<String> {
    let response = Client::new()
        .post(TWITCH_TOKEN_URL)
        .form(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "client_credentials"),
        ])
        .send()
        .await
        .context("Failed to send token request")?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!("Token request failed: HTTP {status} - {body}");
    }

    let token = parse_token(&body)?;
    tracing::debug!(expires_in = token.expires_in, "Received IGDB access token");
    Ok(token.access_token)
}

fn parse_token(body: &str) -> Result<TokenResponse> {
    let token: TokenResponse = serde_json::from_str(body).context("Invalid token response")?;
    if token.access_token.trim().is_empty() {
        bail!("Token response did not contain an access token");
    }
    Ok(token)
}
