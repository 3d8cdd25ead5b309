//! `TheGamesDB` search API.
//!
//! Documentation:
//! <https://api.thegamesdb.net/>

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{Candidate, LookupError, MetadataService, SearchRequest};

const TGDB_SEARCH_URL: &str = "https://api.thegamesdb.net/v1/Games/ByGameName";

/// `TheGamesDB` search client. Requires an API key.
///
/// Platform ids are IGDB ids and do not apply here, so searches are not platform scoped.
#[derive(Debug)]
pub struct TheGamesDbService {
    client: Client,
    api_key: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct TgdbResponse {
    #[serde(default)]
    data: Option<TgdbData>,
}

#[derive(Debug, Deserialize)]
struct TgdbData {
    #[serde(default)]
    games: Vec<TgdbGame>,
}

#[derive(Debug, Deserialize)]
struct TgdbGame {
    game_title: String,
    #[serde(default)]
    alternates: Option<Vec<String>>,
}

impl TheGamesDbService {
    /// Create a new `TheGamesDB` client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            url: TGDB_SEARCH_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }
}

impl MetadataService for TheGamesDbService {
    fn name(&self) -> &'static str {
        "thegamesdb"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>, LookupError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("name", request.term.as_str()),
                ("fields", "alternates"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        match status {
            // The public key answers 403 when its allowance is used up
            StatusCode::FORBIDDEN => Err(LookupError::RateLimited),
            status if status.is_success() => parse_games(&body),
            status => Err(LookupError::from_status(status, &body)),
        }
    }
}

fn parse_games(body: &str) -> Result<Vec<Candidate>, LookupError> {
    let response: TgdbResponse = serde_json::from_str(body)
        .map_err(|error| LookupError::NetworkError(format!("Invalid TheGamesDB response: {error}")))?;

    Ok(response
        .data
        .map(|data| data.games)
        .unwrap_or_default()
        .into_iter()
        .map(|game| Candidate {
            title: game.game_title,
            alternative_names: game.alternates.unwrap_or_default(),
        })
        .collect())
}
