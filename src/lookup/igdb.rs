//! IGDB games API.
//!
//! Documentation:
//! <https://api-docs.igdb.com/#game>

use anyhow::{Context, Result};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;

use super::{Candidate, LookupError, MetadataService, SearchRequest};

const IGDB_GAMES_URL: &str = "https://api.igdb.com/v4/games";

/// Maximum results per search.
const RESULT_LIMIT: u32 = 50;

/// IGDB search client. Requires a Twitch client id and app access token.
#[derive(Debug)]
pub struct IgdbService {
    client: Client,
    client_id: String,
    access_token: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct IgdbGame {
    name: String,
    #[serde(default)]
    alternative_names: Vec<IgdbAlternativeName>,
}

#[derive(Debug, Deserialize)]
struct IgdbAlternativeName {
    name: String,
}

impl IgdbService {
    /// Create a new IGDB client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(client_id: &str, access_token: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            client_id: client_id.to_string(),
            access_token: access_token.to_string(),
            url: IGDB_GAMES_URL.to_string(),
        })
    }

    /// Use a different endpoint, for example a proxy.
    #[must_use]
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }
}

impl MetadataService for IgdbService {
    fn name(&self) -> &'static str {
        "igdb"
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>, LookupError> {
        let response = self
            .client
            .post(&self.url)
            .header("Client-ID", &self.client_id)
            .bearer_auth(&self.access_token)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "text/plain")
            .body(build_query(request))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LookupError::from_status(status, &body));
        }
        parse_games(&body)
    }
}

/// Build an apicalypse search query.
fn build_query(request: &SearchRequest) -> String {
    let term = request.term.replace('\\', "\\\\").replace('"', "\\\"");
    let platform_filter = if request.platform_ids.is_empty() {
        String::new()
    } else {
        let ids: Vec<String> = request.platform_ids.iter().map(ToString::to_string).collect();
        format!(" where platforms = ({});", ids.join(","))
    };
    format!("search \"{term}\"; fields name, alternative_names.name;{platform_filter} limit {RESULT_LIMIT};")
}

fn parse_games(body: &str) -> Result<Vec<Candidate>, LookupError> {
    let games: Vec<IgdbGame> = serde_json::from_str(body)
        .map_err(|error| LookupError::NetworkError(format!("Invalid IGDB response: {error}")))?;

    Ok(games
        .into_iter()
        .map(|game| Candidate {
            title: game.name,
            alternative_names: game.alternative_names.into_iter().map(|alt| alt.name).collect(),
        })
        .collect())
}

#[cfg(test)]
mod igdb_tests {
    use super::*;

    #[test]
    fn query_with_platforms() {
        let request = SearchRequest {
            term: "Biohazard".to_string(),
            platform_ids: vec![7, 8],
        };
        assert_eq!(
            build_query(&request),
            "search \"Biohazard\"; fields name, alternative_names.name; where platforms = (7,8); limit 50;"
        );
    }

    #[test]
    fn query_without_platforms() {
        let request = SearchRequest {
            term: "Tetris".to_string(),
            platform_ids: Vec::new(),
        };
        assert_eq!(
            build_query(&request),
            "search \"Tetris\"; fields name, alternative_names.name; limit 50;"
        );
    }

    #[test]
    fn query_escapes_quotes() {
        let request = SearchRequest {
            term: r#"The "Best" Game"#.to_string(),
            platform_ids: Vec::new(),
        };
        assert!(build_query(&request).starts_with(r#"search "The \"Best\" Game";"#));
    }

    #[test]
    fn parses_games_with_alternative_names() {
        let body = r#"[
            {"id": 1, "name": "Resident Evil", "alternative_names": [{"id": 10, "name": "Biohazard"}]},
            {"id": 2, "name": "Resident Evil 2"}
        ]"#;
        let candidates = parse_games(body).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], Candidate::new("Resident Evil", &["Biohazard"]));
        assert!(candidates[1].alternative_names.is_empty());
    }

    #[test]
    fn invalid_body_is_network_error() {
        assert!(matches!(parse_games("<html>"), Err(LookupError::NetworkError(_))));
    }
}
