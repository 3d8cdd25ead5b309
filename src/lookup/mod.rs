//! Rate-limited lookups against an external game metadata service.

mod client;
mod error;
mod igdb;
mod retry;
mod tgdb;
mod throttle;

use std::future::Future;

pub use client::{LookupClient, LookupSettings, StopSignal};
pub use error::LookupError;
pub use igdb::IgdbService;
pub use retry::{RetryPolicy, RetryState};
pub use tgdb::TheGamesDbService;
pub use throttle::{DEFAULT_REQUEST_INTERVAL, Throttle};

/// One search against a metadata service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub term: String,
    /// Platform ids to scope the search to. Empty means any platform.
    pub platform_ids: Vec<u32>,
}

/// A game returned by a metadata service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub alternative_names: Vec<String>,
}

impl Candidate {
    #[must_use]
    pub fn new(title: impl Into<String>, alternative_names: &[&str]) -> Self {
        Self {
            title: title.into(),
            alternative_names: alternative_names.iter().map(ToString::to_string).collect(),
        }
    }
}

/// A game metadata search backend.
pub trait MetadataService: Send + Sync {
    /// Service name for logging.
    fn name(&self) -> &'static str;

    /// Run one search request. Implementations make a single attempt;
    /// throttling and retries are handled by [`LookupClient`].
    fn search(&self, request: &SearchRequest) -> impl Future<Output = Result<Vec<Candidate>, LookupError>> + Send;
}

/// Supported metadata services.
#[derive(Debug)]
pub enum MetadataBackend {
    Igdb(IgdbService),
    TheGamesDb(TheGamesDbService),
}

impl MetadataService for MetadataBackend {
    fn name(&self) -> &'static str {
        match self {
            Self::Igdb(service) => service.name(),
            Self::TheGamesDb(service) => service.name(),
        }
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>, LookupError> {
        match self {
            Self::Igdb(service) => service.search(request).await,
            Self::TheGamesDb(service) => service.search(request).await,
        }
    }
}
