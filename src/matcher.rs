//! Progressive title matching.
//!
//! Resolves a base title to a canonical identity:
//! identity cache first, then the alias table, then metadata searches
//! with progressively relaxed search terms.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;

use crate::aliases::AliasTable;
use crate::cache::{CacheEntry, CacheKey, IdentityCache};
use crate::lookup::{Candidate, LookupClient, LookupError, MetadataService, StopSignal};
use crate::platform::PlatformTable;

static TRAILING_PARENTHETICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\s*[\(\[][^\(\)\[\]]*[\)\]])+\s*$").expect("Invalid trailing parenthetical regex")
});

static SUBTITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*(?::|\s-\s).*$").expect("Invalid subtitle regex"));

static EDITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)[\s:,-]*\b(?:(?:special|limited|collector'?s|deluxe|definitive|anniversary|premium|ultimate|game of the year|goty)\s+edition|director'?s\s+cut|remastered)\s*$",
    )
    .expect("Invalid edition regex")
});

static DISC_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*[\(\[]?\b(?:disc|disk|cd)\s*\d+.*$").expect("Invalid disc number regex"));

static LEADING_ARTICLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:the|a|an)\s+").expect("Invalid leading article regex"));

static TRAILING_ARTICLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.*?),\s*(the|a|an)$").expect("Invalid trailing article regex"));

/// Disc marker kept at the end of a base title by the analyzer.
static DISC_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.*?)\s*(\((?:disc|disk|cd)\s*\d+[^)]*\))$").expect("Invalid disc suffix regex")
});

/// Search term simplification rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relaxation {
    /// Remove trailing `(...)` and `[...]` qualifiers.
    StripParenthetical,
    /// Remove everything after a colon or a ` - ` separator.
    StripSubtitle,
    /// Remove edition qualifiers like "Special Edition" or "Director's Cut".
    StripEdition,
    StripDiscNumber,
    /// Remove a leading or trailing article.
    StripArticles,
}

/// Relaxations applied when no order is configured.
pub const DEFAULT_RELAXATIONS: [Relaxation; 3] = [
    Relaxation::StripParenthetical,
    Relaxation::StripSubtitle,
    Relaxation::StripEdition,
];

impl Relaxation {
    /// Apply the rule to `term`.
    #[must_use]
    pub fn apply(self, term: &str) -> String {
        let relaxed = match self {
            Self::StripParenthetical => TRAILING_PARENTHETICAL_RE.replace(term, ""),
            Self::StripSubtitle => SUBTITLE_RE.replace(term, ""),
            Self::StripEdition => EDITION_RE.replace(term, ""),
            Self::StripDiscNumber => DISC_NUMBER_RE.replace(term, ""),
            Self::StripArticles => {
                let term = LEADING_ARTICLE_RE.replace(term, "");
                TRAILING_ARTICLE_RE.replace(&term, "$1").into_owned().into()
            }
        };
        relaxed.trim().to_string()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StripParenthetical => "strip_parenthetical",
            Self::StripSubtitle => "strip_subtitle",
            Self::StripEdition => "strip_edition",
            Self::StripDiscNumber => "strip_disc_number",
            Self::StripArticles => "strip_articles",
        }
    }
}

impl fmt::Display for Relaxation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Search terms for `title`: the title itself, then each relaxation applied on top of the previous one.
///
/// Rules that leave the term unchanged or empty are skipped.
#[must_use]
pub fn search_terms(title: &str, relaxations: &[Relaxation]) -> Vec<String> {
    let mut current = title.trim().to_string();
    let mut terms = vec![current.clone()];
    for rule in relaxations {
        let relaxed = rule.apply(&current);
        if relaxed.is_empty() || relaxed == current {
            continue;
        }
        if !terms.contains(&relaxed) {
            terms.push(relaxed.clone());
        }
        current = relaxed;
    }
    terms
}

/// Comparison form of a title: lowercase alphanumeric words with a trailing article moved to the front.
#[must_use]
pub fn comparable_title(title: &str) -> String {
    let lower = title.trim().to_lowercase();
    let reordered = TRAILING_ARTICLE_RE.replace(&lower, "$2 $1");
    reordered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a trailing disc marker from a base title.
#[must_use]
pub fn split_disc(base_title: &str) -> (&str, Option<&str>) {
    DISC_SUFFIX_RE.captures(base_title).map_or((base_title.trim(), None), |captures| {
        let title = captures.get(1).map_or(base_title, |m| m.as_str());
        (title, captures.get(2).map(|m| m.as_str()))
    })
}

/// Append the disc marker of the original title to a canonical title.
#[must_use]
pub fn with_disc(canonical: &str, disc: Option<&str>) -> String {
    match disc {
        Some(disc) => format!("{canonical} {disc}"),
        None => canonical.to_string(),
    }
}

/// Cache key for `base_title`. Every disc of a title shares one key.
#[must_use]
pub fn lookup_key(base_title: &str, platform: &str) -> CacheKey {
    CacheKey::new(split_disc(base_title).0, platform)
}

/// Where a match result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    Cache,
    Alias,
    Lookup,
    /// No metadata service configured.
    Offline,
    /// Lookups were disabled after an authorization failure.
    Disabled,
    /// A stop was requested before the title could be looked up. Not cached.
    Stopped,
}

/// Non-fatal problem found while matching one title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchWarning {
    NoMatch {
        title: String,
    },
    /// Several different games matched. The first one was used.
    Ambiguous {
        title: String,
        chosen: String,
        candidates: Vec<String>,
    },
    LookupFailed {
        title: String,
        error: LookupError,
    },
    /// Credentials were rejected, lookups are off for the rest of the run.
    LookupsDisabled {
        reason: String,
    },
}

impl fmt::Display for MatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatch { title } => write!(f, "No match found for '{title}'"),
            Self::Ambiguous {
                title,
                chosen,
                candidates,
            } => write!(
                f,
                "Ambiguous match for '{title}': using '{chosen}' out of {}",
                candidates.join(", ")
            ),
            Self::LookupFailed { title, error } => write!(f, "Lookup failed for '{title}': {error}"),
            Self::LookupsDisabled { reason } => write!(f, "Metadata lookups disabled: {reason}"),
        }
    }
}

/// Outcome of resolving one title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub identity: Option<String>,
    pub source: MatchSource,
    pub warning: Option<MatchWarning>,
}

impl MatchResult {
    const fn new(identity: Option<String>, source: MatchSource) -> Self {
        Self {
            identity,
            source,
            warning: None,
        }
    }

    fn with_warning(mut self, warning: MatchWarning) -> Self {
        self.warning = Some(warning);
        self
    }
}

/// Resolves base titles to canonical identities.
pub struct ProgressiveMatcher<S> {
    cache: Arc<IdentityCache>,
    client: Option<LookupClient<S>>,
    aliases: AliasTable,
    platforms: PlatformTable,
    relaxations: Vec<Relaxation>,
    lookups_disabled: AtomicBool,
    stop: StopSignal,
}

impl<S: MetadataService> ProgressiveMatcher<S> {
    /// Create a matcher with the built-in aliases, platform table and relaxations.
    /// Without a client only the cache and aliases are used.
    #[must_use]
    pub fn new(cache: Arc<IdentityCache>, client: Option<LookupClient<S>>) -> Self {
        Self {
            cache,
            client,
            aliases: AliasTable::builtin(),
            platforms: PlatformTable::default(),
            relaxations: DEFAULT_RELAXATIONS.to_vec(),
            lookups_disabled: AtomicBool::new(false),
            stop: StopSignal::new(),
        }
    }

    /// Share `stop` with the lookup client.
    /// Once set, no further search terms or retries are sent.
    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.client = self.client.map(|client| client.with_stop_signal(stop.clone()));
        self.stop = stop;
        self
    }

    #[must_use]
    pub fn with_aliases(mut self, aliases: AliasTable) -> Self {
        self.aliases = aliases;
        self
    }

    #[must_use]
    pub fn with_platforms(mut self, platforms: PlatformTable) -> Self {
        self.platforms = platforms;
        self
    }

    #[must_use]
    pub fn with_relaxations(mut self, relaxations: Vec<Relaxation>) -> Self {
        self.relaxations = relaxations;
        self
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<IdentityCache> {
        &self.cache
    }

    #[must_use]
    pub const fn client(&self) -> Option<&LookupClient<S>> {
        self.client.as_ref()
    }

    #[must_use]
    pub const fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// True if a metadata service is configured and has not rejected the credentials.
    #[must_use]
    pub fn lookups_enabled(&self) -> bool {
        self.client.is_some() && !self.lookups_disabled.load(Ordering::Relaxed)
    }

    /// Resolve from the identity cache or the alias table without any network access.
    #[must_use]
    pub fn resolve_local(&self, base_title: &str, platform: &str) -> Option<MatchResult> {
        let (title, disc) = split_disc(base_title);

        let key = CacheKey::new(title, platform);
        if let Some(entry) = self.cache.get(&key) {
            tracing::trace!(%key, "Cache hit");
            let identity = entry.canonical.as_deref().map(|canonical| with_disc(canonical, disc));
            return Some(MatchResult::new(identity, MatchSource::Cache));
        }

        self.aliases
            .resolve(title)
            .map(|canonical| MatchResult::new(Some(with_disc(canonical, disc)), MatchSource::Alias))
    }

    /// Resolve `base_title` on `platform` (a file extension) to a canonical identity.
    ///
    /// Lookup errors only affect this title and are returned as a warning.
    pub async fn resolve(&self, base_title: &str, platform: &str) -> MatchResult {
        if let Some(result) = self.resolve_local(base_title, platform) {
            return result;
        }

        let (title, disc) = split_disc(base_title);
        let key = CacheKey::new(title, platform);

        let Some(client) = &self.client else {
            return MatchResult::new(None, MatchSource::Offline);
        };
        if self.lookups_disabled.load(Ordering::Relaxed) {
            return MatchResult::new(None, MatchSource::Disabled);
        }

        let hint = self.platforms.hint(platform);
        for term in search_terms(title, &self.relaxations) {
            if self.stop.is_stopped() {
                return MatchResult::new(None, MatchSource::Stopped);
            }
            match client.query(&term, &hint.platform_ids).await {
                Ok(candidates) => {
                    let Some((candidate, ambiguous)) = pick_candidate(&term, &candidates) else {
                        continue;
                    };
                    tracing::debug!(title, term = %term, canonical = %candidate.title, "Matched");
                    self.cache.put(
                        key,
                        CacheEntry::matched(candidate.title.clone(), candidate.alternative_names.clone()),
                    );
                    let result = MatchResult::new(Some(with_disc(&candidate.title, disc)), MatchSource::Lookup);
                    return match ambiguous {
                        Some(candidates) => {
                            let warning = MatchWarning::Ambiguous {
                                title: title.to_string(),
                                chosen: candidate.title.clone(),
                                candidates,
                            };
                            tracing::warn!("{warning}");
                            result.with_warning(warning)
                        }
                        None => result,
                    };
                }
                Err(LookupError::Cancelled) => return MatchResult::new(None, MatchSource::Stopped),
                Err(LookupError::Unauthorized(reason)) => {
                    if self.lookups_disabled.swap(true, Ordering::Relaxed) {
                        return MatchResult::new(None, MatchSource::Disabled);
                    }
                    let warning = MatchWarning::LookupsDisabled { reason };
                    tracing::warn!("{warning}");
                    return MatchResult::new(None, MatchSource::Disabled).with_warning(warning);
                }
                Err(error) => {
                    return MatchResult::new(None, MatchSource::Lookup).with_warning(MatchWarning::LookupFailed {
                        title: title.to_string(),
                        error,
                    });
                }
            }
        }

        self.cache.put(key, CacheEntry::no_match());
        MatchResult::new(None, MatchSource::Lookup).with_warning(MatchWarning::NoMatch {
            title: title.to_string(),
        })
    }
}

/// First candidate whose title or alternative name matches `term`,
/// plus all matching titles when more than one distinct game matched.
fn pick_candidate<'a>(term: &str, candidates: &'a [Candidate]) -> Option<(&'a Candidate, Option<Vec<String>>)> {
    let wanted = comparable_title(term);
    let matches: Vec<&Candidate> = candidates
        .iter()
        .filter(|candidate| {
            comparable_title(&candidate.title) == wanted
                || candidate
                    .alternative_names
                    .iter()
                    .any(|name| comparable_title(name) == wanted)
        })
        .collect();

    let first = *matches.first()?;
    let mut distinct: Vec<String> = Vec::new();
    for candidate in &matches {
        if !distinct
            .iter()
            .any(|title| comparable_title(title) == comparable_title(&candidate.title))
        {
            distinct.push(candidate.title.clone());
        }
    }
    let ambiguous = (distinct.len() > 1).then_some(distinct);
    Some((first, ambiguous))
}
