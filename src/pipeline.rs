//! Batch run over a list of ROM files: analysis, matching, then resolution.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tokio::sync::Semaphore;

use crate::analyzer::FileEntry;
use crate::cache::CacheKey;
use crate::lookup::MetadataService;
use crate::matcher::{MatchResult, MatchSource, MatchWarning, ProgressiveMatcher, lookup_key, split_disc, with_disc};
use crate::resolve::{Decision, Resolution, ResolutionPolicy, group_and_resolve};

pub use crate::lookup::StopSignal;

const PROGRESS_BAR_CHARS: &str = "=>-";
const PROGRESS_BAR_TEMPLATE: &str = "[{elapsed_precise}] {bar:80.magenta/blue} {pos}/{len} {percent}%";

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub files: usize,
    pub groups: usize,
    pub duplicate_groups: usize,
    /// Groups that contain differently named titles merged by canonical identity.
    pub cross_language_merges: usize,
    pub keep: usize,
    pub remove: usize,
    /// Unique titles sent to the metadata service.
    pub lookups: usize,
    pub cache_hits: usize,
    pub alias_hits: usize,
    pub rejected: usize,
    pub warnings: usize,
    /// Titles left unresolved because a stop was requested.
    pub skipped: usize,
    pub stopped: bool,
}

/// Result of a run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub resolution: Resolution,
    pub warnings: Vec<MatchWarning>,
    pub stats: RunStats,
}

impl RunReport {
    /// Paths marked for removal, in decision order.
    #[must_use]
    pub fn removals(&self) -> Vec<PathBuf> {
        self.resolution
            .decisions
            .iter()
            .filter(|decision| decision.decision == Decision::Remove)
            .map(|decision| decision.entry.path.clone())
            .collect()
    }
}

/// One title to resolve: disc marker removed, shared by every entry with the same key.
struct TitleJob {
    key: CacheKey,
    title: String,
    platform: String,
}

/// Runs the whole matching and resolution pass.
pub struct Deduplicator<S> {
    matcher: ProgressiveMatcher<S>,
    policy: ResolutionPolicy,
    concurrency: usize,
    show_progress: bool,
}

impl<S: MetadataService> Deduplicator<S> {
    #[must_use]
    pub fn new(matcher: ProgressiveMatcher<S>, policy: ResolutionPolicy) -> Self {
        Self {
            matcher,
            policy,
            concurrency: num_cpus::get_physical().max(1),
            show_progress: false,
        }
    }

    /// Maximum number of titles resolved at the same time.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Stop starting lookups once `stop` is set.
    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.matcher = self.matcher.with_stop_signal(stop);
        self
    }

    #[must_use]
    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    #[must_use]
    pub const fn matcher(&self) -> &ProgressiveMatcher<S> {
        &self.matcher
    }

    #[must_use]
    pub const fn policy(&self) -> &ResolutionPolicy {
        &self.policy
    }

    /// Analyze, match and resolve the given files.
    ///
    /// Always returns a decision for every well-formed file,
    /// even if every lookup fails or a stop is requested.
    pub async fn run(&self, paths: &[PathBuf]) -> RunReport {
        let mut rejected = Vec::new();
        let mut entries = Vec::with_capacity(paths.len());
        for (path, result) in paths
            .par_iter()
            .map(|path| (path, FileEntry::from_path(path)))
            .collect::<Vec<_>>()
        {
            match result {
                Ok(entry) => entries.push(entry),
                Err(error) => {
                    tracing::warn!(path = %path.display(), "Skipping file: {error}");
                    rejected.push((path.clone(), error));
                }
            }
        }

        // One job per cache key so discs and case variants of a title share a single lookup
        let mut seen = HashSet::new();
        let jobs: Vec<TitleJob> = entries
            .iter()
            .filter_map(|entry| {
                let key = lookup_key(&entry.base_title, entry.platform());
                seen.insert(key.clone()).then(|| TitleJob {
                    key,
                    title: split_disc(&entry.base_title).0.to_string(),
                    platform: entry.platform().to_string(),
                })
            })
            .collect();

        let matches = self.match_titles(jobs).await;

        let mut stats = RunStats {
            files: paths.len(),
            ..RunStats::default()
        };
        let mut warnings = Vec::new();
        let mut identities = HashMap::new();
        for (key, result) in matches {
            match result.source {
                MatchSource::Cache => stats.cache_hits += 1,
                MatchSource::Alias => stats.alias_hits += 1,
                MatchSource::Lookup => stats.lookups += 1,
                MatchSource::Stopped => stats.skipped += 1,
                MatchSource::Offline | MatchSource::Disabled => {}
            }
            if let Some(warning) = result.warning {
                warnings.push(warning);
            }
            if let Some(identity) = result.identity {
                identities.insert(key, identity);
            }
        }

        for entry in &mut entries {
            let (_, disc) = split_disc(&entry.base_title);
            entry.canonical_identity = identities
                .get(&lookup_key(&entry.base_title, entry.platform()))
                .map(|canonical| with_disc(canonical, disc));
        }

        let mut resolution = group_and_resolve(entries, &self.policy);
        rejected.append(&mut resolution.rejected);
        resolution.rejected = rejected;

        stats.groups = resolution.groups.len();
        stats.duplicate_groups = resolution.groups.iter().filter(|g| g.is_duplicate()).count();
        stats.cross_language_merges = resolution.groups.iter().filter(|g| g.is_cross_language()).count();
        stats.keep = resolution
            .decisions
            .iter()
            .filter(|d| d.decision == Decision::Keep)
            .count();
        stats.remove = resolution.decisions.len() - stats.keep;
        stats.rejected = resolution.rejected.len();
        stats.warnings = warnings.len();
        stats.stopped = self.matcher.stop_signal().is_stopped();

        RunReport {
            resolution,
            warnings,
            stats,
        }
    }

    /// Resolve each job with bounded concurrency.
    ///
    /// After a stop request only cache and alias lookups are made
    /// and titles that would need the network come back as [`MatchSource::Stopped`].
    async fn match_titles(&self, jobs: Vec<TitleJob>) -> Vec<(CacheKey, MatchResult)> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let progress_bar = self.create_progress_bar(jobs.len() as u64);

        let tasks = jobs.into_iter().map(|job| {
            let semaphore = Arc::clone(&semaphore);
            let progress_bar = &progress_bar;
            async move {
                let result = match self.matcher.resolve_local(&job.title, &job.platform) {
                    Some(result) => result,
                    None => {
                        let _permit = semaphore.acquire().await.ok();
                        self.matcher.resolve(&job.title, &job.platform).await
                    }
                };
                progress_bar.inc(1);
                (job.key, result)
            }
        });

        let results = futures::future::join_all(tasks).await;
        progress_bar.finish_and_clear();
        results
    }

    fn create_progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress || !self.matcher.lookups_enabled() {
            return ProgressBar::hidden();
        }
        let progress_bar = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_BAR_TEMPLATE) {
            progress_bar.set_style(style.progress_chars(PROGRESS_BAR_CHARS));
        }
        progress_bar
    }
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::aliases::AliasTable;
    use crate::cache::IdentityCache;
    use crate::lookup::{Candidate, LookupClient, LookupError, LookupSettings, RetryPolicy, SearchRequest};

    /// Resolves "Biohazard" and stops the run after the first request.
    struct StoppingService {
        stop: StopSignal,
        calls: AtomicUsize,
    }

    impl MetadataService for StoppingService {
        fn name(&self) -> &'static str {
            "stopping"
        }

        async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.stop.stop();
            if request.term == "Biohazard" {
                Ok(vec![Candidate::new("Resident Evil", &["Biohazard"])])
            } else {
                Ok(Vec::new())
            }
        }
    }

    /// Records every search term and answers with `answer`.
    /// Optionally requests a stop on the first call.
    struct RecordingService {
        answer: Result<Vec<Candidate>, LookupError>,
        stop_on_call: Option<StopSignal>,
        terms: Mutex<Vec<String>>,
    }

    impl RecordingService {
        fn new(answer: Result<Vec<Candidate>, LookupError>) -> Self {
            Self {
                answer,
                stop_on_call: None,
                terms: Mutex::new(Vec::new()),
            }
        }
    }

    impl MetadataService for RecordingService {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>, LookupError> {
            self.terms.lock().unwrap().push(request.term.clone());
            if let Some(stop) = &self.stop_on_call {
                stop.stop();
            }
            self.answer.clone()
        }
    }

    fn recorded_terms(deduplicator: &Deduplicator<RecordingService>) -> Vec<String> {
        deduplicator
            .matcher()
            .client()
            .unwrap()
            .service()
            .terms
            .lock()
            .unwrap()
            .clone()
    }

    fn paths(filenames: &[&str]) -> Vec<PathBuf> {
        filenames.iter().map(|f| PathBuf::from("/roms").join(f)).collect()
    }

    fn settings() -> LookupSettings {
        LookupSettings {
            request_interval: Duration::from_millis(10),
            retry: RetryPolicy::new(1, Duration::from_millis(10), Duration::from_millis(10)),
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn offline_run_resolves_by_region() {
        let matcher: ProgressiveMatcher<StoppingService> =
            ProgressiveMatcher::new(Arc::new(IdentityCache::new()), None).with_aliases(AliasTable::default());
        let deduplicator = Deduplicator::new(matcher, ResolutionPolicy::default());

        let report = deduplicator
            .run(&paths(&[
                "Super Mario Bros. (USA).nes",
                "Super Mario Bros. (Japan).nes",
                "Dragon Quest (Japan).nes",
            ]))
            .await;

        assert_eq!(report.stats.files, 3);
        assert_eq!(report.stats.groups, 2);
        assert_eq!(report.stats.duplicate_groups, 1);
        assert_eq!(report.stats.remove, 1);
        assert_eq!(report.removals(), vec![PathBuf::from("/roms/Super Mario Bros. (Japan).nes")]);
        assert!(report.warnings.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn aliases_merge_groups_without_network() {
        let matcher: ProgressiveMatcher<StoppingService> = ProgressiveMatcher::new(Arc::new(IdentityCache::new()), None);
        let deduplicator = Deduplicator::new(matcher, ResolutionPolicy::default());

        let report = deduplicator
            .run(&paths(&["Rockman (Japan).nes", "Mega Man (USA).nes"]))
            .await;

        assert_eq!(report.stats.groups, 1);
        assert_eq!(report.stats.alias_hits, 1);
        assert_eq!(report.stats.cross_language_merges, 1);
        assert_eq!(report.removals(), vec![PathBuf::from("/roms/Rockman (Japan).nes")]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_new_lookups() {
        let stop = StopSignal::new();
        let service = StoppingService {
            stop: stop.clone(),
            calls: AtomicUsize::new(0),
        };
        let matcher = ProgressiveMatcher::new(
            Arc::new(IdentityCache::new()),
            Some(LookupClient::new(service, settings())),
        )
        .with_aliases(AliasTable::default());
        let deduplicator = Deduplicator::new(matcher, ResolutionPolicy::default())
            .with_concurrency(1)
            .with_stop_signal(stop);

        let report = deduplicator
            .run(&paths(&[
                "Biohazard (Japan).iso",
                "Resident Evil (USA).iso",
                "Contra (USA).nes",
                "Contra (Japan).nes",
            ]))
            .await;

        let calls = deduplicator
            .matcher()
            .client()
            .unwrap()
            .service()
            .calls
            .load(Ordering::SeqCst);
        assert_eq!(calls, 1);
        assert!(report.stats.stopped);
        assert_eq!(report.stats.lookups, 1);
        assert_eq!(report.stats.skipped, 2);
        // Every file still gets a decision
        assert_eq!(report.resolution.decisions.len(), 4);
        assert_eq!(
            report.removals(),
            vec![
                PathBuf::from("/roms/Contra (Japan).nes"),
                PathBuf::from("/roms/Biohazard (Japan).iso"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_paths_are_rejected() {
        let matcher: ProgressiveMatcher<StoppingService> = ProgressiveMatcher::new(Arc::new(IdentityCache::new()), None);
        let deduplicator = Deduplicator::new(matcher, ResolutionPolicy::default());

        let report = deduplicator
            .run(&[PathBuf::new(), PathBuf::from("/roms/Contra (USA).nes")])
            .await;
        assert_eq!(report.stats.rejected, 1);
        assert_eq!(report.resolution.decisions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn discs_and_case_variants_share_one_lookup() {
        let service = RecordingService::new(Ok(Vec::new()));
        let matcher = ProgressiveMatcher::new(
            Arc::new(IdentityCache::new()),
            Some(LookupClient::new(service, settings())),
        )
        .with_aliases(AliasTable::default());
        let deduplicator = Deduplicator::new(matcher, ResolutionPolicy::default()).with_concurrency(4);

        let report = deduplicator
            .run(&paths(&[
                "Homebrew Quest (USA).nes",
                "HOMEBREW QUEST (Japan).nes",
                "Parasite Eve (USA) (Disc 1).bin",
                "Parasite Eve (USA) (Disc 2).bin",
            ]))
            .await;

        let mut terms = recorded_terms(&deduplicator);
        terms.sort();
        assert_eq!(terms, vec!["Homebrew Quest", "Parasite Eve"]);
        assert_eq!(report.stats.lookups, 2);
        // Discs stay in separate groups
        assert_eq!(report.stats.groups, 3);
        assert_eq!(report.removals(), vec![PathBuf::from("/roms/HOMEBREW QUEST (Japan).nes")]);
    }

    #[tokio::test(start_paused = true)]
    async fn discs_get_their_own_canonical_identity() {
        let service = RecordingService::new(Ok(vec![Candidate::new("Final Fantasy VII", &["FF7"])]));
        let matcher = ProgressiveMatcher::new(
            Arc::new(IdentityCache::new()),
            Some(LookupClient::new(service, settings())),
        )
        .with_aliases(AliasTable::default());
        let deduplicator = Deduplicator::new(matcher, ResolutionPolicy::default()).with_concurrency(4);

        let report = deduplicator
            .run(&paths(&[
                "Final Fantasy VII (USA) (Disc 1).bin",
                "Final Fantasy VII (USA) (Disc 2).bin",
            ]))
            .await;

        assert_eq!(recorded_terms(&deduplicator).len(), 1);
        let mut identities: Vec<String> = report
            .resolution
            .decisions
            .iter()
            .filter_map(|decision| decision.entry.canonical_identity.clone())
            .collect();
        identities.sort();
        assert_eq!(identities, vec!["Final Fantasy VII (Disc 1)", "Final Fantasy VII (Disc 2)"]);
        assert!(report.removals().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_request_sends_no_retries() {
        let stop = StopSignal::new();
        let mut service = RecordingService::new(Err(LookupError::Timeout));
        service.stop_on_call = Some(stop.clone());
        let settings = LookupSettings {
            retry: RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(10)),
            ..settings()
        };
        let matcher = ProgressiveMatcher::new(
            Arc::new(IdentityCache::new()),
            Some(LookupClient::new(service, settings)),
        )
        .with_aliases(AliasTable::default());
        let deduplicator = Deduplicator::new(matcher, ResolutionPolicy::default())
            .with_concurrency(1)
            .with_stop_signal(stop);

        let report = deduplicator
            .run(&paths(&["Castlevania - Symphony of the Night (USA).iso"]))
            .await;

        assert_eq!(recorded_terms(&deduplicator), vec!["Castlevania - Symphony of the Night"]);
        assert!(report.stats.stopped);
        assert_eq!(report.stats.skipped, 1);
        assert!(report.warnings.is_empty());
        assert!(deduplicator.matcher().cache().is_empty());
        assert_eq!(report.resolution.decisions.len(), 1);
    }
}
