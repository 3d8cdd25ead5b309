use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use colored::Colorize;
use itertools::Itertools;
use walkdir::WalkDir;

use rom_dedupe::aliases::AliasTable;
use rom_dedupe::analyzer::split_extension;
use rom_dedupe::cache::IdentityCache;
use rom_dedupe::database::Database;
use rom_dedupe::lookup::{IgdbService, LookupClient, MetadataBackend, TheGamesDbService};
use rom_dedupe::matcher::ProgressiveMatcher;
use rom_dedupe::pipeline::{Deduplicator, RunReport, StopSignal};
use rom_dedupe::resolve::{Decision, FileDecision};
use rom_dedupe::{print_error, print_warning};

use crate::config::Config;
use crate::credentials::fetch_igdb_token;
use crate::logger::FileLogger;
use crate::{Action, Args, Service};

/// Directory under each scanned root that receives moved duplicates.
const DELETE_DIR_NAME: &str = "to_delete";

pub struct RomDedupe {
    config: Config,
    logger: Option<FileLogger>,
}

/// Results of applying the removal action.
#[derive(Debug, Default)]
struct ActionStats {
    processed: usize,
    failed: usize,
}

impl RomDedupe {
    pub fn new(args: Args) -> Result<Self> {
        let config = Config::from_args(args)?;
        let logger = if config.dryrun { None } else { Some(FileLogger::new()?) };
        Ok(Self { config, logger })
    }

    pub async fn run(mut self) -> Result<()> {
        let start = Instant::now();
        if let Some(logger) = &mut self.logger {
            logger.log_init(&self.config);
        }
        if self.config.verbose {
            self.print_settings();
        }

        let files = self.gather_files();
        if files.is_empty() {
            println!("No ROM files found");
            return Ok(());
        }
        if self.config.verbose {
            println!("Found {} ROM file(s)", files.len());
        }

        let cache = Arc::new(IdentityCache::new());
        let database = match Database::open_default() {
            Ok(database) => Some(database),
            Err(error) => {
                print_warning!("Identity cache unavailable, continuing without it: {error}");
                None
            }
        };
        if let Some(database) = &database {
            match cache.load_from(database) {
                Ok(count) if self.config.verbose => println!("Loaded {count} cached identities"),
                Ok(_) => {}
                Err(error) => print_warning!("Failed to load identity cache: {error}"),
            }
        }

        let stop = StopSignal::new();
        let stop_flag = stop.flag();
        ctrlc::set_handler(move || {
            if stop_flag.load(std::sync::atomic::Ordering::SeqCst) {
                // Second Ctrl+C - force exit
                std::process::exit(130);
            }
            println!("\n{}", "Received Ctrl+C, finishing current lookups...".yellow().bold());
            stop_flag.store(true, std::sync::atomic::Ordering::SeqCst);
        })
        .context("Failed to set Ctrl+C handler")?;

        let matcher = ProgressiveMatcher::new(Arc::clone(&cache), self.metadata_client().await)
            .with_aliases(AliasTable::builtin().with_aliases(&self.config.aliases))
            .with_relaxations(self.config.relaxations.clone());
        let deduplicator = Deduplicator::new(matcher, self.config.policy.clone())
            .with_concurrency(self.config.concurrency)
            .with_stop_signal(stop.clone())
            .with_progress(true);

        let paths: Vec<PathBuf> = files.keys().cloned().sorted().collect();
        let report = deduplicator.run(&paths).await;

        if let Some(database) = &database {
            match cache.save_to(database) {
                Ok(count) if self.config.verbose && count > 0 => println!("Saved {count} identities to cache"),
                Ok(_) => {}
                Err(error) => print_warning!("Failed to save identity cache: {error}"),
            }
        }

        self.print_report(&report);

        let removals = report.removals();
        let mut action_stats = ActionStats::default();
        if removals.is_empty() {
            println!("{}", "No duplicates found".green());
        } else if self.config.dryrun {
            println!("{}", format!("\n[DRYRUN] {} file(s) would be removed", removals.len()).magenta());
        } else if report.stats.stopped {
            println!("{}", "\nStopped by user, no files were changed".yellow());
        } else if self.config.yes || confirm(&format!("\n{} {} file(s)? (y/n): ", self.action_verb(), removals.len()))? {
            action_stats = self.apply_action(&removals, &files, &stop);
        } else {
            println!("Skipped");
        }

        Self::print_summary(&report, &action_stats, start);
        if let Some(logger) = &mut self.logger {
            logger.log_stats(&report.stats, action_stats.processed, action_stats.failed, start.elapsed());
        }
        Ok(())
    }

    /// Collect ROM files from all input paths.
    ///
    /// Returns each file mapped to the scanned root directory it was found under.
    fn gather_files(&self) -> HashMap<PathBuf, PathBuf> {
        let mut files = HashMap::new();
        for root in &self.config.paths {
            if root.is_file() {
                let extension = rom_dedupe::path_to_file_extension_string(root);
                if self.config.extensions.contains(&extension) {
                    let parent = root.parent().map_or_else(|| root.clone(), Path::to_path_buf);
                    files.insert(root.clone(), parent);
                }
                continue;
            }

            let walker = if self.config.recurse {
                WalkDir::new(root)
            } else {
                WalkDir::new(root).max_depth(1)
            };

            let found = walker
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !(rom_dedupe::is_hidden(e) || e.file_name() == DELETE_DIR_NAME))
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter(|e| {
                    let extension = rom_dedupe::path_to_file_extension_string(e.path());
                    self.config.extensions.contains(&extension)
                })
                .map(walkdir::DirEntry::into_path);

            for path in found {
                files.entry(path).or_insert_with(|| root.clone());
            }
        }
        files
    }

    /// Build the lookup client for the configured service.
    ///
    /// Returns `None` when offline or credentials are missing.
    async fn metadata_client(&self) -> Option<LookupClient<MetadataBackend>> {
        if self.config.offline {
            return None;
        }
        let credentials = &self.config.credentials;
        let backend = match self.config.service {
            Service::Igdb => {
                let Some(client_id) = credentials.igdb_client_id.as_deref() else {
                    print_warning!("IGDB_CLIENT_ID not set, matching by filename and aliases only");
                    return None;
                };
                let token = match (&credentials.igdb_access_token, &credentials.igdb_client_secret) {
                    (Some(token), _) => token.clone(),
                    (None, Some(secret)) => match fetch_igdb_token(client_id, secret).await {
                        Ok(token) => token,
                        Err(error) => {
                            print_warning!("Failed to get IGDB access token, matching offline: {error}");
                            return None;
                        }
                    },
                    (None, None) => {
                        print_warning!(
                            "IGDB_ACCESS_TOKEN or IGDB_CLIENT_SECRET not set, matching by filename and aliases only"
                        );
                        return None;
                    }
                };
                IgdbService::new(client_id, &token).map(MetadataBackend::Igdb)
            }
            Service::TheGamesDb => {
                let Some(api_key) = credentials.tgdb_api_key.as_deref() else {
                    print_warning!("TGDB_API_KEY not set, matching by filename and aliases only");
                    return None;
                };
                TheGamesDbService::new(api_key).map(MetadataBackend::TheGamesDb)
            }
        };

        match backend {
            Ok(backend) => Some(LookupClient::new(backend, self.config.lookup)),
            Err(error) => {
                print_error!("{error}");
                None
            }
        }
    }

    fn print_settings(&self) {
        let priority = self.config.policy.region_priority.iter().map(|r| r.as_str()).join(", ");
        let preserve = self.config.policy.preserve_region_only.iter().map(|r| r.as_str()).join(", ");
        println!("{}", "Settings:".bold());
        println!("  Region priority: {priority}");
        println!("  Preserve:        {preserve}");
        println!("  Action:          {}", self.config.action);
        println!("  Service:         {}", self.config.service);
        println!("  Offline:         {}", rom_dedupe::colorize_bool(self.config.offline));
        println!("  Recurse:         {}", rom_dedupe::colorize_bool(self.config.recurse));
        println!("  Dryrun:          {}", rom_dedupe::colorize_bool(self.config.dryrun));
    }

    fn print_report(&mut self, report: &RunReport) {
        for (path, error) in &report.resolution.rejected {
            print_warning!("Skipped {}: {error}", path.display());
        }
        for warning in &report.warnings {
            if self.config.verbose {
                print_warning!("{warning}");
            }
            if let Some(logger) = &mut self.logger {
                logger.log_warning(warning);
            }
        }
        if !self.config.verbose && !report.warnings.is_empty() {
            print_warning!("{} title(s) could not be matched, use --verbose for details", report.warnings.len());
        }

        for (key, decisions) in &report.resolution.decisions.iter().chunk_by(|d| d.group_key.as_str()) {
            let decisions: Vec<&FileDecision> = decisions.collect();
            if let Some(logger) = &mut self.logger {
                for decision in &decisions {
                    logger.log_decision(decision);
                }
            }
            if decisions.len() < 2 && !self.config.verbose {
                continue;
            }
            println!("{}", key.bold());
            for decision in decisions {
                let label = match decision.decision {
                    Decision::Keep => "  KEEP  ".green(),
                    Decision::Remove => "  REMOVE".red(),
                };
                let reason = format!("({})", decision.reason);
                println!("{label} {}  {}", decision.entry, reason.dimmed());
            }
        }
    }

    fn apply_action(&mut self, removals: &[PathBuf], roots: &HashMap<PathBuf, PathBuf>, stop: &StopSignal) -> ActionStats {
        let action = self.config.action;
        let mut stats = ActionStats::default();
        for path in removals {
            if stop.is_stopped() {
                println!("{}", "Stopped by user".yellow());
                break;
            }
            let result = match action {
                Action::Move => roots
                    .get(path)
                    .context("File is not under a scanned directory")
                    .and_then(|root| move_to_delete_dir(root, path))
                    .map(Some),
                Action::Trash => trash::delete(path)
                    .map(|()| None)
                    .map_err(|e| anyhow::anyhow!("Failed to move to trash: {e}")),
                Action::Delete => fs::remove_file(path)
                    .map(|()| None)
                    .context("Failed to delete file"),
            };
            match result {
                Ok(target) => {
                    stats.processed += 1;
                    println!(
                        "{}: {}",
                        self.action_verb().magenta(),
                        rom_dedupe::path_to_string_relative(path)
                    );
                    if let Some(logger) = &mut self.logger {
                        logger.log_action(path, action, target.as_deref());
                    }
                }
                Err(error) => {
                    stats.failed += 1;
                    print_error!("{}: {error:#}", path.display());
                    if let Some(logger) = &mut self.logger {
                        logger.log_failure(path, action, &format!("{error:#}"));
                    }
                }
            }
        }
        stats
    }

    const fn action_verb(&self) -> &'static str {
        match self.config.action {
            Action::Move => "Move",
            Action::Trash => "Trash",
            Action::Delete => "Delete",
        }
    }

    fn print_summary(report: &RunReport, action_stats: &ActionStats, start: Instant) {
        let stats = &report.stats;
        println!("{}", "\n--- Summary ---".bold().magenta());
        println!("Files scanned:          {}", stats.files);
        println!("Groups:                 {}", stats.groups);
        println!("Duplicate groups:       {}", stats.duplicate_groups);
        println!("Cross-language merges:  {}", stats.cross_language_merges);
        println!("Lookups:                {}", stats.lookups);
        println!("Cache hits:             {}", stats.cache_hits);
        println!("Alias hits:             {}", stats.alias_hits);
        println!(
            "Warnings:               {}",
            if stats.warnings > 0 {
                stats.warnings.to_string().yellow()
            } else {
                "0".normal()
            }
        );
        println!("Marked for removal:     {}", stats.remove);
        println!("Files processed:        {}", action_stats.processed);
        println!(
            "Files failed:           {}",
            if action_stats.failed > 0 {
                action_stats.failed.to_string().red()
            } else {
                "0".normal()
            }
        );
        if stats.stopped {
            println!("Not looked up:          {}", stats.skipped);
        }
        println!("Total time: {}", rom_dedupe::format_duration(start.elapsed()));
    }
}

/// Move `path` into the delete directory of `root`, keeping its relative location.
///
/// Returns the new path.
fn move_to_delete_dir(root: &Path, path: &Path) -> Result<PathBuf> {
    let target_dir = deletion_dir(root, path);
    fs::create_dir_all(&target_dir)
        .with_context(|| format!("Failed to create directory {}", target_dir.display()))?;

    let filename = rom_dedupe::path_to_filename_string(path);
    let (stem, extension) = split_extension(&filename);
    let target = rom_dedupe::get_unique_path(&target_dir, &filename, stem, &extension);
    fs::rename(path, &target).with_context(|| format!("Failed to move file to {}", target.display()))?;
    Ok(target)
}

/// Directory a removed file is moved to: `<root>/to_delete/<relative parent>`.
fn deletion_dir(root: &Path, path: &Path) -> PathBuf {
    let relative_parent = path
        .strip_prefix(root)
        .ok()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new(""));
    root.join(DELETE_DIR_NAME).join(relative_parent)
}

/// Ask the user a yes/no question on stdin.
fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt.magenta());
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
