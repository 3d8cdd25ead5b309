use std::fs;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;

use rom_dedupe::matcher::MatchWarning;
use rom_dedupe::pipeline::RunStats;
use rom_dedupe::resolve::FileDecision;

use crate::Action;
use crate::config::Config;

/// Simple file logger for a deduplication run with buffered writes
pub struct FileLogger {
    writer: BufWriter<File>,
}

impl FileLogger {
    /// Create a new file logger, writing to ~/logs/rom-dedupe/romdedupe_<timestamp>.log
    pub(crate) fn new() -> Result<Self> {
        let home_dir = dirs::home_dir().context("Failed to get home directory")?;
        let log_dir = home_dir.join("logs").join(env!("CARGO_PKG_NAME"));

        if !log_dir.exists() {
            fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
        }

        let log_path = log_dir.join(format!(
            "{}_{}.log",
            env!("CARGO_BIN_NAME"),
            Local::now().format("%Y-%m-%d_%H-%M-%S")
        ));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn timestamp() -> String {
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Log when starting the program
    pub(crate) fn log_init(&mut self, config: &Config) {
        for path in &config.paths {
            let _ = writeln!(self.writer, "[{}] INIT \"{}\"", Self::timestamp(), path.display());
        }
        let priority: Vec<&str> = config.policy.region_priority.iter().map(|r| r.as_str()).collect();
        let preserve: Vec<&str> = config.policy.preserve_region_only.iter().map(|r| r.as_str()).collect();
        let _ = writeln!(self.writer, "  region_priority: {priority:?}");
        let _ = writeln!(self.writer, "  preserve_regions: {preserve:?}");
        if !config.policy.extra_extensions.is_empty() {
            let _ = writeln!(self.writer, "  extra_extensions: {:?}", config.policy.extra_extensions);
        }
        let _ = writeln!(self.writer, "  action: {}", config.action);
        let _ = writeln!(self.writer, "  service: {}", config.service);
        let _ = writeln!(self.writer, "  offline: {}", config.offline);
        let _ = writeln!(self.writer, "  recurse: {}", config.recurse);
        let _ = writeln!(self.writer, "  concurrency: {}", config.concurrency);
        let _ = writeln!(self.writer, "  dryrun: {}", config.dryrun);
        let _ = self.writer.flush();
    }

    pub(crate) fn log_decision(&mut self, decision: &FileDecision) {
        let _ = writeln!(
            self.writer,
            "[{}] {:<6} \"{}\" | group: {} | {}",
            Self::timestamp(),
            decision.decision,
            decision.entry.path.display(),
            decision.group_key,
            decision.reason
        );
    }

    pub(crate) fn log_warning(&mut self, warning: &MatchWarning) {
        let _ = writeln!(self.writer, "[{}] WARN   {warning}", Self::timestamp());
    }

    /// Log a completed file action
    pub(crate) fn log_action(&mut self, file_path: &Path, action: Action, target: Option<&Path>) {
        let target = target.map_or_else(String::new, |target| format!(" -> \"{}\"", target.display()));
        let _ = writeln!(
            self.writer,
            "[{}] {:<6} \"{}\"{target}",
            Self::timestamp(),
            action.to_string().to_uppercase(),
            file_path.display()
        );
        let _ = self.writer.flush();
    }

    /// Log when a file action fails
    pub(crate) fn log_failure(&mut self, file_path: &Path, action: Action, error: &str) {
        let _ = writeln!(
            self.writer,
            "[{}] ERROR  {} \"{}\" | {error}",
            Self::timestamp(),
            action.to_string().to_uppercase(),
            file_path.display()
        );
        let _ = self.writer.flush();
    }

    /// Log final statistics
    pub(crate) fn log_stats(&mut self, stats: &RunStats, processed: usize, failed: usize, duration: Duration) {
        let _ = writeln!(self.writer, "[{}] STATISTICS", Self::timestamp());
        let _ = writeln!(self.writer, "  Files scanned:          {}", stats.files);
        let _ = writeln!(self.writer, "  Groups:                 {}", stats.groups);
        let _ = writeln!(self.writer, "  Duplicate groups:       {}", stats.duplicate_groups);
        let _ = writeln!(self.writer, "  Cross-language merges:  {}", stats.cross_language_merges);
        let _ = writeln!(self.writer, "  Lookups:                {}", stats.lookups);
        let _ = writeln!(self.writer, "  Cache hits:             {}", stats.cache_hits);
        let _ = writeln!(self.writer, "  Alias hits:             {}", stats.alias_hits);
        let _ = writeln!(self.writer, "  Warnings:               {}", stats.warnings);
        let _ = writeln!(self.writer, "  Marked for removal:     {}", stats.remove);
        let _ = writeln!(self.writer, "  Files processed:        {processed}");
        let _ = writeln!(self.writer, "  Files failed:           {failed}");
        if stats.stopped {
            let _ = writeln!(self.writer, "  Stopped by user, {} titles not looked up", stats.skipped);
        }
        let _ = writeln!(self.writer, "  Total time: {}", rom_dedupe::format_duration(duration));
        let _ = writeln!(self.writer, "[{}] END", Self::timestamp());
        let _ = self.writer.flush();
    }
}
