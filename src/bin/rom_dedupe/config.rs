//! Configuration for `RomDedupe`.
//!
//! Handles reading configuration from CLI arguments, the user config file,
//! and service credentials from environment variables.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use itertools::Itertools;
use serde::Deserialize;

use rom_dedupe::lookup::LookupSettings;
use rom_dedupe::matcher::{DEFAULT_RELAXATIONS, Relaxation};
use rom_dedupe::platform::{extension_set, normalize_extension};
use rom_dedupe::region::Region;
use rom_dedupe::resolve::ResolutionPolicy;

use crate::{Action, Args, Service};

/// Config from the user config file.
#[derive(Debug, Default, Deserialize)]
pub struct RomDedupeConfig {
    #[serde(default)]
    action: Option<Action>,
    #[serde(default)]
    aliases: HashMap<String, String>,
    #[serde(default)]
    base_delay_ms: Option<u64>,
    #[serde(default)]
    concurrency: Option<usize>,
    #[serde(default)]
    dryrun: bool,
    #[serde(default)]
    extensions: Vec<String>,
    #[serde(default)]
    igdb_access_token: Option<String>,
    #[serde(default)]
    igdb_client_id: Option<String>,
    #[serde(default)]
    igdb_client_secret: Option<String>,
    #[serde(default)]
    max_attempts: Option<u32>,
    #[serde(default)]
    offline: bool,
    #[serde(default)]
    pub(crate) paths: Vec<PathBuf>,
    #[serde(default)]
    preserve_regions: Option<Vec<Region>>,
    #[serde(default)]
    recurse: bool,
    #[serde(default)]
    region_priority: Vec<Region>,
    #[serde(default)]
    relaxations: Vec<Relaxation>,
    #[serde(default)]
    request_interval_ms: Option<u64>,
    #[serde(default)]
    service: Option<Service>,
    #[serde(default)]
    tgdb_api_key: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    verbose: bool,
}

/// Wrapper needed for parsing the config file section.
#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    #[serde(default)]
    romdedupe: RomDedupeConfig,
}

/// Metadata service credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub(crate) igdb_client_id: Option<String>,
    pub(crate) igdb_access_token: Option<String>,
    pub(crate) igdb_client_secret: Option<String>,
    pub(crate) tgdb_api_key: Option<String>,
}

/// Final config created from CLI arguments and user config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) action: Action,
    pub(crate) aliases: HashMap<String, String>,
    pub(crate) concurrency: usize,
    pub(crate) credentials: Credentials,
    pub(crate) dryrun: bool,
    pub(crate) extensions: HashSet<String>,
    pub(crate) lookup: LookupSettings,
    pub(crate) offline: bool,
    pub(crate) paths: Vec<PathBuf>,
    pub(crate) policy: ResolutionPolicy,
    pub(crate) recurse: bool,
    pub(crate) relaxations: Vec<Relaxation>,
    pub(crate) service: Service,
    pub(crate) verbose: bool,
    pub(crate) yes: bool,
}

impl RomDedupeConfig {
    /// Try to read user config from the file if it exists.
    /// Otherwise, fall back to default config.
    ///
    /// # Errors
    /// Returns an error if config file exists but cannot be read or parsed.
    pub(crate) fn get_user_config() -> Result<Self> {
        let Some(path) = rom_dedupe::config::CONFIG_PATH.as_deref() else {
            return Ok(Self::default());
        };

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse config file {}:\n{e}", path.display())),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {error}",
                path.display()
            )),
        }
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the TOML string is invalid.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str::<UserConfig>(toml_str)
            .map(|config| config.romdedupe)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {e}"))
    }
}

impl Config {
    /// Create config from given command line args, user config file and environment.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be read or parsed,
    /// or an input path does not exist.
    pub fn from_args(args: Args) -> Result<Self> {
        let user_config = RomDedupeConfig::get_user_config()?;
        Self::build(args, user_config, |name| std::env::var(name).ok())
    }

    /// Combine CLI args and user config. `env` looks up credential environment variables.
    pub(crate) fn build(args: Args, user_config: RomDedupeConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let input_paths = if args.paths.is_empty() {
            user_config.paths.clone()
        } else {
            args.paths.clone()
        };
        let paths = if input_paths.is_empty() {
            vec![rom_dedupe::resolve_input_path(None)?]
        } else {
            input_paths
                .iter()
                .map(|path| rom_dedupe::resolve_input_path(Some(path)))
                .collect::<Result<Vec<_>>>()?
        };

        let extra_extensions: Vec<String> = user_config
            .extensions
            .iter()
            .chain(&args.extension)
            .map(|extension| normalize_extension(extension))
            .filter(|extension| !extension.is_empty())
            .unique()
            .collect();
        let extensions = extension_set(&extra_extensions);

        let mut policy = ResolutionPolicy {
            extra_extensions,
            ..ResolutionPolicy::default()
        };
        let region_priority = if args.region_priority.is_empty() {
            user_config.region_priority
        } else {
            args.region_priority
        };
        if !region_priority.is_empty() {
            policy.region_priority = region_priority.into_iter().unique().collect();
        }
        if !args.preserve.is_empty() {
            policy.preserve_region_only = args.preserve.into_iter().collect();
        } else if let Some(preserve) = user_config.preserve_regions {
            policy.preserve_region_only = preserve.into_iter().collect::<BTreeSet<_>>();
        }

        let mut lookup = LookupSettings::default();
        if let Some(interval) = user_config.request_interval_ms {
            lookup.request_interval = Duration::from_millis(interval);
        }
        if let Some(max_attempts) = user_config.max_attempts {
            lookup.retry.max_attempts = max_attempts.max(1);
        }
        if let Some(base_delay) = user_config.base_delay_ms {
            lookup.retry.base_delay = Duration::from_millis(base_delay);
        }
        if let Some(timeout) = user_config.timeout_secs {
            lookup.timeout = Duration::from_secs(timeout.max(1));
        }

        let relaxations = if user_config.relaxations.is_empty() {
            DEFAULT_RELAXATIONS.to_vec()
        } else {
            user_config.relaxations
        };

        let credentials = Credentials {
            igdb_client_id: env("IGDB_CLIENT_ID").or(user_config.igdb_client_id),
            igdb_access_token: env("IGDB_ACCESS_TOKEN").or(user_config.igdb_access_token),
            igdb_client_secret: env("IGDB_CLIENT_SECRET").or(user_config.igdb_client_secret),
            tgdb_api_key: env("TGDB_API_KEY").or(user_config.tgdb_api_key),
        }
        .trimmed();

        Ok(Self {
            action: args.action.or(user_config.action).unwrap_or_default(),
            aliases: user_config.aliases,
            concurrency: args
                .concurrency
                .or(user_config.concurrency)
                .unwrap_or_else(num_cpus::get_physical)
                .max(1),
            credentials,
            dryrun: args.print || user_config.dryrun,
            extensions,
            lookup,
            offline: args.offline || user_config.offline,
            paths,
            policy,
            recurse: args.recurse || user_config.recurse,
            relaxations,
            service: args.service.or(user_config.service).unwrap_or_default(),
            verbose: args.verbose || user_config.verbose,
            yes: args.yes,
        })
    }
}

impl Credentials {
    /// Drop blank values so an empty environment variable counts as unset.
    fn trimmed(self) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            igdb_client_id: clean(self.igdb_client_id),
            igdb_access_token: clean(self.igdb_access_token),
            igdb_client_secret: clean(self.igdb_client_secret),
            tgdb_api_key: clean(self.tgdb_api_key),
        }
    }
}
