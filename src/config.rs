use std::path::PathBuf;
use std::sync::LazyLock;

const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

/// Identity cache database filename.
const CACHE_DATABASE_FILENAME: &str = "identity_cache.db";

/// Path to the user config file: `$HOME/.config/rom-dedupe.toml`
///
/// Returns `None` if the home directory cannot be determined.
pub static CONFIG_PATH: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    let home_dir = dirs::home_dir()?;
    Some(home_dir.join(".config").join(format!("{PROJECT_NAME}.toml")))
});

/// Path to the persistent identity cache.
///
/// Uses the platform-specific local data directory:
/// - Windows: `%LOCALAPPDATA%\rom-dedupe\identity_cache.db`
/// - macOS: `~/Library/Application Support/rom-dedupe/identity_cache.db`
/// - Linux: `~/.local/share/rom-dedupe/identity_cache.db`
pub static CACHE_DATABASE_PATH: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PROJECT_NAME)
        .join(CACHE_DATABASE_FILENAME)
});
