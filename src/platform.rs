//! Recognized ROM extensions and the extension to platform id table.
//!
//! Platform ids are IGDB platform identifiers.
//! They scope metadata searches so that a title is matched against the right console.

use std::collections::{HashMap, HashSet};

/// File extensions recognized as ROM files, lowercase without the dot.
pub const ROM_EXTENSIONS: &[&str] = &[
    // Archives
    "zip", "7z", "rar", //
    // Nintendo
    "nes", "snes", "smc", "sfc", "gb", "gbc", "gba", "nds", "3ds", "cia", "n64", "z64", "v64", "ndd", "gcm", "gcz",
    "rvz", "wbfs", "xci", "nsp", "vb", "lnx", "ngp", "ngc", //
    // Sega
    "md", "gen", "smd", "gg", "sms", "32x", "sat", "gdi", //
    // Sony
    "bin", "iso", "cue", "chd", "pbp", "cso", "ciso", //
    // NEC
    "pce", "sgx", //
    // Atari
    "a26", "a78", "st", "d64", //
    // Other consoles
    "col", "int", "vec", "ws", "wsc", //
    // Disk images
    "img", "ima", "dsk", "adf", "mdf", "nrg", //
    // Tape and Spectrum
    "tap", "tzx", "sna", "z80",
];

/// Built-in extension to platform id mapping.
const PLATFORM_MAPPING: &[(&str, &[u32])] = &[
    ("nes", &[18]),
    ("snes", &[19]),
    ("smc", &[19]),
    ("sfc", &[19]),
    ("gb", &[33]),
    ("gbc", &[22]),
    ("gba", &[24]),
    ("nds", &[20]),
    ("3ds", &[37]),
    ("cia", &[37]),
    ("n64", &[4]),
    ("z64", &[4]),
    ("v64", &[4]),
    ("ndd", &[4]),
    ("gcm", &[21]),
    ("gcz", &[21]),
    ("rvz", &[5, 21]),
    ("wbfs", &[5]),
    ("xci", &[130]),
    ("nsp", &[130]),
    ("vb", &[87]),
    ("lnx", &[28]),
    ("ngp", &[119]),
    ("ngc", &[120]),
    ("md", &[29]),
    ("gen", &[29]),
    ("smd", &[29]),
    ("gg", &[35]),
    ("sms", &[64]),
    ("32x", &[30]),
    ("sat", &[32]),
    ("gdi", &[23]),
    ("iso", &[7, 8, 9, 21, 38, 39]),
    ("bin", &[7, 8, 9, 27, 38, 39]),
    ("cue", &[7, 8, 9, 27, 38, 39]),
    ("chd", &[7, 8, 9, 27, 38, 39]),
    ("pbp", &[7, 8]),
    ("cso", &[7, 8]),
    ("ciso", &[8, 21]),
    ("mdf", &[8, 38, 39]),
    ("nrg", &[8, 38, 39]),
    ("pce", &[86]),
    ("sgx", &[86]),
    ("a26", &[59]),
    ("a78", &[60]),
    ("st", &[63]),
    ("col", &[68]),
    ("int", &[67]),
    ("vec", &[70]),
    ("ws", &[57]),
    ("wsc", &[57]),
];

/// Platform hint for one file: its extension and the platform ids it may belong to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlatformHint {
    pub extension: String,
    pub platform_ids: Vec<u32>,
}

/// Extension to platform id lookup.
#[derive(Debug, Clone)]
pub struct PlatformTable {
    platforms: HashMap<String, Vec<u32>>,
}

impl PlatformTable {
    #[must_use]
    pub fn new(platforms: HashMap<String, Vec<u32>>) -> Self {
        Self { platforms }
    }

    /// Platform hint for a file extension. Unknown extensions get no platform ids.
    #[must_use]
    pub fn hint(&self, extension: &str) -> PlatformHint {
        let extension = normalize_extension(extension);
        let platform_ids = self.platforms.get(&extension).cloned().unwrap_or_default();
        PlatformHint {
            extension,
            platform_ids,
        }
    }
}

impl Default for PlatformTable {
    fn default() -> Self {
        let platforms = PLATFORM_MAPPING
            .iter()
            .map(|(extension, ids)| ((*extension).to_string(), ids.to_vec()))
            .collect();
        Self { platforms }
    }
}

/// The set of extensions in scope: the built-in ROM extensions plus `extra`.
#[must_use]
pub fn extension_set(extra: &[String]) -> HashSet<String> {
    ROM_EXTENSIONS
        .iter()
        .map(|extension| (*extension).to_string())
        .chain(extra.iter().map(|extension| normalize_extension(extension)))
        .filter(|extension| !extension.is_empty())
        .collect()
}

/// Lowercase an extension and remove a leading dot.
#[must_use]
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}
