//! Filename analysis.
//!
//! Splits a ROM filename into the base title used for grouping,
//! the release region, and revision and edition hints.
//! Everything here is pure string processing.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::region::Region;

/// Matches a single parenthesized or bracketed tag group and captures its contents.
static TAG_GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\(\[]([^\(\)\[\]]*)[\)\]]").expect("Invalid tag group regex"));

static DISC_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:disc|disk|cd)\s*\d+").expect("Invalid disc tag regex"));

static REVISION_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:rev(?:ision)?\s*(?:\d[\d.]*[a-z]?|[a-z])|(?:version|ver|v)\s*\d[\d.]*)\b")
        .expect("Invalid revision tag regex")
});

static EDITION_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:gentei set|genteiban|limited edition|special edition|premium|collectors|deluxe|beta|proto(?:type)?|demo|sample|taikenban|value plus|greatest hits|platinum)",
    )
    .expect("Invalid edition tag regex")
});

/// Inline version text outside of tag groups, like "Version 3" or "v1.1".
static INLINE_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(?:version\s+\d+|v\d+(?:\.\d+)+)\b").expect("Invalid inline version regex"));

static TRAILING_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*-\s*\d+\s*$").expect("Invalid trailing number regex"));

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

static EXTENSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{1,5}$").expect("Invalid extension regex"));

/// Characters trimmed from both ends of a base title after tag removal.
const TITLE_TRIM_CHARS: &[char] = &[' ', '-', '_', ',', ';', ':'];

/// Result of analyzing one filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleInfo {
    /// Title with tags stripped. Disc markers are kept at the end.
    pub base_title: String,
    /// Case-folded and whitespace-collapsed base title.
    pub key: String,
    pub region: Region,
    /// Revision or version marker, e.g. `Rev 1` or `v1.1`.
    pub revision: Option<String>,
    pub disc: Option<String>,
    /// Edition and development tags such as `Beta` or `Limited Edition`.
    pub flags: Vec<String>,
}

impl TitleInfo {
    /// Revision and edition tags joined for display.
    #[must_use]
    pub fn version_info(&self) -> String {
        self.revision
            .iter()
            .chain(self.flags.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Analyze a ROM filename.
///
/// A trailing file extension is ignored if present.
/// If stripping leaves nothing, the literal filename becomes the base title.
#[must_use]
pub fn analyze(filename: &str) -> TitleInfo {
    let (stem, _) = split_extension(filename);

    let mut region = None;
    let mut revision = None;
    let mut disc = None;
    let mut flags = Vec::new();

    for capture in TAG_GROUP_RE.captures_iter(stem) {
        let contents = capture.get(1).map_or("", |m| m.as_str()).trim();
        if region.is_none() {
            region = contents.split(',').find_map(Region::from_token);
        }
        if disc.is_none() && DISC_TAG_RE.is_match(contents) {
            disc = Some(contents.to_string());
        } else if revision.is_none() && REVISION_TAG_RE.is_match(contents) {
            revision = Some(contents.to_string());
        } else if EDITION_TAG_RE.is_match(contents) {
            flags.push(contents.to_string());
        }
    }

    let stripped = TAG_GROUP_RE.replace_all(stem, " ");
    if revision.is_none() {
        revision = INLINE_VERSION_RE
            .find(&stripped)
            .map(|m| m.as_str().trim().to_string());
    }
    let stripped = INLINE_VERSION_RE.replace_all(&stripped, "");
    let stripped = TRAILING_NUMBER_RE.replace(&stripped, "");
    let title = WHITESPACE_RE.replace_all(&stripped, " ");
    let title = title.trim_matches(TITLE_TRIM_CHARS);

    let base_title = if title.is_empty() {
        filename.trim().to_string()
    } else if let Some(disc) = &disc {
        format!("{title} ({disc})")
    } else {
        title.to_string()
    };

    TitleInfo {
        key: normalize_title(&base_title),
        base_title,
        region: region.unwrap_or(Region::Unknown),
        revision,
        disc,
        flags,
    }
}

/// Region of a filename. The leftmost recognized region tag wins.
#[must_use]
pub fn detect_region(filename: &str) -> Region {
    TAG_GROUP_RE
        .captures_iter(filename)
        .filter_map(|capture| capture.get(1))
        .find_map(|m| m.as_str().split(',').find_map(Region::from_token))
        .unwrap_or(Region::Unknown)
}

/// Case-fold and collapse whitespace for comparison.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    WHITESPACE_RE.replace_all(title.trim(), " ").to_lowercase()
}

/// Split `filename` into stem and lowercase extension.
///
/// Only a short alphanumeric suffix counts as an extension,
/// so a bare title like `Super Mario Bros. (USA)` keeps its full text.
#[must_use]
pub fn split_extension(filename: &str) -> (&str, String) {
    match filename.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() && EXTENSION_RE.is_match(extension) => {
            (stem, extension.to_lowercase())
        }
        _ => (filename, String::new()),
    }
}

/// Reason a file entry cannot take part in grouping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupingInputInvalid {
    #[error("file entry has an empty path")]
    EmptyPath,
    #[error("file entry has an empty filename: {}", .0.display())]
    EmptyFilename(PathBuf),
}

/// One ROM file under consideration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub filename: String,
    /// Lowercase extension without the dot.
    pub extension: String,
    pub base_title: String,
    /// Normalized base title, the fallback grouping key.
    pub key: String,
    pub region: Region,
    pub revision: Option<String>,
    /// Set only when the matcher resolved one.
    pub canonical_identity: Option<String>,
}

impl FileEntry {
    /// Build an entry from a file path.
    pub fn from_path(path: &Path) -> Result<Self, GroupingInputInvalid> {
        if path.as_os_str().is_empty() {
            return Err(GroupingInputInvalid::EmptyPath);
        }
        let filename = crate::get_normalized_file_name(path)
            .map_err(|_| GroupingInputInvalid::EmptyFilename(path.to_path_buf()))?;
        let entry = Self::new(path.to_path_buf(), &filename);
        entry.validate()?;
        Ok(entry)
    }

    /// Build an entry from an already known filename without touching the filesystem.
    #[must_use]
    pub fn new(path: PathBuf, filename: &str) -> Self {
        let info = analyze(filename);
        let (_, extension) = split_extension(filename);
        Self {
            path,
            filename: filename.to_string(),
            extension,
            base_title: info.base_title,
            key: info.key,
            region: info.region,
            revision: info.revision,
            canonical_identity: None,
        }
    }

    pub fn validate(&self) -> Result<(), GroupingInputInvalid> {
        if self.path.as_os_str().is_empty() {
            return Err(GroupingInputInvalid::EmptyPath);
        }
        if self.filename.trim().is_empty() || self.key.is_empty() {
            return Err(GroupingInputInvalid::EmptyFilename(self.path.clone()));
        }
        Ok(())
    }

    /// Canonical identity if resolved, otherwise the normalized base title.
    #[must_use]
    pub fn grouping_key(&self) -> String {
        self.canonical_identity
            .as_deref()
            .map_or_else(|| self.key.clone(), normalize_title)
    }

    /// Platform hint used for cache keys and lookups.
    #[must_use]
    pub fn platform(&self) -> &str {
        if self.extension.is_empty() { "unknown" } else { &self.extension }
    }
}

impl fmt::Display for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.filename, self.region)
    }
}
