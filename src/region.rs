//! Release regions recognized in ROM filename tags.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Release territory of a ROM file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub enum Region {
    Usa,
    Europe,
    Japan,
    World,
    Unknown,
}

/// Default preference order, highest first.
pub const DEFAULT_REGION_PRIORITY: [Region; 4] = [Region::Usa, Region::Europe, Region::Japan, Region::World];

impl Region {
    /// Match a single tag token such as `USA`, `Europe`, `J` or `jpn`.
    ///
    /// Returns `None` for anything that is not a region marker,
    /// so language and revision tags fall through.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "usa" | "us" | "u" => Some(Self::Usa),
            "europe" | "eur" | "eu" | "e" => Some(Self::Europe),
            "japan" | "jpn" | "jp" | "j" => Some(Self::Japan),
            "world" | "w" => Some(Self::World),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Usa => "USA",
            Self::Europe => "Europe",
            Self::Japan => "Japan",
            Self::World => "World",
            Self::Unknown => "Unknown",
        }
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("unknown") {
            return Ok(Self::Unknown);
        }
        Self::from_token(value).ok_or_else(|| format!("Unknown region: '{value}'"))
    }
}

impl TryFrom<String> for Region {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod region_tests {
    use super::*;

    #[test]
    fn full_names_are_case_insensitive() {
        assert_eq!(Region::from_token("USA"), Some(Region::Usa));
        assert_eq!(Region::from_token("usa"), Some(Region::Usa));
        assert_eq!(Region::from_token("Japan"), Some(Region::Japan));
        assert_eq!(Region::from_token("JAPAN"), Some(Region::Japan));
        assert_eq!(Region::from_token("EUROPE"), Some(Region::Europe));
        assert_eq!(Region::from_token("World"), Some(Region::World));
    }

    #[test]
    fn single_letter_codes() {
        assert_eq!(Region::from_token("U"), Some(Region::Usa));
        assert_eq!(Region::from_token("E"), Some(Region::Europe));
        assert_eq!(Region::from_token("J"), Some(Region::Japan));
        assert_eq!(Region::from_token("W"), Some(Region::World));
    }

    #[test]
    fn abbreviations() {
        assert_eq!(Region::from_token("US"), Some(Region::Usa));
        assert_eq!(Region::from_token("EUR"), Some(Region::Europe));
        assert_eq!(Region::from_token("JPN"), Some(Region::Japan));
        assert_eq!(Region::from_token(" jp "), Some(Region::Japan));
    }

    #[test]
    fn non_region_tokens() {
        assert_eq!(Region::from_token("Rev 1"), None);
        assert_eq!(Region::from_token("En"), None);
        assert_eq!(Region::from_token("Proto"), None);
        assert_eq!(Region::from_token(""), None);
        assert_eq!(Region::from_token("unknown"), None);
    }

    #[test]
    fn parse_accepts_unknown() {
        assert_eq!("unknown".parse::<Region>(), Ok(Region::Unknown));
        assert_eq!("Europe".parse::<Region>(), Ok(Region::Europe));
        assert!("Mars".parse::<Region>().is_err());
    }

    #[test]
    fn deserializes_from_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            regions: Vec<Region>,
        }
        let wrapper: Wrapper = toml::from_str(r#"regions = ["USA", "japan", "E"]"#).unwrap();
        assert_eq!(wrapper.regions, vec![Region::Usa, Region::Japan, Region::Europe]);
    }

    #[test]
    fn display_uses_canonical_names() {
        assert_eq!(Region::Usa.to_string(), "USA");
        assert_eq!(Region::Japan.to_string(), "Japan");
        assert_eq!(Region::Unknown.to_string(), "Unknown");
    }
}
