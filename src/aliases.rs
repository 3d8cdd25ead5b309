//! Cross-regional title aliases.
//!
//! Maps well-known localized titles to the name used for grouping,
//! so common regional pairs merge even without a metadata service.

use std::collections::HashMap;

use crate::analyzer::normalize_title;

/// Built-in aliases: regional title to canonical title.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    // Capcom
    ("Biohazard", "Resident Evil"),
    ("Biohazard 2", "Resident Evil 2"),
    ("Biohazard 3", "Resident Evil 3"),
    ("Rockman", "Mega Man"),
    ("Rockman 2", "Mega Man 2"),
    ("Rockman 3", "Mega Man 3"),
    ("Rockman 4", "Mega Man 4"),
    ("Rockman 5", "Mega Man 5"),
    ("Rockman 6", "Mega Man 6"),
    ("Rockman X", "Mega Man X"),
    ("Street Fighter Zero", "Street Fighter Alpha"),
    ("Street Fighter Zero 2", "Street Fighter Alpha 2"),
    ("Street Fighter Zero 3", "Street Fighter Alpha 3"),
    // Square and Enix
    ("Seiken Densetsu", "Final Fantasy Adventure"),
    ("Seiken Densetsu 2", "Secret of Mana"),
    ("Seiken Densetsu 3", "Trials of Mana"),
    ("Dragon Quest", "Dragon Warrior"),
    ("Dragon Quest II", "Dragon Warrior II"),
    ("Dragon Quest III", "Dragon Warrior III"),
    ("Dragon Quest IV", "Dragon Warrior IV"),
    // Nintendo
    ("Mario no Super Picross", "Mario's Super Picross"),
    ("Zelda no Densetsu", "The Legend of Zelda"),
    // Konami
    ("Akumajou Dracula", "Castlevania"),
    ("Akumajou Dracula X", "Castlevania Dracula X"),
    ("Probotector", "Contra"),
    ("Nemesis", "Gradius"),
    ("Winning Eleven", "Pro Evolution Soccer"),
    // Others
    ("Dyna Blaster", "Bomberman"),
    ("Puck Man", "Pac-Man"),
    ("Jikkyou Powerful Pro Yakyuu", "Power Pros"),
];

/// Exact-title alias lookup.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    aliases: HashMap<String, String>,
}

impl AliasTable {
    /// Table with the built-in aliases.
    #[must_use]
    pub fn builtin() -> Self {
        let mut table = Self::default();
        for (alias, canonical) in BUILTIN_ALIASES {
            table.insert(alias, canonical);
        }
        table
    }

    /// Add user aliases. These override built-in entries with the same title.
    #[must_use]
    pub fn with_aliases(mut self, aliases: &HashMap<String, String>) -> Self {
        for (alias, canonical) in aliases {
            self.insert(alias, canonical);
        }
        self
    }

    pub fn insert(&mut self, alias: &str, canonical: &str) {
        let alias = normalize_title(alias);
        let canonical = canonical.trim();
        if !alias.is_empty() && !canonical.is_empty() {
            self.aliases.insert(alias, canonical.to_string());
        }
    }

    /// Canonical title for `title`, if it is a known alias.
    #[must_use]
    pub fn resolve(&self, title: &str) -> Option<&str> {
        self.aliases.get(&normalize_title(title)).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

#[cfg(test)]
mod aliases_tests {
    use super::*;

    #[test]
    fn builtin_aliases() {
        let table = AliasTable::builtin();
        assert_eq!(table.resolve("Biohazard"), Some("Resident Evil"));
        assert_eq!(table.resolve("ROCKMAN  X"), Some("Mega Man X"));
        assert_eq!(table.resolve("seiken densetsu 2"), Some("Secret of Mana"));
    }

    #[test]
    fn only_exact_titles_match() {
        let table = AliasTable::builtin();
        assert_eq!(table.resolve("Biohazard Code Veronica"), None);
        assert_eq!(table.resolve("Resident Evil"), None);
    }

    #[test]
    fn user_aliases_override_builtin() {
        let user = HashMap::from([
            ("Probotector".to_string(), "Contra (Probotector)".to_string()),
            ("Gokujou Parodius".to_string(), "Fantastic Parodius".to_string()),
            ("  ".to_string(), "Ignored".to_string()),
        ]);
        let table = AliasTable::builtin().with_aliases(&user);
        assert_eq!(table.resolve("Probotector"), Some("Contra (Probotector)"));
        assert_eq!(table.resolve("gokujou parodius"), Some("Fantastic Parodius"));
        assert_eq!(table.len(), BUILTIN_ALIASES.len() + 1);
    }

    #[test]
    fn empty_table() {
        let table = AliasTable::default();
        assert!(table.is_empty());
        assert_eq!(table.resolve("Biohazard"), None);
    }
}
