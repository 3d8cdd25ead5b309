//! Grouping and region-priority resolution.
//!
//! Files are grouped by canonical identity, falling back to the normalized base title,
//! and each group is resolved to keep/remove decisions under a [`ResolutionPolicy`].
//! Everything here is deterministic and free of I/O.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use crate::analyzer::{FileEntry, GroupingInputInvalid};
use crate::region::{DEFAULT_REGION_PRIORITY, Region};

/// Region preferences used to pick the file to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPolicy {
    /// Highest preference first.
    pub region_priority: Vec<Region>,
    /// Regions whose single-region groups are never reduced.
    pub preserve_region_only: BTreeSet<Region>,
    /// Extensions added to the recognized ROM extensions.
    pub extra_extensions: Vec<String>,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            region_priority: DEFAULT_REGION_PRIORITY.to_vec(),
            preserve_region_only: BTreeSet::from([Region::Japan, Region::Europe]),
            extra_extensions: Vec::new(),
        }
    }
}

impl ResolutionPolicy {
    /// Sort rank of a region. Regions missing from the priority list rank last.
    #[must_use]
    pub fn rank(&self, region: Region) -> usize {
        self.region_priority
            .iter()
            .position(|r| *r == region)
            .unwrap_or(self.region_priority.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Keep,
    Remove,
}

/// Why a file got its decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    /// Only file in its group.
    Unique,
    /// Group has a single region that is in the preserve set.
    PreservedRegion,
    /// No member of the group has a known region.
    UnknownRegion,
    /// Highest priority member of the group.
    BestRegion,
    /// A higher priority member of the group is kept.
    Superseded,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keep => write!(f, "KEEP"),
            Self::Remove => write!(f, "REMOVE"),
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Unique => "unique",
            Self::PreservedRegion => "preserved region",
            Self::UnknownRegion => "no known region",
            Self::BestRegion => "best region",
            Self::Superseded => "better region available",
        };
        write!(f, "{text}")
    }
}

/// Decision for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDecision {
    pub entry: FileEntry,
    pub decision: Decision,
    /// Key of the group the file was resolved in.
    pub group_key: String,
    pub reason: DecisionReason,
}

/// Files sharing one grouping key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub key: String,
    /// Members in encounter order.
    pub members: Vec<FileEntry>,
    /// The single member chosen over the others, if resolution picked one.
    pub kept: Option<PathBuf>,
}

impl DuplicateGroup {
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        self.members.len() > 1
    }

    #[must_use]
    pub fn regions(&self) -> BTreeSet<Region> {
        self.members.iter().map(|entry| entry.region).collect()
    }

    /// True if members with different base titles were merged by canonical identity.
    #[must_use]
    pub fn is_cross_language(&self) -> bool {
        self.members
            .iter()
            .map(|entry| entry.key.as_str())
            .collect::<BTreeSet<_>>()
            .len()
            > 1
    }
}

/// Output of [`group_and_resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// One decision per valid entry, ordered by group key.
    pub decisions: Vec<FileDecision>,
    pub groups: Vec<DuplicateGroup>,
    /// Entries excluded before grouping.
    pub rejected: Vec<(PathBuf, GroupingInputInvalid)>,
}

/// Partition entries into groups by grouping key.
///
/// Invalid entries are returned separately and never grouped.
#[must_use]
pub fn group_entries(entries: Vec<FileEntry>) -> (Vec<DuplicateGroup>, Vec<(PathBuf, GroupingInputInvalid)>) {
    let mut groups: BTreeMap<String, Vec<FileEntry>> = BTreeMap::new();
    let mut rejected = Vec::new();
    for entry in entries {
        if let Err(error) = entry.validate() {
            tracing::warn!(path = %entry.path.display(), "Excluding file from grouping: {error}");
            rejected.push((entry.path, error));
            continue;
        }
        groups.entry(entry.grouping_key()).or_default().push(entry);
    }
    let groups = groups
        .into_iter()
        .map(|(key, members)| DuplicateGroup {
            key,
            members,
            kept: None,
        })
        .collect();
    (groups, rejected)
}

/// Resolve one group. Decisions are returned in the group's member order.
pub fn resolve_group(group: &mut DuplicateGroup, policy: &ResolutionPolicy) -> Vec<FileDecision> {
    let decide = |entry: &FileEntry, decision, reason| FileDecision {
        entry: entry.clone(),
        decision,
        group_key: group.key.clone(),
        reason,
    };

    if group.members.len() == 1 {
        group.kept = Some(group.members[0].path.clone());
        return vec![decide(&group.members[0], Decision::Keep, DecisionReason::Unique)];
    }

    let regions = group.regions();
    let keep_all = match regions.first() {
        Some(region) if regions.len() == 1 && policy.preserve_region_only.contains(region) => {
            Some(DecisionReason::PreservedRegion)
        }
        Some(Region::Unknown) if regions.len() == 1 => Some(DecisionReason::UnknownRegion),
        _ => None,
    };
    if let Some(reason) = keep_all {
        group.kept = None;
        return group
            .members
            .iter()
            .map(|entry| decide(entry, Decision::Keep, reason))
            .collect();
    }

    // Stable: members of equal rank stay in encounter order
    let best = group
        .members
        .iter()
        .enumerate()
        .min_by_key(|(index, entry)| (policy.rank(entry.region), *index))
        .map_or(0, |(index, _)| index);

    group.kept = Some(group.members[best].path.clone());
    group
        .members
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            if index == best {
                decide(entry, Decision::Keep, DecisionReason::BestRegion)
            } else {
                decide(entry, Decision::Remove, DecisionReason::Superseded)
            }
        })
        .collect()
}

/// Group entries and resolve every group.
#[must_use]
pub fn group_and_resolve(entries: Vec<FileEntry>, policy: &ResolutionPolicy) -> Resolution {
    let (mut groups, rejected) = group_entries(entries);
    let decisions = groups
        .iter_mut()
        .flat_map(|group| resolve_group(group, policy))
        .collect();
    Resolution {
        decisions,
        groups,
        rejected,
    }
}

#[cfg(test)]
mod resolve_tests {
    use super::*;

    use std::collections::HashSet;

    fn entry(filename: &str) -> FileEntry {
        FileEntry::new(PathBuf::from("/roms").join(filename), filename)
    }

    fn decision_for<'a>(resolution: &'a Resolution, filename: &str) -> &'a FileDecision {
        resolution
            .decisions
            .iter()
            .find(|d| d.entry.filename == filename)
            .unwrap()
    }

    #[test]
    fn single_file_is_kept() {
        let resolution = group_and_resolve(vec![entry("Contra (Japan).nes")], &ResolutionPolicy::default());
        assert_eq!(resolution.decisions.len(), 1);
        assert_eq!(resolution.decisions[0].decision, Decision::Keep);
        assert_eq!(resolution.decisions[0].reason, DecisionReason::Unique);
    }

    #[test]
    fn usa_beats_japan() {
        let resolution = group_and_resolve(
            vec![entry("Contra (Japan).nes"), entry("Contra (USA).nes")],
            &ResolutionPolicy::default(),
        );
        assert_eq!(decision_for(&resolution, "Contra (USA).nes").decision, Decision::Keep);
        assert_eq!(decision_for(&resolution, "Contra (Japan).nes").decision, Decision::Remove);
        assert_eq!(resolution.groups[0].kept, Some(PathBuf::from("/roms/Contra (USA).nes")));
    }

    #[test]
    fn custom_priority_order() {
        let policy = ResolutionPolicy {
            region_priority: vec![Region::Japan, Region::Usa],
            ..ResolutionPolicy::default()
        };
        let resolution = group_and_resolve(
            vec![
                entry("Contra (USA).nes"),
                entry("Contra (Japan).nes"),
                entry("Contra (Europe).nes"),
            ],
            &policy,
        );
        assert_eq!(decision_for(&resolution, "Contra (Japan).nes").decision, Decision::Keep);
        assert_eq!(decision_for(&resolution, "Contra (USA).nes").decision, Decision::Remove);
        assert_eq!(decision_for(&resolution, "Contra (Europe).nes").decision, Decision::Remove);
    }

    #[test]
    fn preserved_single_region_group_is_kept() {
        let resolution = group_and_resolve(
            vec![entry("Fire Emblem (Japan).sfc"), entry("Fire Emblem (Japan) (Rev 1).sfc")],
            &ResolutionPolicy::default(),
        );
        assert!(resolution.decisions.iter().all(|d| d.decision == Decision::Keep));
        assert!(
            resolution
                .decisions
                .iter()
                .all(|d| d.reason == DecisionReason::PreservedRegion)
        );
        assert_eq!(resolution.groups[0].kept, None);
    }

    #[test]
    fn unpreserved_single_region_group_is_reduced() {
        let resolution = group_and_resolve(
            vec![entry("Zelda (USA).nes"), entry("Zelda (USA) (Rev A).nes")],
            &ResolutionPolicy::default(),
        );
        assert_eq!(decision_for(&resolution, "Zelda (USA).nes").decision, Decision::Keep);
        assert_eq!(decision_for(&resolution, "Zelda (USA) (Rev A).nes").decision, Decision::Remove);
    }

    #[test]
    fn equal_priority_keeps_first_encountered() {
        let policy = ResolutionPolicy {
            region_priority: vec![Region::Usa],
            preserve_region_only: BTreeSet::new(),
            extra_extensions: Vec::new(),
        };
        let resolution = group_and_resolve(
            vec![entry("Tetris (Japan).gb"), entry("Tetris (Europe).gb")],
            &policy,
        );
        assert_eq!(decision_for(&resolution, "Tetris (Japan).gb").decision, Decision::Keep);
        assert_eq!(decision_for(&resolution, "Tetris (Europe).gb").decision, Decision::Remove);
    }

    #[test]
    fn unknown_region_loses_to_known_region() {
        let resolution = group_and_resolve(
            vec![entry("Tetris.gb"), entry("Tetris (World).gb")],
            &ResolutionPolicy::default(),
        );
        assert_eq!(decision_for(&resolution, "Tetris (World).gb").decision, Decision::Keep);
        assert_eq!(decision_for(&resolution, "Tetris.gb").decision, Decision::Remove);
    }

    #[test]
    fn all_unknown_group_is_kept() {
        let resolution = group_and_resolve(
            vec![entry("Tetris.gb"), entry("Tetris.zip")],
            &ResolutionPolicy::default(),
        );
        assert!(resolution.decisions.iter().all(|d| d.decision == Decision::Keep));
        assert_eq!(resolution.decisions[0].reason, DecisionReason::UnknownRegion);
    }

    #[test]
    fn canonical_identity_merges_groups() {
        let mut japan = entry("Biohazard (Japan).iso");
        let mut usa = entry("Resident Evil (USA).iso");

        let separate = group_and_resolve(vec![japan.clone(), usa.clone()], &ResolutionPolicy::default());
        assert_eq!(separate.groups.len(), 2);
        assert!(separate.decisions.iter().all(|d| d.decision == Decision::Keep));

        japan.canonical_identity = Some("Resident Evil".to_string());
        usa.canonical_identity = Some("Resident Evil".to_string());
        let merged = group_and_resolve(vec![japan, usa], &ResolutionPolicy::default());
        assert_eq!(merged.groups.len(), 1);
        assert!(merged.groups[0].is_cross_language());
        assert_eq!(decision_for(&merged, "Resident Evil (USA).iso").decision, Decision::Keep);
        assert_eq!(decision_for(&merged, "Biohazard (Japan).iso").decision, Decision::Remove);
    }

    #[test]
    fn grouping_is_a_partition() {
        let entries = vec![
            entry("Super Mario Bros. (USA).nes"),
            entry("Super Mario Bros. (Japan).nes"),
            entry("Contra (USA).nes"),
            entry("Mega Man (USA).nes"),
            entry("Mega Man (Europe).nes"),
            entry("Final Fantasy IX (USA) (Disc 1).bin"),
            entry("Final Fantasy IX (USA) (Disc 2).bin"),
        ];
        let count = entries.len();
        let (groups, rejected) = group_entries(entries);
        assert!(rejected.is_empty());

        let mut seen = HashSet::new();
        for group in &groups {
            assert!(!group.members.is_empty());
            for member in &group.members {
                assert!(seen.insert(member.path.clone()), "{} in two groups", member.filename);
            }
        }
        assert_eq!(seen.len(), count);
        assert_eq!(groups.len(), 5);
    }

    #[test]
    fn resolution_is_independent_of_input_order() {
        let files = ["Contra (Japan).nes", "Contra (USA).nes", "Contra (Europe).nes", "Tetris (World).gb"];
        let forward = group_and_resolve(files.iter().map(|f| entry(f)).collect(), &ResolutionPolicy::default());
        let backward = group_and_resolve(
            files.iter().rev().map(|f| entry(f)).collect(),
            &ResolutionPolicy::default(),
        );
        for file in files {
            assert_eq!(
                decision_for(&forward, file).decision,
                decision_for(&backward, file).decision
            );
        }
    }

    #[test]
    fn invalid_entries_are_excluded() {
        let resolution = group_and_resolve(
            vec![FileEntry::new(PathBuf::new(), "Contra (USA).nes"), entry("Contra (Japan).nes")],
            &ResolutionPolicy::default(),
        );
        assert_eq!(resolution.rejected.len(), 1);
        assert_eq!(resolution.rejected[0].1, GroupingInputInvalid::EmptyPath);
        assert_eq!(resolution.decisions.len(), 1);
        assert_eq!(resolution.decisions[0].decision, Decision::Keep);
    }

    #[test]
    fn rank_puts_unlisted_regions_last() {
        let policy = ResolutionPolicy::default();
        assert_eq!(policy.rank(Region::Usa), 0);
        assert_eq!(policy.rank(Region::World), 3);
        assert_eq!(policy.rank(Region::Unknown), 4);
    }
}
