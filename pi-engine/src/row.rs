//! Sample rows and the persisted column layout.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::catalog::StatSpec;
use crate::language::Language;
use crate::stats::StatId;

pub const SEED_COLUMN: &str = "Seed";
pub const PERFECTION_COLUMN: &str = "Perfection";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("table has no `{0}` column")]
    MissingColumn(&'static str),
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
    #[error("seed {0} appears more than once")]
    DuplicateSeed(u32),
    #[error("seed value {0} is out of range")]
    InvalidSeed(i64),
}

/// One seed's capture for one item tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SampleRow {
    pub seed: u32,
    #[serde(default)]
    pub names: BTreeMap<Language, String>,
    /// Sparse: only stats present on this roll.
    #[serde(default)]
    pub stats: BTreeMap<StatId, f64>,
    #[serde(default)]
    pub perfection: f64,
}

impl SampleRow {
    #[must_use]
    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, language: Language, name: impl Into<String>) -> Self {
        self.names.insert(language, name.into());
        self
    }

    #[must_use]
    pub fn with_stat(mut self, stat: StatId, value: f64) -> Self {
        self.stats.insert(stat, value);
        self
    }

    #[must_use]
    pub fn stat(&self, stat: StatId) -> Option<f64> {
        self.stats.get(&stat).copied()
    }

    #[must_use]
    pub fn has_stat(&self, stat: StatId) -> bool {
        self.stats.contains_key(&stat)
    }

    #[must_use]
    pub fn name(&self, language: Language) -> Option<&str> {
        self.names.get(&language).map(String::as_str)
    }
}

/// Fill languages missing from the current capture with the name previously
/// persisted for the same seed. Names captured now always win.
pub fn carry_forward(rows: &mut [SampleRow], previous: &[SampleRow]) -> usize {
    let by_seed: BTreeMap<u32, &SampleRow> = previous.iter().map(|row| (row.seed, row)).collect();
    let mut filled = 0;
    for row in rows.iter_mut() {
        let Some(old) = by_seed.get(&row.seed) else {
            continue;
        };
        for (language, name) in &old.names {
            if name.is_empty() || row.names.get(language).is_some_and(|n| !n.is_empty()) {
                continue;
            }
            row.names.insert(*language, name.clone());
            filled += 1;
        }
    }
    filled
}

/// Ordered column set of a persisted table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableLayout {
    pub stats: Vec<StatId>,
    pub languages: Vec<Language>,
}

impl TableLayout {
    /// Union of configured stats and every stat observed in `rows`, sorted by
    /// identifier, followed by all languages in their fixed order.
    #[must_use]
    pub fn for_rows(rows: &[SampleRow], specs: &[StatSpec]) -> Self {
        let mut stats: BTreeSet<StatId> = specs.iter().map(|spec| spec.stat).collect();
        for row in rows {
            stats.extend(row.stats.keys().copied());
        }
        Self {
            stats: stats.into_iter().collect(),
            languages: Language::ALL.to_vec(),
        }
    }

    /// Resolve a persisted header, accepting legacy language aliases.
    ///
    /// # Errors
    ///
    /// Returns an error when the seed or perfection column is missing or a
    /// column is neither a known stat nor a language.
    pub fn from_header<S: AsRef<str>>(header: &[S]) -> Result<Self, TableError> {
        let columns: Vec<&str> = header.iter().map(AsRef::as_ref).collect();
        for required in [SEED_COLUMN, PERFECTION_COLUMN] {
            if !columns.contains(&required) {
                return Err(TableError::MissingColumn(required));
            }
        }
        let mut stats = BTreeSet::new();
        let mut languages = BTreeSet::new();
        for column in columns {
            if column == SEED_COLUMN || column == PERFECTION_COLUMN {
                continue;
            }
            if let Some(language) = Language::from_column(column) {
                languages.insert(language);
            } else {
                let stat = column
                    .parse::<StatId>()
                    .map_err(|_| TableError::UnknownColumn(column.to_string()))?;
                stats.insert(stat);
            }
        }
        Ok(Self {
            stats: stats.into_iter().collect(),
            languages: languages.into_iter().collect(),
        })
    }

    #[must_use]
    pub fn header(&self) -> Vec<String> {
        let mut header = vec![SEED_COLUMN.to_string(), PERFECTION_COLUMN.to_string()];
        header.extend(self.stats.iter().map(|stat| stat.as_str().to_string()));
        header.extend(self.languages.iter().map(|language| language.column()));
        header
    }
}

/// Reject tables holding the same seed twice.
///
/// # Errors
///
/// Returns the first duplicated seed.
pub fn ensure_unique_seeds(rows: &[SampleRow]) -> Result<(), TableError> {
    let mut seen = BTreeSet::new();
    match rows.iter().find(|row| !seen.insert(row.seed)) {
        Some(row) => Err(TableError::DuplicateSeed(row.seed)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carry_forward_fills_only_missing_languages() {
        let mut rows = vec![
            SampleRow::new(0).with_name(Language::En, "Nimble Module"),
            SampleRow::new(1),
        ];
        let previous = vec![
            SampleRow::new(0)
                .with_name(Language::En, "Old Name")
                .with_name(Language::De, "Flinkes Modul"),
            SampleRow::new(1).with_name(Language::Fr, "Module agile"),
        ];
        let filled = carry_forward(&mut rows, &previous);
        assert_eq!(filled, 2);
        assert_eq!(rows[0].name(Language::En), Some("Nimble Module"));
        assert_eq!(rows[0].name(Language::De), Some("Flinkes Modul"));
        assert_eq!(rows[1].name(Language::Fr), Some("Module agile"));
    }

    #[test]
    fn layout_keeps_observed_stats_missing_from_specs() {
        let specs = vec![StatSpec::ranged(StatId::SuitArmourShieldStrength, 5.0, 10.0)];
        let rows = vec![
            SampleRow::new(0)
                .with_stat(StatId::SuitArmourShieldStrength, 7.0)
                .with_stat(StatId::SuitArmourHealth, 33.0),
        ];
        let layout = TableLayout::for_rows(&rows, &specs);
        assert_eq!(
            layout.stats,
            vec![StatId::SuitArmourHealth, StatId::SuitArmourShieldStrength]
        );
        let header = layout.header();
        assert_eq!(header[..4], [
            "Seed",
            "Perfection",
            "Suit_Armour_Health",
            "Suit_Armour_Shield_Strength"
        ]);
        assert_eq!(header.last().map(String::as_str), Some("Name (ko)"));
    }

    #[test]
    fn header_parsing_maps_legacy_languages() {
        let layout = TableLayout::from_header(&[
            "Seed",
            "Perfection",
            "Suit_Energy",
            "Name (en)",
            "Name (zh-CN)",
        ])
        .unwrap();
        assert_eq!(layout.stats, vec![StatId::SuitEnergy]);
        assert_eq!(layout.languages, vec![Language::En, Language::ZhHans]);

        assert_eq!(
            TableLayout::from_header(&["Seed", "Perfection", "Mystery"]),
            Err(TableError::UnknownColumn("Mystery".to_string()))
        );
        assert_eq!(
            TableLayout::from_header(&["Perfection"]),
            Err(TableError::MissingColumn("Seed"))
        );
    }

    #[test]
    fn duplicate_seeds_are_reported() {
        let rows = vec![SampleRow::new(4), SampleRow::new(5), SampleRow::new(4)];
        assert_eq!(ensure_unique_seeds(&rows), Err(TableError::DuplicateSeed(4)));
    }
}
