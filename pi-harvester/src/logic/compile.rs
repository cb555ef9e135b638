//! Compendium assembly from the persisted tables.

use anyhow::Result;
use pi_engine::{
    ItemDefinition, ItemFamily, Language, OverrideRegistry, SampleRow, StatId, StatTable,
    Tier, TierContext, select_candidates, select_product_candidates,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::Harvest;
use crate::common::compare_versions;

/// Note shown for tiers whose every seed rolls identically.
pub const ALL_SAME_NOTE: &str = "All seeds are the same.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Compendium {
    pub game_version: String,
    pub language: Language,
    pub sections: Vec<Section>,
}

/// Items sharing one inventory, or all products.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub title: String,
    pub entries: Vec<ItemEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemEntry {
    pub item_id: String,
    pub title: String,
    /// Display names of the value columns, shared by every tier.
    pub columns: Vec<String>,
    #[serde(skip)]
    pub stats: Vec<StatId>,
    /// Set when no tier of the item has data.
    pub placeholder: Option<String>,
    pub tiers: Vec<TierEntry>,
}

impl ItemEntry {
    #[must_use]
    pub fn heading(&self) -> String {
        format!("{} ({})", self.title, self.item_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierEntry {
    pub quality: String,
    pub max_stats_per_seed: usize,
    pub note: Option<String>,
    pub rows: Vec<CandidateRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRow {
    pub name: String,
    pub seed: u32,
    pub perfection: f64,
    /// One entry per column of the owning item.
    pub values: Vec<Option<f64>>,
}

impl Compendium {
    #[must_use]
    pub fn entries(&self) -> impl Iterator<Item = &ItemEntry> {
        self.sections.iter().flat_map(|section| section.entries.iter())
    }
}

/// Label for a tier as shown in the compendium.
#[must_use]
pub fn quality_label(tier: Tier) -> String {
    match tier {
        Tier::X => "Illegal Upgrade (X)".to_string(),
        Tier::One => "Upgrade (1)".to_string(),
        Tier::Untiered => String::new(),
        other => format!("Supreme Upgrade ({other})"),
    }
}

/// Placeholder text for an item with no data in `game_version`.
#[must_use]
pub fn unavailable_note(item: &ItemDefinition, game_version: &str) -> String {
    let noun = item.family.noun();
    match &item.available_since {
        Some(since) => format!(
            "This {noun} is not yet available in game version {game_version} but was added in {since}."
        ),
        None => format!("This {noun} is not yet available in game version {game_version}."),
    }
}

fn section_title(family: ItemFamily) -> &'static str {
    match family {
        ItemFamily::Technology { inventory } => inventory.title(),
        ItemFamily::Product => "Product",
    }
}

/// # Errors
///
/// Returns an error if the unavailable manifest or a stored table cannot be
/// read.
pub fn build_compendium(harvest: &Harvest, language: Language) -> Result<Compendium> {
    let unavailable = harvest.store.unavailable()?;
    let registry = OverrideRegistry::from_catalog(&harvest.catalog);
    let game_version = harvest.config.game_version.clone();
    let mut sections: Vec<Section> = Vec::new();

    for item in &harvest.catalog.items {
        let title = section_title(item.family);
        let mut tables = Vec::new();
        for tier in item.compendium_tiers() {
            let key = tier.key();
            if unavailable.contains_key(&key.to_string()) {
                log::debug!("{key}: marked unavailable");
                continue;
            }
            match harvest.store.read_existing(tier.family(), &key)? {
                Some(stored) => tables.push((tier, stored.rows)),
                None => log::debug!("{key}: no table"),
            }
        }

        let entry = if tables.is_empty() {
            let not_yet = item
                .available_since
                .as_deref()
                .is_some_and(|since| compare_versions(since, &game_version).is_gt());
            if !not_yet {
                log::warn!("{}: no collected tables", item.item_id);
            }
            placeholder_entry(item, &game_version)
        } else {
            item_entry(item, &tables, &registry, language)
        };

        match sections.iter_mut().find(|section| section.title == title) {
            Some(section) => section.entries.push(entry),
            None => sections.push(Section {
                title: title.to_string(),
                entries: vec![entry],
            }),
        }
    }

    Ok(Compendium {
        game_version,
        language,
        sections,
    })
}

fn placeholder_entry(item: &ItemDefinition, game_version: &str) -> ItemEntry {
    ItemEntry {
        item_id: item.item_id.clone(),
        title: item.display_title().to_string(),
        columns: Vec::new(),
        stats: Vec::new(),
        placeholder: Some(unavailable_note(item, game_version)),
        tiers: Vec::new(),
    }
}

fn item_entry(
    item: &ItemDefinition,
    tables: &[(TierContext<'_>, Vec<SampleRow>)],
    registry: &OverrideRegistry,
    language: Language,
) -> ItemEntry {
    let stats = value_columns(item.family, tables);
    let names = StatTable::embedded();
    let columns = stats
        .iter()
        .map(|stat| names.display_name(*stat).to_string())
        .collect();

    let tiers = tables
        .iter()
        .map(|(tier, rows)| {
            let (picked, max_stats_per_seed, all_same) = if tier.family().is_product() {
                let mut picked = select_product_candidates(rows);
                picked.sort_by_key(|row| row.seed);
                (picked, tier.slot_count(), false)
            } else {
                let selection = select_candidates(
                    rows,
                    tier.rank,
                    tier.spec.max_stats,
                    &registry.for_item(&tier.key()),
                );
                (selection.rows, selection.max_stats_per_seed, selection.all_same)
            };
            TierEntry {
                quality: quality_label(tier.spec.tier),
                max_stats_per_seed,
                note: all_same.then(|| ALL_SAME_NOTE.to_string()),
                rows: picked
                    .iter()
                    .map(|row| candidate_row(row, &stats, language))
                    .collect(),
            }
        })
        .collect();

    ItemEntry {
        item_id: item.item_id.clone(),
        title: item.display_title().to_string(),
        columns,
        stats,
        placeholder: None,
        tiers,
    }
}

/// Products always show `Age, Value`; technologies the union of observed stats.
fn value_columns(family: ItemFamily, tables: &[(TierContext<'_>, Vec<SampleRow>)]) -> Vec<StatId> {
    if family.is_product() {
        return vec![StatId::Age, StatId::Value];
    }
    tables
        .iter()
        .flat_map(|(_, rows)| rows.iter().flat_map(|row| row.stats.keys().copied()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn candidate_row(row: &SampleRow, stats: &[StatId], language: Language) -> CandidateRow {
    let name = row
        .name(language)
        .or_else(|| row.name(Language::En))
        .unwrap_or_default()
        .to_string();
    CandidateRow {
        name,
        seed: row.seed,
        perfection: row.perfection,
        values: stats.iter().map(|stat| row.stat(*stat)).collect(),
    }
}

/// Highest value of each column among the shown rows.
#[must_use]
pub fn column_best(tier: &TierEntry, columns: usize) -> Vec<Option<f64>> {
    let mut best: BTreeMap<usize, f64> = BTreeMap::new();
    for row in &tier.rows {
        for (idx, value) in row.values.iter().enumerate() {
            if let Some(value) = value {
                best.entry(idx)
                    .and_modify(|current| *current = current.max(*value))
                    .or_insert(*value);
            }
        }
    }
    (0..columns).map(|idx| best.get(&idx).copied()).collect()
}
