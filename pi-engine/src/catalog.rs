//! Item catalog: which procedural items exist and the expected stat ranges
//! for each quality tier.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

use crate::desirability::OverrideSpec;
use crate::stats::{StatId, StatTable};

const DEFAULT_CATALOG_DATA: &str = include_str!("../assets/catalog.json");

/// Prefix shared by every product item id.
pub const PRODUCT_PREFIX: &str = "PROC_";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("catalog could not be parsed: {0}")]
    Parse(String),
    #[error("{item}: {stat} range invalid (min {min} > max {max})")]
    InvalidRange {
        item: String,
        stat: StatId,
        min: f64,
        max: f64,
    },
    #[error("{item}: {stat} needs a configured range for range-weighted scoring")]
    MissingRange { item: String, stat: StatId },
    #[error("{item}: tier must allow at least one stat")]
    NoStatSlots { item: String },
    #[error("{item}: {stat} has no stat metadata")]
    UnknownStat { item: String, stat: StatId },
    #[error("{item}: stat {stat} listed twice")]
    DuplicateStat { item: String, stat: StatId },
    #[error("item {0} defined twice")]
    DuplicateItem(String),
    #[error("item {0} defines the same tier twice")]
    DuplicateTier(String),
    #[error("item {0} has no tiers")]
    NoTiers(String),
    #[error("item {0} lists a compendium tier it does not define")]
    UnknownCompendiumTier(String),
    #[error("desirability override targets unknown item {0}")]
    UnknownOverrideTarget(String),
}

/// Inventory an upgrade module is installed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Inventory {
    AlienShip,
    Exocraft,
    Freighter,
    Mech,
    Ship,
    Submarine,
    Suit,
    Weapon,
}

impl Inventory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlienShip => "AlienShip",
            Self::Exocraft => "Exocraft",
            Self::Freighter => "Freighter",
            Self::Mech => "Mech",
            Self::Ship => "Ship",
            Self::Submarine => "Submarine",
            Self::Suit => "Suit",
            Self::Weapon => "Weapon",
        }
    }

    /// Heading used in compiled reports.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::AlienShip => "Starship (Living)",
            Self::Exocraft => "Exocraft",
            Self::Freighter => "Freighter",
            Self::Mech => "Mech (Minotaur)",
            Self::Ship => "Starship (Regular)",
            Self::Submarine => "Submarine (Nautilon)",
            Self::Suit => "Exosuit",
            Self::Weapon => "Multi-Tool",
        }
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad family of a procedural item, selecting its scoring strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemFamily {
    Technology { inventory: Inventory },
    Product,
}

impl ItemFamily {
    /// Folder name used for persisted tables.
    #[must_use]
    pub const fn folder(self) -> &'static str {
        match self {
            Self::Technology { inventory } => inventory.as_str(),
            Self::Product => "Product",
        }
    }

    #[must_use]
    pub const fn noun(self) -> &'static str {
        match self {
            Self::Technology { .. } => "technology",
            Self::Product => "product",
        }
    }

    #[must_use]
    pub const fn is_product(self) -> bool {
        matches!(self, Self::Product)
    }
}

/// Quality tier suffix of an item id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Tier {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "X")]
    X,
    #[default]
    #[serde(rename = "")]
    Untiered,
}

impl Tier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::One => "1",
            Self::Two => "2",
            Self::Three => "3",
            Self::Four => "4",
            Self::X => "X",
            Self::Untiered => "",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(Self::One),
            "2" => Ok(Self::Two),
            "3" => Ok(Self::Three),
            "4" => Ok(Self::Four),
            "X" => Ok(Self::X),
            "" => Ok(Self::Untiered),
            _ => Err(()),
        }
    }
}

/// Item id plus tier, e.g. `UP_JET` + `X`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub item_id: String,
    pub tier: Tier,
}

impl ItemKey {
    #[must_use]
    pub fn new(item_id: impl Into<String>, tier: Tier) -> Self {
        Self {
            item_id: item_id.into(),
            tier,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.item_id, self.tier)
    }
}

/// Theoretical range of an extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatRange {
    pub min: f64,
    pub max: f64,
}

impl StatRange {
    #[must_use]
    pub fn width(self) -> f64 {
        self.max - self.min
    }

    #[must_use]
    pub fn contains(self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// One configured stat of an item tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSpec {
    pub stat: StatId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<StatRange>,
    /// Present on every roll with a constant value; never scored.
    #[serde(default)]
    pub always_same: bool,
    /// Deliberately left out of the perfection formula.
    #[serde(default)]
    pub excluded_from_weighting: bool,
}

impl StatSpec {
    #[must_use]
    pub const fn ranged(stat: StatId, min: f64, max: f64) -> Self {
        Self {
            stat,
            range: Some(StatRange { min, max }),
            always_same: false,
            excluded_from_weighting: false,
        }
    }

    #[must_use]
    pub const fn unranged(stat: StatId) -> Self {
        Self {
            stat,
            range: None,
            always_same: false,
            excluded_from_weighting: false,
        }
    }

    #[must_use]
    pub const fn always_same(mut self) -> Self {
        self.always_same = true;
        self
    }

    #[must_use]
    pub const fn excluded(mut self) -> Self {
        self.excluded_from_weighting = true;
        self
    }

    /// Whether the stat takes part in perfection scoring.
    #[must_use]
    pub const fn participates(&self) -> bool {
        !self.always_same && !self.excluded_from_weighting
    }
}

/// Stat configuration of one quality tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSpec {
    pub tier: Tier,
    /// Maximum number of stats a single roll can expose.
    pub max_stats: usize,
    pub stats: Vec<StatSpec>,
    /// Ranges not yet confirmed against the game.
    #[serde(default)]
    pub unverified: bool,
}

impl TierSpec {
    #[must_use]
    pub fn spec(&self, stat: StatId) -> Option<&StatSpec> {
        self.stats.iter().find(|spec| spec.stat == stat)
    }

    /// Find the spec whose display name matches a description tag.
    #[must_use]
    pub fn spec_by_display_name(&self, table: &StatTable, name: &str) -> Option<&StatSpec> {
        self.stats
            .iter()
            .find(|spec| table.display_name(spec.stat) == name)
    }
}

/// A procedural item family and its tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub item_id: String,
    #[serde(default)]
    pub title: String,
    pub family: ItemFamily,
    /// Tiers shown in the compendium, best first. Empty shows every tier.
    #[serde(default)]
    pub compendium: Vec<Tier>,
    /// Game version that introduced or last changed the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_since: Option<String>,
    pub tiers: Vec<TierSpec>,
}

impl ItemDefinition {
    #[must_use]
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.item_id
        } else {
            &self.title
        }
    }

    #[must_use]
    pub fn tier(&self, tier: Tier) -> Option<&TierSpec> {
        self.tiers.iter().find(|spec| spec.tier == tier)
    }

    /// Compendium tiers in display order, ranked from 1.
    #[must_use]
    pub fn compendium_tiers(&self) -> Vec<TierContext<'_>> {
        let specs: Vec<&TierSpec> = if self.compendium.is_empty() {
            self.tiers.iter().collect()
        } else {
            self.compendium
                .iter()
                .filter_map(|tier| self.tier(*tier))
                .collect()
        };
        specs
            .into_iter()
            .enumerate()
            .map(|(idx, spec)| TierContext {
                item: self,
                spec,
                rank: idx + 1,
            })
            .collect()
    }
}

/// Borrowed view of one item tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierContext<'a> {
    pub item: &'a ItemDefinition,
    pub spec: &'a TierSpec,
    /// 1-based position of the tier within its listing.
    pub rank: usize,
}

impl TierContext<'_> {
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.item.item_id.clone(), self.spec.tier)
    }

    #[must_use]
    pub const fn family(&self) -> ItemFamily {
        self.item.family
    }

    /// Number of stat capture slots a source must provide.
    #[must_use]
    pub const fn slot_count(&self) -> usize {
        match self.item.family {
            ItemFamily::Technology { .. } => self.spec.max_stats,
            ItemFamily::Product => 1,
        }
    }

    fn matches(&self, token: &str) -> bool {
        let item_id = self.item.item_id.as_str();
        token.eq_ignore_ascii_case(self.item.family.folder())
            || token == item_id
            || token == self.key().to_string()
            || item_id
                .strip_prefix(PRODUCT_PREFIX)
                .is_some_and(|short| self.item.family.is_product() && token == short)
    }
}

/// Every known item with its tier ranges and desirability overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Catalog {
    pub items: Vec<ItemDefinition>,
    #[serde(default)]
    pub overrides: Vec<OverrideSpec>,
}

impl Catalog {
    /// Parse and validate a catalog against the embedded stat table.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the catalog is inconsistent.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self =
            serde_json::from_str(json).map_err(|err| CatalogError::Parse(err.to_string()))?;
        catalog.validate(StatTable::embedded())?;
        for item in &catalog.items {
            let unverified: Vec<&str> = item
                .tiers
                .iter()
                .filter(|tier| tier.unverified)
                .map(|tier| tier.tier.as_str())
                .collect();
            if !unverified.is_empty() {
                log::warn!(
                    "{}: configured ranges unverified for tiers {unverified:?}",
                    item.item_id
                );
            }
        }
        Ok(catalog)
    }

    #[must_use]
    pub fn load_from_static() -> Self {
        Self::from_json(DEFAULT_CATALOG_DATA).unwrap_or_else(|err| {
            log::error!("embedded catalog rejected: {err}");
            Self::default()
        })
    }

    #[must_use]
    pub fn embedded() -> &'static Self {
        static CATALOG: OnceLock<Catalog> = OnceLock::new();
        CATALOG.get_or_init(Self::load_from_static)
    }

    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self, table: &StatTable) -> Result<(), CatalogError> {
        let mut seen_items = HashSet::new();
        for item in &self.items {
            if !seen_items.insert(item.item_id.as_str()) {
                return Err(CatalogError::DuplicateItem(item.item_id.clone()));
            }
            if item.tiers.is_empty() {
                return Err(CatalogError::NoTiers(item.item_id.clone()));
            }
            let mut seen_tiers = HashSet::new();
            for tier in &item.tiers {
                if !seen_tiers.insert(tier.tier) {
                    return Err(CatalogError::DuplicateTier(item.item_id.clone()));
                }
                validate_tier(item, tier, table)?;
            }
            if item.compendium.iter().any(|tier| item.tier(*tier).is_none()) {
                return Err(CatalogError::UnknownCompendiumTier(item.item_id.clone()));
            }
        }
        for spec in &self.overrides {
            if self.item(&spec.item_id).is_none() {
                return Err(CatalogError::UnknownOverrideTarget(spec.item_id.clone()));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn item(&self, item_id: &str) -> Option<&ItemDefinition> {
        self.items.iter().find(|item| item.item_id == item_id)
    }

    /// All tiers in catalog order.
    pub fn tiers(&self) -> impl Iterator<Item = TierContext<'_>> {
        self.items.iter().flat_map(|item| {
            item.tiers
                .iter()
                .enumerate()
                .map(move |(idx, spec)| TierContext {
                    item,
                    spec,
                    rank: idx + 1,
                })
        })
    }

    #[must_use]
    pub fn tier(&self, key: &ItemKey) -> Option<TierContext<'_>> {
        self.tiers()
            .find(|ctx| ctx.item.item_id == key.item_id && ctx.spec.tier == key.tier)
    }

    /// Resolve a persisted file stem such as `UP_JETX` or `UP_SNSUIT`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<ItemKey> {
        if let Some(item) = self.item(name)
            && item.tiers.iter().any(|t| t.tier == Tier::Untiered)
        {
            return Some(ItemKey::new(name, Tier::Untiered));
        }
        let split = name.char_indices().last()?.0;
        let (item_id, suffix) = name.split_at(split);
        let tier: Tier = suffix.parse().ok()?;
        let key = ItemKey::new(item_id, tier);
        self.tier(&key).map(|_| key)
    }

    /// Tiers matching any filter token; everything when `filters` is empty.
    ///
    /// A token matches an inventory (or `Product`), an item id, an item id with
    /// tier suffix, or a product id without its `PROC_` prefix.
    #[must_use]
    pub fn select(&self, filters: &[String]) -> Vec<TierContext<'_>> {
        self.tiers()
            .filter(|ctx| filters.is_empty() || filters.iter().any(|token| ctx.matches(token)))
            .collect()
    }
}

fn validate_tier(
    item: &ItemDefinition,
    tier: &TierSpec,
    table: &StatTable,
) -> Result<(), CatalogError> {
    let label = format!("{}{}", item.item_id, tier.tier);
    if tier.max_stats == 0 {
        return Err(CatalogError::NoStatSlots { item: label });
    }
    let mut seen = HashSet::new();
    for spec in &tier.stats {
        if !seen.insert(spec.stat) {
            return Err(CatalogError::DuplicateStat {
                item: label,
                stat: spec.stat,
            });
        }
        if table.get(spec.stat).is_none() {
            return Err(CatalogError::UnknownStat {
                item: label,
                stat: spec.stat,
            });
        }
        match spec.range {
            Some(range) if range.max < range.min => {
                return Err(CatalogError::InvalidRange {
                    item: label,
                    stat: spec.stat,
                    min: range.min,
                    max: range.max,
                });
            }
            None if !item.family.is_product() && spec.participates() => {
                return Err(CatalogError::MissingRange {
                    item: label,
                    stat: spec.stat,
                });
            }
            _ => {}
        }
    }
    Ok(())
}
