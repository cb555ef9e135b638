//! Perfection aggregation.
//!
//! Technology tiers are scored against their configured ranges, weighted by
//! range width and penalized when a roll exposes fewer stats than the best
//! roll of the table. Products are rescaled over the empirical range of the
//! table itself. Both live behind [`ScoringStrategy`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{ItemFamily, StatRange, StatSpec, TierSpec};
use crate::numbers::{count_to_f64, round_to_digits};
use crate::row::SampleRow;
use crate::stats::StatId;

/// Per-stat weights of one item tier. Stats without an entry weigh zero.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Weights {
    entries: BTreeMap<StatId, f64>,
}

impl Weights {
    #[must_use]
    pub fn get(&self, stat: StatId) -> f64 {
        self.entries.get(&stat).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatId, f64)> + '_ {
        self.entries.iter().map(|(stat, weight)| (*stat, *weight))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Weight every range by `(max - min + 1)` relative to the narrowest one.
pub fn weights_from_ranges(ranges: impl IntoIterator<Item = (StatId, StatRange)>) -> Weights {
    let widths: Vec<(StatId, f64)> = ranges
        .into_iter()
        .map(|(stat, range)| (stat, range.width() + 1.0))
        .collect();
    let min_width = widths
        .iter()
        .map(|(_, width)| *width)
        .fold(f64::INFINITY, f64::min);
    if !min_width.is_finite() || min_width <= 0.0 {
        return Weights::default();
    }
    Weights {
        entries: widths
            .into_iter()
            .map(|(stat, width)| (stat, width / min_width))
            .collect(),
    }
}

/// Weights of the participating, ranged stats of a tier.
#[must_use]
pub fn compute_weights(specs: &[StatSpec]) -> Weights {
    weights_from_ranges(
        specs
            .iter()
            .filter(|spec| spec.participates())
            .filter_map(|spec| spec.range.map(|range| (spec.stat, range))),
    )
}

/// Normalized score of one value: 1.0 at `max`, 0.0 at `min`, not clamped.
/// Zero-width ranges carry no information and always score 1.0.
#[must_use]
pub fn stat_score(range: StatRange, value: f64) -> f64 {
    if range.max > range.min {
        1.0 - (range.max - value) / (range.max - range.min)
    } else {
        1.0
    }
}

fn participating<'a>(row: &'a SampleRow, specs: &'a [StatSpec]) -> impl Iterator<Item = (&'a StatSpec, f64)> + 'a {
    specs
        .iter()
        .filter(|spec| spec.participates())
        .filter_map(|spec| row.stat(spec.stat).map(|value| (spec, value)))
}

/// Highest number of participating stats present on any row.
#[must_use]
pub fn max_stats_possible(rows: &[SampleRow], specs: &[StatSpec]) -> usize {
    rows.iter()
        .map(|row| participating(row, specs).count())
        .max()
        .unwrap_or(0)
}

/// Weighted perfection of one row against configured ranges.
///
/// Returns 0.0 when no weighted stat is present or `max_stats_possible` is 0.
#[must_use]
pub fn score_row(
    row: &SampleRow,
    specs: &[StatSpec],
    weights: &Weights,
    max_stats_possible: usize,
) -> f64 {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    let mut present = 0_usize;
    for (spec, value) in participating(row, specs) {
        let weight = weights.get(spec.stat);
        let Some(range) = spec.range else {
            continue;
        };
        if weight <= 0.0 {
            continue;
        }
        numerator += stat_score(range, value) * weight;
        denominator += weight;
        present += 1;
    }
    if denominator <= 0.0 || max_stats_possible == 0 {
        return 0.0;
    }
    (numerator / denominator) * (count_to_f64(present) / count_to_f64(max_stats_possible))
}

/// Observed min/max of every stat across `rows`.
#[must_use]
pub fn observed_ranges(rows: &[SampleRow]) -> BTreeMap<StatId, StatRange> {
    let mut ranges: BTreeMap<StatId, StatRange> = BTreeMap::new();
    for row in rows {
        for (stat, value) in &row.stats {
            ranges
                .entry(*stat)
                .and_modify(|range| {
                    range.min = range.min.min(*value);
                    range.max = range.max.max(*value);
                })
                .or_insert(StatRange {
                    min: *value,
                    max: *value,
                });
        }
    }
    ranges
}

/// Decimal digits kept in persisted perfection values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundingDigits {
    #[serde(default = "RoundingDigits::default_technology")]
    pub technology: u32,
    #[serde(default = "RoundingDigits::default_product")]
    pub product: u32,
}

impl RoundingDigits {
    const fn default_technology() -> u32 {
        3
    }

    const fn default_product() -> u32 {
        5
    }

    #[must_use]
    pub const fn for_family(self, family: ItemFamily) -> u32 {
        match family {
            ItemFamily::Technology { .. } => self.technology,
            ItemFamily::Product => self.product,
        }
    }
}

impl Default for RoundingDigits {
    fn default() -> Self {
        Self {
            technology: Self::default_technology(),
            product: Self::default_product(),
        }
    }
}

/// Scores every row of one item tier table.
pub trait ScoringStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Unrounded perfection per row, in row order.
    fn score(&self, rows: &[SampleRow], tier: &TierSpec) -> Vec<f64>;
}

/// Configured theoretical ranges, weighted by width, with presence penalty.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfiguredRangeWeighted;

impl ScoringStrategy for ConfiguredRangeWeighted {
    fn name(&self) -> &'static str {
        "configured-range-weighted"
    }

    fn score(&self, rows: &[SampleRow], tier: &TierSpec) -> Vec<f64> {
        let weights = compute_weights(&tier.stats);
        let max_stats = max_stats_possible(rows, &tier.stats);
        rows.iter()
            .map(|row| score_row(row, &tier.stats, &weights, max_stats))
            .collect()
    }
}

/// Linear rescale over the table's own observed range, unweighted.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmpiricalRangeUnweighted;

impl ScoringStrategy for EmpiricalRangeUnweighted {
    fn name(&self) -> &'static str {
        "empirical-range-unweighted"
    }

    fn score(&self, rows: &[SampleRow], tier: &TierSpec) -> Vec<f64> {
        let observed = observed_ranges(rows);
        rows.iter()
            .map(|row| {
                let scores: Vec<f64> = participating(row, &tier.stats)
                    .filter_map(|(spec, value)| {
                        observed
                            .get(&spec.stat)
                            .map(|range| stat_score(*range, value))
                    })
                    .collect();
                if scores.is_empty() {
                    0.0
                } else {
                    scores.iter().sum::<f64>() / count_to_f64(scores.len())
                }
            })
            .collect()
    }
}

#[must_use]
pub fn strategy_for(family: ItemFamily) -> &'static dyn ScoringStrategy {
    match family {
        ItemFamily::Technology { .. } => &ConfiguredRangeWeighted,
        ItemFamily::Product => &EmpiricalRangeUnweighted,
    }
}

/// Outcome of scoring one table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableScore {
    pub strategy: &'static str,
    pub max_stats_possible: usize,
    /// Observed stats the tier does not configure; kept but never scored.
    pub unconfigured: Vec<StatId>,
}

/// Rescore `rows` in place. Only the `perfection` field is touched.
pub fn score_table(
    rows: &mut [SampleRow],
    tier: &TierSpec,
    family: ItemFamily,
    digits: u32,
) -> TableScore {
    let strategy = strategy_for(family);
    let unconfigured: Vec<StatId> = rows
        .iter()
        .flat_map(|row| row.stats.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|stat| tier.spec(*stat).is_none())
        .collect();
    if !unconfigured.is_empty() {
        log::warn!("stats {unconfigured:?} observed but not configured; left out of perfection");
    }
    let scores = strategy.score(rows, tier);
    for (row, score) in rows.iter_mut().zip(scores) {
        row.perfection = round_to_digits(score, digits);
    }
    TableScore {
        strategy: strategy.name(),
        max_stats_possible: max_stats_possible(rows, &tier.stats),
        unconfigured,
    }
}

/// Online observed-range tracking during collection.
#[derive(Debug, Clone)]
pub struct RangeTracker {
    label: String,
    expected: BTreeMap<StatId, Option<StatRange>>,
    observed: BTreeMap<StatId, StatRange>,
    warned: BTreeSet<StatId>,
}

impl RangeTracker {
    #[must_use]
    pub fn new(label: impl Into<String>, specs: &[StatSpec]) -> Self {
        Self {
            label: label.into(),
            expected: specs.iter().map(|spec| (spec.stat, spec.range)).collect(),
            observed: BTreeMap::new(),
            warned: BTreeSet::new(),
        }
    }

    pub fn observe(&mut self, row: &SampleRow) {
        for (stat, value) in &row.stats {
            let value = *value;
            match self.observed.get_mut(stat) {
                Some(range) => {
                    range.min = range.min.min(value);
                    range.max = range.max.max(value);
                }
                None => {
                    log::debug!("{}: first {stat} = {value} (seed {})", self.label, row.seed);
                    self.observed.insert(
                        *stat,
                        StatRange {
                            min: value,
                            max: value,
                        },
                    );
                }
            }
            let expected = self.expected.get(stat).copied().flatten();
            if let Some(range) = expected
                && !range.contains(value)
                && self.warned.insert(*stat)
            {
                log::warn!(
                    "{}: {stat} = {value} at seed {} outside configured {}..={}",
                    self.label,
                    row.seed,
                    range.min,
                    range.max
                );
            }
        }
    }

    #[must_use]
    pub fn observed(&self) -> &BTreeMap<StatId, StatRange> {
        &self.observed
    }

    /// Stats that fell outside their configured range at least once.
    #[must_use]
    pub fn out_of_range(&self) -> Vec<StatId> {
        self.warned.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Tier;

    fn tier(stats: Vec<StatSpec>, max_stats: usize) -> TierSpec {
        TierSpec {
            tier: Tier::One,
            max_stats,
            stats,
            unverified: false,
        }
    }

    #[test]
    fn weights_normalize_to_narrowest_range() {
        let specs = vec![
            StatSpec::ranged(StatId::SuitJetpackTank, 100.0, 149.0),
            StatSpec::ranged(StatId::SuitJetpackRefill, 1.0, 5.0),
            StatSpec::ranged(StatId::SuitArmourHealth, 33.0, 33.0).always_same(),
        ];
        let weights = compute_weights(&specs);
        assert!((weights.get(StatId::SuitJetpackRefill) - 1.0).abs() < f64::EPSILON);
        assert!((weights.get(StatId::SuitJetpackTank) - 10.0).abs() < f64::EPSILON);
        assert_eq!(weights.get(StatId::SuitArmourHealth), 0.0);
    }

    #[test]
    fn stat_score_is_linear_and_unclamped() {
        let range = StatRange { min: 5.0, max: 10.0 };
        assert_eq!(stat_score(range, 10.0), 1.0);
        assert_eq!(stat_score(range, 5.0), 0.0);
        assert!((stat_score(range, 12.0) - 1.4).abs() < 1e-12);
        assert_eq!(stat_score(StatRange { min: 7.0, max: 7.0 }, 3.0), 1.0);
    }

    #[test]
    fn empty_or_unweighted_rows_score_zero() {
        let specs = vec![StatSpec::ranged(StatId::SuitEnergy, 1.0, 5.0).excluded()];
        let weights = compute_weights(&specs);
        let row = SampleRow::new(0).with_stat(StatId::SuitEnergy, 5.0);
        assert_eq!(score_row(&row, &specs, &weights, 1), 0.0);
        assert_eq!(score_row(&SampleRow::new(1), &specs, &weights, 0), 0.0);
    }

    #[test]
    fn empirical_strategy_handles_constant_tables() {
        let spec = tier(vec![StatSpec::unranged(StatId::Value)], 1);
        let rows = vec![
            SampleRow::new(0).with_stat(StatId::Value, 42.0),
            SampleRow::new(1).with_stat(StatId::Value, 42.0),
        ];
        assert_eq!(EmpiricalRangeUnweighted.score(&rows, &spec), vec![1.0, 1.0]);
    }

    #[test]
    fn unconfigured_stats_are_reported_not_scored() {
        let spec = tier(vec![StatSpec::ranged(StatId::SuitEnergy, 1.0, 5.0)], 1);
        let mut rows = vec![
            SampleRow::new(0)
                .with_stat(StatId::SuitEnergy, 5.0)
                .with_stat(StatId::SuitEnergyRegen, 9.0),
        ];
        let family = ItemFamily::Technology {
            inventory: crate::catalog::Inventory::Suit,
        };
        let outcome = score_table(&mut rows, &spec, family, 3);
        assert_eq!(outcome.unconfigured, vec![StatId::SuitEnergyRegen]);
        assert_eq!(outcome.strategy, "configured-range-weighted");
        assert_eq!(rows[0].perfection, 1.0);
        assert_eq!(rows[0].stat(StatId::SuitEnergyRegen), Some(9.0));
    }

    #[test]
    fn tracker_flags_out_of_range_once() {
        let specs = vec![StatSpec::ranged(StatId::SuitEnergy, 1.0, 5.0)];
        let mut tracker = RangeTracker::new("UP_ENGY1", &specs);
        tracker.observe(&SampleRow::new(0).with_stat(StatId::SuitEnergy, 3.0));
        tracker.observe(&SampleRow::new(1).with_stat(StatId::SuitEnergy, 8.0));
        tracker.observe(&SampleRow::new(2).with_stat(StatId::SuitEnergy, 9.0));
        assert_eq!(tracker.out_of_range(), vec![StatId::SuitEnergy]);
        assert_eq!(
            tracker.observed().get(&StatId::SuitEnergy),
            Some(&StatRange { min: 3.0, max: 9.0 })
        );
    }
}
