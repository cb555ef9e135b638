//! Per-item desirability overrides for compendium candidate selection.
//!
//! Some stats are unwanted whatever their value, and a few are wanted at
//! both extremes. These hooks shape which rows are offered as candidates;
//! they never change a row's stored perfection.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::catalog::{Catalog, ItemKey, StatRange, Tier};
use crate::numbers::count_to_f64;
use crate::row::SampleRow;
use crate::scoring::{observed_ranges, stat_score, weights_from_ranges};
use crate::stats::StatId;

/// Override data as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverrideRule {
    /// Rows carrying any of these stats are not desirable.
    RejectStats { stats: Vec<StatId> },
    /// Both the lowest and the highest rolls of `stat` are desirable.
    TwoSided { stat: StatId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideSpec {
    pub item_id: String,
    /// Tiers the rule applies to; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiers: Vec<Tier>,
    #[serde(flatten)]
    pub rule: OverrideRule,
}

impl OverrideSpec {
    #[must_use]
    pub fn applies_to(&self, key: &ItemKey) -> bool {
        self.item_id == key.item_id && (self.tiers.is_empty() || self.tiers.contains(&key.tier))
    }
}

/// Inputs shared by every hook while selecting candidates for one tier.
#[derive(Debug, Clone, Copy)]
pub struct CandidateContext<'a> {
    /// Every row of the tier table.
    pub rows: &'a [SampleRow],
    /// Candidates to take per group.
    pub n: usize,
    /// Configured maximum stat count of the tier.
    pub max_stats: usize,
}

pub trait DesirabilityOverride: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn rejects(&self, _row: &SampleRow) -> bool {
        false
    }

    /// Columns that no longer earn their own best-per-stat pick.
    fn suppressed_columns(&self) -> Vec<StatId> {
        Vec::new()
    }

    /// Additional candidates drawn from rows accepted by `keep`.
    fn extra_candidates(
        &self,
        _ctx: &CandidateContext<'_>,
        _keep: &dyn Fn(&SampleRow) -> bool,
    ) -> Vec<SampleRow> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectStats {
    pub stats: Vec<StatId>,
}

impl DesirabilityOverride for RejectStats {
    fn name(&self) -> &'static str {
        "reject-stats"
    }

    fn rejects(&self, row: &SampleRow) -> bool {
        self.stats.iter().any(|stat| row.has_stat(*stat))
    }

    fn suppressed_columns(&self) -> Vec<StatId> {
        self.stats.clone()
    }
}

/// Rescores the table with `stat` folded around the middle of its observed
/// range, then offers the best `n` rows from each side of that threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwoSided {
    pub stat: StatId,
}

impl TwoSided {
    fn rescore(&self, rows: &[SampleRow], max_stats: usize) -> Option<(f64, Vec<f64>)> {
        let ranges = observed_ranges(rows);
        let folded = *ranges.get(&self.stat)?;
        let half = folded.width() / 2.0;
        let threshold = folded.max - half;
        let weights = weights_from_ranges(ranges.iter().map(|(stat, range)| (*stat, *range)));

        let scores = rows
            .iter()
            .map(|row| {
                let mut numerator = 0.0;
                let mut denominator = 0.0;
                let mut present = 0_usize;
                for (stat, value) in &row.stats {
                    let Some(range) = ranges.get(stat) else {
                        continue;
                    };
                    let weight = weights.get(*stat);
                    let p = if *stat != self.stat || *value > threshold {
                        let width = if *stat == self.stat { half } else { range.width() };
                        stat_score(
                            StatRange {
                                min: range.max - width,
                                max: range.max,
                            },
                            *value,
                        )
                    } else if half > 0.0 {
                        1.0 - (value - range.min) / half
                    } else {
                        1.0
                    };
                    numerator += p * weight;
                    denominator += weight;
                    present += 1;
                }
                if denominator <= 0.0 || max_stats == 0 {
                    0.0
                } else {
                    (numerator / denominator) * (count_to_f64(present) / count_to_f64(max_stats))
                }
            })
            .collect();
        Some((threshold, scores))
    }
}

impl DesirabilityOverride for TwoSided {
    fn name(&self) -> &'static str {
        "two-sided"
    }

    fn extra_candidates(
        &self,
        ctx: &CandidateContext<'_>,
        keep: &dyn Fn(&SampleRow) -> bool,
    ) -> Vec<SampleRow> {
        let Some((threshold, scores)) = self.rescore(ctx.rows, ctx.max_stats) else {
            return Vec::new();
        };
        let scored: Vec<(&SampleRow, f64)> = ctx
            .rows
            .iter()
            .zip(scores)
            .filter(|&(row, _)| keep(row))
            .collect();
        let top = |side: &dyn Fn(f64) -> bool| {
            let mut picked: Vec<(&SampleRow, f64)> = scored
                .iter()
                .filter(|(row, _)| row.stat(self.stat).is_some_and(side))
                .copied()
                .collect();
            picked.sort_by(|a, b| by_score_then_seed(b, a));
            picked.into_iter().take(ctx.n).map(|(row, _)| row.clone())
        };
        let mut extra: Vec<SampleRow> = top(&|v| v < threshold).collect();
        extra.extend(top(&|v| v > threshold));
        extra
    }
}

fn by_score_then_seed(a: &(&SampleRow, f64), b: &(&SampleRow, f64)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.seed.cmp(&b.0.seed))
}

/// Materializes catalog override data into hooks.
#[derive(Debug, Clone, Default)]
pub struct OverrideRegistry {
    specs: Vec<OverrideSpec>,
}

impl OverrideRegistry {
    #[must_use]
    pub fn new(specs: Vec<OverrideSpec>) -> Self {
        Self { specs }
    }

    #[must_use]
    pub fn from_catalog(catalog: &Catalog) -> Self {
        Self::new(catalog.overrides.clone())
    }

    #[must_use]
    pub fn for_item(&self, key: &ItemKey) -> Vec<Box<dyn DesirabilityOverride>> {
        self.specs
            .iter()
            .filter(|spec| spec.applies_to(key))
            .map(|spec| -> Box<dyn DesirabilityOverride> {
                match &spec.rule {
                    OverrideRule::RejectStats { stats } => Box::new(RejectStats {
                        stats: stats.clone(),
                    }),
                    OverrideRule::TwoSided { stat } => Box::new(TwoSided { stat: *stat }),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jet_row(seed: u32, ignition: f64, tank: f64) -> SampleRow {
        SampleRow::new(seed)
            .with_stat(StatId::SuitJetpackIgnition, ignition)
            .with_stat(StatId::SuitJetpackTank, tank)
    }

    #[test]
    fn registry_filters_by_item_and_tier() {
        let registry = OverrideRegistry::from_catalog(Catalog::embedded());
        let jet_x = registry.for_item(&ItemKey::new("UP_JET", Tier::X));
        let jet_4 = registry.for_item(&ItemKey::new("UP_JET", Tier::Four));
        assert_eq!(jet_x.len(), 2);
        assert_eq!(jet_4.len(), 1);
        assert_eq!(jet_4[0].name(), "reject-stats");
        assert!(registry.for_item(&ItemKey::new("UP_LASER", Tier::X)).is_empty());
        let gren_1 = registry.for_item(&ItemKey::new("UP_GREN", Tier::One));
        let suppressed: Vec<StatId> = gren_1
            .iter()
            .flat_map(|hook| hook.suppressed_columns())
            .collect();
        assert_eq!(
            suppressed,
            vec![StatId::WeaponGrenadeBounce, StatId::WeaponGrenadeRadius]
        );
    }

    #[test]
    fn reject_stats_matches_presence_not_value() {
        let hook = RejectStats {
            stats: vec![StatId::SuitJetpackDrain],
        };
        assert!(hook.rejects(&SampleRow::new(0).with_stat(StatId::SuitJetpackDrain, 0.0)));
        assert!(!hook.rejects(&SampleRow::new(1).with_stat(StatId::SuitJetpackTank, 120.0)));
    }

    #[test]
    fn two_sided_offers_both_extremes() {
        let rows = vec![
            jet_row(0, 1.0, 200.0),
            jet_row(1, 3.0, 200.0),
            jet_row(2, 8.0, 200.0),
            jet_row(3, 15.0, 200.0),
            jet_row(4, 14.0, 100.0),
        ];
        let hook = TwoSided {
            stat: StatId::SuitJetpackIgnition,
        };
        let ctx = CandidateContext {
            rows: &rows,
            n: 1,
            max_stats: 2,
        };
        let seeds: Vec<u32> = hook
            .extra_candidates(&ctx, &|_| true)
            .iter()
            .map(|row| row.seed)
            .collect();
        assert_eq!(seeds, vec![0, 3]);

        let without_low: Vec<u32> = hook
            .extra_candidates(&ctx, &|row| row.seed != 0)
            .iter()
            .map(|row| row.seed)
            .collect();
        assert_eq!(without_low, vec![1, 3]);
    }

    #[test]
    fn two_sided_keeps_stored_perfection() {
        let mut rows = vec![jet_row(0, 1.0, 200.0), jet_row(1, 15.0, 200.0)];
        rows[0].perfection = 0.25;
        let hook = TwoSided {
            stat: StatId::SuitJetpackIgnition,
        };
        let ctx = CandidateContext {
            rows: &rows,
            n: 3,
            max_stats: 2,
        };
        let extra = hook.extra_candidates(&ctx, &|_| true);
        assert_eq!(extra.len(), 2);
        assert_eq!(extra[0].perfection, 0.25);
    }
}
