//! Compendium candidate selection.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::desirability::{CandidateContext, DesirabilityOverride};
use crate::row::SampleRow;
use crate::stats::StatId;

/// Lower tiers get `floor(3 / rank)` rows; sparse tables get three times more.
pub const HIGH_NUMBER_MULTIPLIER: usize = 3;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BestPerStat {
    pub rows: Vec<SampleRow>,
    pub max_stats_per_seed: usize,
    /// Every stat column holds a single value across the table.
    pub all_same: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TierSelection {
    pub rows: Vec<SampleRow>,
    pub max_stats_per_seed: usize,
    pub all_same: bool,
}

/// Sorted union of stat columns across `rows`.
#[must_use]
pub fn stat_columns(rows: &[SampleRow]) -> Vec<StatId> {
    rows.iter()
        .flat_map(|row| row.stats.keys().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn by_perfection_then_seed(a: &SampleRow, b: &SampleRow) -> Ordering {
    a.perfection
        .total_cmp(&b.perfection)
        .then(a.seed.cmp(&b.seed))
}

fn sort_descending(rows: &mut [SampleRow]) {
    rows.sort_by(|a, b| by_perfection_then_seed(b, a));
}

fn column_max(rows: &[SampleRow], column: StatId) -> Option<f64> {
    rows.iter()
        .filter_map(|row| row.stat(column))
        .max_by(f64::total_cmp)
}

/// Best row for each column, keeping per column only the candidate with the
/// most stats at their table maximum.
#[must_use]
pub fn best_per_stat(rows: &[SampleRow], columns: &[StatId]) -> BestPerStat {
    let Some(last) = rows.last() else {
        return BestPerStat::default();
    };
    let maxima: BTreeMap<StatId, f64> = columns
        .iter()
        .filter_map(|column| column_max(rows, *column).map(|max| (*column, max)))
        .collect();
    let all_same = columns.iter().all(|column| {
        let min = rows
            .iter()
            .filter_map(|row| row.stat(*column))
            .min_by(f64::total_cmp);
        min == maxima.get(column).copied()
    });
    if all_same {
        return BestPerStat {
            rows: vec![last.clone()],
            max_stats_per_seed: columns.len(),
            all_same: true,
        };
    }

    let mut result: Vec<&SampleRow> = Vec::new();
    for column in columns {
        let best = rows
            .iter()
            .filter(|row| row.has_stat(*column))
            .max_by(|a, b| {
                let (va, vb) = (a.stat(*column).unwrap_or(0.0), b.stat(*column).unwrap_or(0.0));
                va.total_cmp(&vb).then(by_perfection_then_seed(a, b))
            });
        if let Some(best) = best
            && !result.iter().any(|row| row.seed == best.seed)
        {
            result.push(best);
        }
    }

    let is_perfect = |row: &SampleRow, column: StatId| {
        row.stat(column).is_some() && row.stat(column) == maxima.get(&column).copied()
    };
    let mut keep: BTreeMap<StatId, (u32, usize)> = BTreeMap::new();
    let mut max_stats_per_seed = 0;
    for column in columns {
        for row in &result {
            let perfect = columns.iter().filter(|c| is_perfect(row, **c)).count();
            max_stats_per_seed = max_stats_per_seed
                .max(columns.iter().filter(|c| row.has_stat(**c)).count());
            let current = keep.get(column).map_or(0, |(_, count)| *count);
            if is_perfect(row, *column) && perfect > current {
                keep.insert(*column, (row.seed, perfect));
            }
        }
    }
    let kept: BTreeSet<u32> = keep.values().map(|(seed, _)| *seed).collect();
    BestPerStat {
        rows: result
            .into_iter()
            .filter(|row| kept.contains(&row.seed))
            .cloned()
            .collect(),
        max_stats_per_seed,
        all_same: false,
    }
}

/// Deduplicate `fill` by seed and top it up from `source` to `max_rows`,
/// best perfection first.
#[must_use]
pub fn fill_without_duplicates(
    fill: Vec<SampleRow>,
    source: &[SampleRow],
    max_rows: usize,
) -> Vec<SampleRow> {
    let mut seen = BTreeSet::new();
    let mut rows: Vec<SampleRow> = fill
        .into_iter()
        .filter(|row| seen.insert(row.seed))
        .collect();
    if rows.len() <= max_rows {
        let mut remaining: Vec<&SampleRow> = source
            .iter()
            .filter(|row| !seen.contains(&row.seed))
            .collect();
        remaining.sort_by(|a, b| by_perfection_then_seed(b, a));
        let missing = max_rows - rows.len();
        rows.extend(remaining.into_iter().take(missing).cloned());
    }
    sort_descending(&mut rows);
    rows
}

/// Candidates shown for one technology tier.
///
/// `rank` is the 1-based position of the tier in the compendium listing and
/// `max_stats` the tier's configured maximum stat count.
#[must_use]
pub fn select_candidates(
    rows: &[SampleRow],
    rank: usize,
    max_stats: usize,
    overrides: &[Box<dyn DesirabilityOverride>],
) -> TierSelection {
    let mut n = HIGH_NUMBER_MULTIPLIER / rank.max(1);
    let mut columns = stat_columns(rows);
    let available = columns.len();
    let best = best_per_stat(rows, &columns);
    if best.all_same {
        return TierSelection {
            rows: best.rows,
            max_stats_per_seed: best.max_stats_per_seed,
            all_same: true,
        };
    }

    let keep = |row: &SampleRow| !overrides.iter().any(|hook| hook.rejects(row));
    let ctx = CandidateContext {
        rows,
        n,
        max_stats,
    };
    let mut picked = best.rows;
    for hook in overrides {
        picked.extend(hook.extra_candidates(&ctx, &keep));
    }

    let source: Vec<SampleRow> = rows.iter().filter(|row| keep(row)).cloned().collect();
    let suppressed: BTreeSet<StatId> = overrides
        .iter()
        .flat_map(|hook| hook.suppressed_columns())
        .collect();
    columns.retain(|column| !suppressed.contains(column));

    if available > best.max_stats_per_seed {
        for column in &columns {
            let best_with = source
                .iter()
                .filter(|row| row.has_stat(*column))
                .max_by(|a, b| by_perfection_then_seed(a, b));
            if let Some(row) = best_with {
                picked.push(row.clone());
            }
        }
        n *= HIGH_NUMBER_MULTIPLIER;
    }

    TierSelection {
        rows: fill_without_duplicates(picked, &source, n + available),
        max_stats_per_seed: best.max_stats_per_seed,
        all_same: false,
    }
}

/// Products list every roll that reaches full perfection.
#[must_use]
pub fn select_product_candidates(rows: &[SampleRow]) -> Vec<SampleRow> {
    rows.iter()
        .filter(|row| row.perfection.total_cmp(&1.0) == Ordering::Equal)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(seed: u32, perfection: f64, stats: &[(StatId, f64)]) -> SampleRow {
        let mut row = SampleRow::new(seed);
        row.perfection = perfection;
        for (stat, value) in stats {
            row.stats.insert(*stat, *value);
        }
        row
    }

    #[test]
    fn all_same_tables_collapse_to_last_row() {
        let rows = vec![
            row(0, 1.0, &[(StatId::ShipHyperdriveJumpsPerCell, 100.0)]),
            row(1, 1.0, &[(StatId::ShipHyperdriveJumpsPerCell, 100.0)]),
        ];
        let best = best_per_stat(&rows, &stat_columns(&rows));
        assert!(best.all_same);
        assert_eq!(best.rows.len(), 1);
        assert_eq!(best.rows[0].seed, 1);
    }

    #[test]
    fn best_per_stat_prefers_rows_with_more_perfect_stats() {
        let rows = vec![
            row(0, 0.5, &[(StatId::SuitEnergy, 10.0)]),
            row(1, 0.9, &[(StatId::SuitEnergy, 10.0), (StatId::SuitEnergyRegen, 5.0)]),
            row(2, 0.4, &[(StatId::SuitEnergyRegen, 2.0)]),
        ];
        let best = best_per_stat(&rows, &stat_columns(&rows));
        assert!(!best.all_same);
        assert_eq!(best.max_stats_per_seed, 2);
        let seeds: Vec<u32> = best.rows.iter().map(|row| row.seed).collect();
        assert_eq!(seeds, vec![1]);
    }

    #[test]
    fn fill_tops_up_without_repeating_seeds() {
        let source: Vec<SampleRow> = (0..6)
            .map(|seed| row(seed, f64::from(seed) / 10.0, &[]))
            .collect();
        let filled = fill_without_duplicates(vec![source[1].clone(), source[1].clone()], &source, 3);
        let seeds: Vec<u32> = filled.iter().map(|row| row.seed).collect();
        assert_eq!(seeds, vec![5, 4, 1]);
    }

    #[test]
    fn rank_controls_candidate_count() {
        let rows: Vec<SampleRow> = (0..20)
            .map(|seed| row(seed, f64::from(seed) / 20.0, &[(StatId::SuitEnergy, f64::from(seed))]))
            .collect();
        let first = select_candidates(&rows, 1, 1, &[]);
        let second = select_candidates(&rows, 2, 1, &[]);
        assert_eq!(first.rows.len(), 3 + 1);
        assert_eq!(second.rows.len(), 1 + 1);
        assert_eq!(first.rows[0].seed, 19);
    }

    #[test]
    fn products_keep_only_perfect_rolls() {
        let rows = vec![row(0, 1.0, &[]), row(1, 0.99999, &[]), row(2, 1.0, &[])];
        let seeds: Vec<u32> = select_product_candidates(&rows)
            .iter()
            .map(|row| row.seed)
            .collect();
        assert_eq!(seeds, vec![0, 2]);
    }
}
