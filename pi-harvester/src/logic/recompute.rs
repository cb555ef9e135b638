//! Rescore every persisted table with the current catalog.

use anyhow::Result;
use pi_engine::{SampleRow, TableLayout, score_table};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::Harvest;
use super::store::read_csv;
use crate::common::format_elapsed;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRecompute {
    pub item: String,
    pub path: PathBuf,
    pub rows: usize,
    pub changed: bool,
    /// SHA-256 of the rescored perfection column.
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RecomputeSummary {
    pub tables: Vec<TableRecompute>,
    /// Tables that could not be matched to the catalog.
    pub skipped: Vec<PathBuf>,
    pub elapsed: Duration,
}

impl RecomputeSummary {
    #[must_use]
    pub fn changed(&self) -> usize {
        self.tables.iter().filter(|table| table.changed).count()
    }
}

/// Hex SHA-256 over the little-endian bytes of each perfection value.
#[must_use]
pub fn perfection_digest(rows: &[SampleRow]) -> String {
    let mut hasher = Sha256::new();
    for row in rows {
        hasher.update(row.perfection.to_le_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// # Errors
///
/// Returns an error if the root cannot be scanned or a matched table cannot
/// be read or rewritten.
pub fn recompute_all(harvest: &Harvest) -> Result<RecomputeSummary> {
    let started = Instant::now();
    let mut summary = RecomputeSummary::default();
    for entry in harvest.store.list_tables()? {
        let Some(key) = harvest.catalog.resolve(&entry.stem) else {
            log::warn!("{}: not a configured item, skipped", entry.csv.display());
            summary.skipped.push(entry.csv);
            continue;
        };
        let Some(tier) = harvest.catalog.tier(&key) else {
            summary.skipped.push(entry.csv);
            continue;
        };
        let family = tier.family();
        if family.folder() != entry.folder {
            log::warn!(
                "{}: {key} belongs under {}, skipped",
                entry.csv.display(),
                family.folder()
            );
            summary.skipped.push(entry.csv);
            continue;
        }

        let table_started = Instant::now();
        let mut rows = read_csv(&entry.csv)?.rows;
        let before = perfection_digest(&rows);
        let digits = harvest.config.rounding.for_family(family);
        score_table(&mut rows, tier.spec, family, digits);
        let after = perfection_digest(&rows);
        let layout = TableLayout::for_rows(&rows, &tier.spec.stats);
        harvest.store.write_table(family, &key, &layout, &rows)?;

        let changed = before != after;
        log::info!(
            "{key}: {} rows {} in {}",
            rows.len(),
            if changed { "rescored" } else { "unchanged" },
            format_elapsed(table_started.elapsed())
        );
        summary.tables.push(TableRecompute {
            item: key.to_string(),
            path: entry.csv,
            rows: rows.len(),
            changed,
            digest: after,
        });
    }
    summary.elapsed = started.elapsed();
    log::info!(
        "recomputed {} tables ({} changed) in {}",
        summary.tables.len(),
        summary.changed(),
        format_elapsed(summary.elapsed)
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarvestConfig;
    use pi_engine::{ItemKey, StatId, Tier};

    fn harvest(label: &str) -> Harvest {
        let root = std::env::temp_dir().join(format!(
            "pi-recompute-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        Harvest::open(HarvestConfig {
            output_root: root,
            ..HarvestConfig::default()
        })
        .unwrap()
    }

    fn shield_rows() -> Vec<SampleRow> {
        [90.0, 92.5, 95.0]
            .into_iter()
            .zip(0..)
            .map(|(value, seed)| {
                SampleRow::new(seed).with_stat(StatId::SuitArmourShieldStrength, value)
            })
            .collect()
    }

    #[test]
    fn recompute_fixes_stale_perfection_and_is_stable() {
        let harvest = harvest("stable");
        let key = ItemKey::new("UP_SHLD", Tier::One);
        let tier = harvest.catalog.tier(&key).unwrap();
        let rows = shield_rows();
        let layout = TableLayout::for_rows(&rows, &tier.spec.stats);
        harvest
            .store
            .write_table(tier.family(), &key, &layout, &rows)
            .unwrap();

        let first = recompute_all(&harvest).unwrap();
        assert_eq!(first.tables.len(), 1);
        assert!(first.tables[0].changed);
        let rescored = read_csv(&first.tables[0].path).unwrap().rows;
        assert!(rescored.windows(2).all(|w| w[0].perfection <= w[1].perfection));

        let second = recompute_all(&harvest).unwrap();
        assert!(!second.tables[0].changed);
        assert_eq!(first.tables[0].digest, second.tables[0].digest);
        let _ = std::fs::remove_dir_all(harvest.store.root());
    }

    #[test]
    fn unknown_tables_are_skipped() {
        let harvest = harvest("skip");
        let dir = harvest.store.root().join("Suit");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("UP_NOPE1.csv"), "sep=,\nSeed,Perfection\n0,1.0\n").unwrap();
        let summary = recompute_all(&harvest).unwrap();
        assert!(summary.tables.is_empty());
        assert_eq!(summary.skipped.len(), 1);
        let _ = std::fs::remove_dir_all(harvest.store.root());
    }

    #[test]
    fn digest_tracks_perfection_only() {
        let mut rows = shield_rows();
        let before = perfection_digest(&rows);
        rows[0].names.insert(pi_engine::Language::En, "Renamed".to_string());
        assert_eq!(before, perfection_digest(&rows));
        rows[0].perfection = 0.5;
        assert_ne!(before, perfection_digest(&rows));
        assert_eq!(before.len(), 64);
    }
}
