//! On-disk layout of harvested data.
//!
//! ```text
//! <root>/<Inventory|Product>/<ITEM>.csv       sep=, line, then header and rows
//! <root>/<Inventory|Product>/<ITEM>.parquet   same schema, typed
//! <root>/unavailable.json                     items missing from the game version
//! <checkpoints>/<ITEM>.json                   next seed to process
//! <checkpoints>/<ITEM>.rows.jsonl             rows collected so far
//! ```

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use pi_engine::numbers::{seed_from_i64, seed_to_i32};
use pi_engine::row::{PERFECTION_COLUMN, SEED_COLUMN};
use pi_engine::{
    Checkpoint, ItemFamily, ItemKey, Language, SampleRow, StatId, TableError, TableLayout,
    WalkObserver, ensure_unique_seeds,
};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Excel-style separator hint leading every CSV table.
pub const SEPARATOR_HINT: &str = "sep=,";
const MANIFEST_FILE: &str = "unavailable.json";

/// A table read back from disk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoredTable {
    pub layout: TableLayout,
    pub rows: Vec<SampleRow>,
}

/// A persisted table found while scanning the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub folder: String,
    pub stem: String,
    pub csv: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableEntry {
    pub item: ItemKey,
    pub recorded_at: String,
}

#[derive(Debug)]
pub struct TableStore {
    root: PathBuf,
    checkpoints: PathBuf,
    manifest_lock: Mutex<()>,
}

impl TableStore {
    #[must_use]
    pub fn new(root: PathBuf, checkpoints: PathBuf) -> Self {
        Self {
            root,
            checkpoints,
            manifest_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn table_path(&self, family: ItemFamily, key: &ItemKey, extension: &str) -> PathBuf {
        self.root
            .join(family.folder())
            .join(format!("{key}.{extension}"))
    }

    /// Write both the CSV and the Parquet rendition of a table.
    ///
    /// # Errors
    ///
    /// Returns an error if a seed does not fit the schema or a file cannot be written.
    pub fn write_table(
        &self,
        family: ItemFamily,
        key: &ItemKey,
        layout: &TableLayout,
        rows: &[SampleRow],
    ) -> Result<()> {
        let csv = self.table_path(family, key, "csv");
        if let Some(parent) = csv.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut frame = to_frame(layout, rows)?;
        write_csv(&csv, &mut frame)?;
        write_parquet(&self.table_path(family, key, "parquet"), &mut frame)?;
        log::debug!("{key}: wrote {} rows to {}", rows.len(), csv.display());
        Ok(())
    }

    /// Previously written table of `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the table exists but cannot be read.
    pub fn read_existing(&self, family: ItemFamily, key: &ItemKey) -> Result<Option<StoredTable>> {
        let csv = self.table_path(family, key, "csv");
        if !csv.exists() {
            return Ok(None);
        }
        read_csv(&csv).map(Some)
    }

    /// Every CSV table under the root, sorted by folder and stem.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be listed.
    pub fn list_tables(&self) -> Result<Vec<TableEntry>> {
        let mut entries = Vec::new();
        if !self.root.exists() {
            return Ok(entries);
        }
        for folder in read_dir_sorted(&self.root)? {
            if !folder.is_dir() || folder == self.checkpoints {
                continue;
            }
            let Some(folder_name) = file_name(&folder) else {
                continue;
            };
            for path in read_dir_sorted(&folder)? {
                if path.extension().and_then(|ext| ext.to_str()) != Some("csv") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                entries.push(TableEntry {
                    folder: folder_name.clone(),
                    stem: stem.to_string(),
                    csv: path.clone(),
                });
            }
        }
        Ok(entries)
    }

    fn checkpoint_path(&self, key: &ItemKey) -> PathBuf {
        self.checkpoints.join(format!("{key}.json"))
    }

    fn partial_path(&self, key: &ItemKey) -> PathBuf {
        self.checkpoints.join(format!("{key}.rows.jsonl"))
    }

    /// # Errors
    ///
    /// Returns an error if the checkpoint exists but cannot be parsed.
    pub fn load_checkpoint(&self, key: &ItemKey) -> Result<Option<Checkpoint>> {
        let path = self.checkpoint_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let checkpoint = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(checkpoint))
    }

    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be written.
    pub fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        fs::create_dir_all(&self.checkpoints)
            .with_context(|| format!("failed to create {}", self.checkpoints.display()))?;
        let path = self.checkpoint_path(&checkpoint.item);
        let payload = serde_json::to_string_pretty(checkpoint)?;
        fs::write(&path, payload).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Drop the checkpoint and the collected rows of `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be removed.
    pub fn clear_progress(&self, key: &ItemKey) -> Result<()> {
        for path in [self.checkpoint_path(key), self.partial_path(key)] {
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }

    /// Rows collected so far for `key`, in file order.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but a line cannot be parsed.
    pub fn load_partial_rows(&self, key: &ItemKey) -> Result<Vec<SampleRow>> {
        let path = self.partial_path(key);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut rows = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            rows.push(
                serde_json::from_str(&line)
                    .with_context(|| format!("{}:{}: malformed row", path.display(), idx + 1))?,
            );
        }
        Ok(rows)
    }

    /// Drop collected rows of `key` inside `seeds`, which are about to be
    /// walked again.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be rewritten.
    pub fn discard_partial_range(&self, key: &ItemKey, seeds: std::ops::Range<u32>) -> Result<()> {
        let rows = self.load_partial_rows(key)?;
        let kept: Vec<&SampleRow> = rows.iter().filter(|row| !seeds.contains(&row.seed)).collect();
        if kept.len() == rows.len() {
            return Ok(());
        }
        log::debug!("{key}: discarding {} stale rows", rows.len() - kept.len());
        let path = self.partial_path(key);
        let mut writer = BufWriter::new(
            File::create(&path).with_context(|| format!("failed to rewrite {}", path.display()))?,
        );
        for row in kept {
            serde_json::to_writer(&mut writer, row)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Appending sink for rows of `key`, checkpointing as it goes.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows file cannot be opened.
    pub fn partial_writer(&self, key: &ItemKey, start: u32) -> Result<PartialRowWriter<'_>> {
        fs::create_dir_all(&self.checkpoints)
            .with_context(|| format!("failed to create {}", self.checkpoints.display()))?;
        let path = self.partial_path(key);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(PartialRowWriter {
            store: self,
            key: key.clone(),
            start,
            writer: BufWriter::new(file),
        })
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Items marked unavailable, keyed by their display key.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest exists but cannot be parsed.
    pub fn unavailable(&self) -> Result<BTreeMap<String, UnavailableEntry>> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// # Errors
    ///
    /// Returns an error if the manifest cannot be updated.
    pub fn set_unavailable(&self, key: &ItemKey, unavailable: bool) -> Result<()> {
        let _guard = self
            .manifest_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut manifest = self.unavailable()?;
        let changed = if unavailable {
            manifest
                .insert(
                    key.to_string(),
                    UnavailableEntry {
                        item: key.clone(),
                        recorded_at: Utc::now().to_rfc3339(),
                    },
                )
                .is_none()
        } else {
            manifest.remove(&key.to_string()).is_some()
        };
        if !changed {
            return Ok(());
        }
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        let path = self.manifest_path();
        fs::write(&path, serde_json::to_string_pretty(&manifest)?)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Streams accepted rows to the partial store.
pub struct PartialRowWriter<'a> {
    store: &'a TableStore,
    key: ItemKey,
    start: u32,
    writer: BufWriter<File>,
}

impl PartialRowWriter<'_> {
    /// Flush rows and record `next_seed` as the resume point.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows or the checkpoint cannot be written.
    pub fn commit(&mut self, next_seed: u32) -> Result<()> {
        self.writer.flush()?;
        self.store
            .save_checkpoint(&Checkpoint::new(self.key.clone(), next_seed))
    }
}

impl WalkObserver for PartialRowWriter<'_> {
    fn on_row(&mut self, row: SampleRow) -> Result<(), String> {
        serde_json::to_writer(&mut self.writer, &row).map_err(|err| err.to_string())?;
        self.writer.write_all(b"\n").map_err(|err| err.to_string())
    }

    fn on_progress(&mut self, walked: u32, _total: u32) {
        if let Err(err) = self.commit(self.start + walked) {
            log::warn!("{}: checkpoint not saved: {err:#}", self.key);
        }
    }
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

/// Build the persisted frame: seed, perfection, stats, then languages.
///
/// # Errors
///
/// Returns an error if a seed exceeds the 32-bit schema.
pub fn to_frame(layout: &TableLayout, rows: &[SampleRow]) -> Result<DataFrame> {
    let seeds = rows
        .iter()
        .map(|row| {
            seed_to_i32(row.seed).ok_or_else(|| anyhow!("seed {} exceeds Int32", row.seed))
        })
        .collect::<Result<Vec<i32>>>()?;
    let perfection: Vec<f64> = rows.iter().map(|row| row.perfection).collect();
    let mut columns = vec![
        Series::new(SEED_COLUMN.into(), seeds).into_column(),
        Series::new(PERFECTION_COLUMN.into(), perfection).into_column(),
    ];
    for stat in &layout.stats {
        let values: Vec<Option<f64>> = rows.iter().map(|row| row.stat(*stat)).collect();
        columns.push(Series::new(stat.as_str().into(), values).into_column());
    }
    for language in &layout.languages {
        let names: Vec<String> = rows
            .iter()
            .map(|row| row.name(*language).unwrap_or_default().to_string())
            .collect();
        columns.push(Series::new(language.column().into(), names).into_column());
    }
    Ok(DataFrame::new(columns)?)
}

fn write_csv(path: &Path, frame: &mut DataFrame) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    writeln!(file, "{SEPARATOR_HINT}")?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(frame)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn write_parquet(path: &Path, frame: &mut DataFrame) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    ParquetWriter::new(file)
        .finish(frame)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn has_separator_hint(path: &Path) -> Result<bool> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut first = String::new();
    BufReader::new(file).read_line(&mut first)?;
    Ok(first.trim_end().eq_ignore_ascii_case(SEPARATOR_HINT))
}

/// Read a CSV table, with or without the separator hint line.
///
/// # Errors
///
/// Returns an error if the file is unreadable or its columns are unknown.
pub fn read_csv(path: &Path) -> Result<StoredTable> {
    let skip = usize::from(has_separator_hint(path)?);
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_skip_rows(skip)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("failed to read {}", path.display()))?;
    from_frame(&frame).with_context(|| format!("invalid table {}", path.display()))
}

/// # Errors
///
/// Returns an error if the file is unreadable or its columns are unknown.
pub fn read_parquet(path: &Path) -> Result<StoredTable> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let frame = ParquetReader::new(file)
        .finish()
        .with_context(|| format!("failed to read {}", path.display()))?;
    from_frame(&frame).with_context(|| format!("invalid table {}", path.display()))
}

fn typed(frame: &DataFrame, name: &str, dtype: &DataType) -> Result<Series> {
    Ok(frame
        .column(name)?
        .as_materialized_series()
        .cast(dtype)?)
}

/// Rows of a persisted frame; legacy language headers are accepted.
///
/// # Errors
///
/// Returns an error on missing or unknown columns, empty or out-of-range
/// seeds, and duplicated seeds.
pub fn from_frame(frame: &DataFrame) -> Result<StoredTable> {
    let names: Vec<String> = frame
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let layout = TableLayout::from_header(&names)?;

    let seeds = typed(frame, SEED_COLUMN, &DataType::Int64)?;
    let mut rows = seeds
        .i64()?
        .into_iter()
        .map(|value| {
            let value = value.ok_or_else(|| anyhow!("empty seed cell"))?;
            seed_from_i64(value)
                .map(SampleRow::new)
                .ok_or_else(|| TableError::InvalidSeed(value).into())
        })
        .collect::<Result<Vec<SampleRow>>>()?;

    let perfection = typed(frame, PERFECTION_COLUMN, &DataType::Float64)?;
    for (row, value) in rows.iter_mut().zip(perfection.f64()?) {
        row.perfection = value.unwrap_or(0.0);
    }

    for name in &names {
        if name == SEED_COLUMN || name == PERFECTION_COLUMN {
            continue;
        }
        if let Some(language) = Language::from_column(name) {
            let column = typed(frame, name, &DataType::String)?;
            for (row, value) in rows.iter_mut().zip(column.str()?) {
                if let Some(value) = value.filter(|v| !v.is_empty()) {
                    row.names.insert(language, value.to_string());
                }
            }
        } else {
            let stat: StatId = name.parse()?;
            let column = typed(frame, name, &DataType::Float64)?;
            for (row, value) in rows.iter_mut().zip(column.f64()?) {
                if let Some(value) = value {
                    row.stats.insert(stat, value);
                }
            }
        }
    }
    ensure_unique_seeds(&rows)?;
    Ok(StoredTable { layout, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pi_engine::{Inventory, Tier};

    fn temp_root(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "pi-store-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    fn store(label: &str) -> TableStore {
        let root = temp_root(label);
        TableStore::new(root.clone(), root.join(".checkpoints"))
    }

    fn sample_rows() -> Vec<SampleRow> {
        let mut first = SampleRow::new(0)
            .with_name(Language::En, "Nimble Shield")
            .with_stat(StatId::SuitArmourShieldStrength, 7.0);
        first.perfection = 0.4;
        let mut second = SampleRow::new(1)
            .with_name(Language::En, "Sturdy Shield")
            .with_name(Language::De, "Robuster Schild")
            .with_stat(StatId::SuitArmourShieldStrength, 10.0)
            .with_stat(StatId::SuitArmourHealth, 20.0);
        second.perfection = 1.0;
        vec![first, second]
    }

    #[test]
    fn tables_round_trip_through_both_formats() {
        let store = store("round-trip");
        let family = ItemFamily::Technology {
            inventory: Inventory::Suit,
        };
        let key = ItemKey::new("UP_SHLD", Tier::One);
        let rows = sample_rows();
        let layout = TableLayout::for_rows(&rows, &[]);
        store.write_table(family, &key, &layout, &rows).unwrap();

        let csv_path = store.table_path(family, &key, "csv");
        let text = fs::read_to_string(&csv_path).unwrap();
        assert!(text.starts_with("sep=,"));
        assert!(text.lines().nth(1).unwrap().starts_with("Seed,Perfection,"));

        let from_csv = read_csv(&csv_path).unwrap();
        let from_parquet = read_parquet(&store.table_path(family, &key, "parquet")).unwrap();
        assert_eq!(from_csv.rows, rows);
        assert_eq!(from_parquet.rows, rows);
        assert_eq!(from_csv.layout, layout);

        let listed = store.list_tables().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].folder, "Suit");
        assert_eq!(listed[0].stem, "UP_SHLD1");
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn partial_rows_resume_from_checkpoint() {
        let store = store("partial");
        let key = ItemKey::new("UP_JET", Tier::X);
        {
            let mut writer = store.partial_writer(&key, 0).unwrap();
            for row in sample_rows() {
                writer.on_row(row).unwrap();
            }
            writer.commit(1).unwrap();
        }
        assert_eq!(store.load_checkpoint(&key).unwrap(), Some(Checkpoint::new(key.clone(), 1)));
        store.discard_partial_range(&key, 1..10).unwrap();
        let rows = store.load_partial_rows(&key).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].seed, 0);

        store.clear_progress(&key).unwrap();
        assert!(store.load_checkpoint(&key).unwrap().is_none());
        assert!(store.load_partial_rows(&key).unwrap().is_empty());
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn unavailable_manifest_marks_and_clears() {
        let store = store("manifest");
        let key = ItemKey::new("UP_UNW", Tier::One);
        store.set_unavailable(&key, true).unwrap();
        assert!(store.unavailable().unwrap().contains_key("UP_UNW1"));
        store.set_unavailable(&key, false).unwrap();
        assert!(store.unavailable().unwrap().is_empty());
        let _ = fs::remove_dir_all(store.root());
    }

    #[test]
    fn legacy_language_headers_are_accepted() {
        let root = temp_root("legacy");
        fs::create_dir_all(&root).unwrap();
        let path = root.join("UP_JETX.csv");
        fs::write(
            &path,
            "Seed,Perfection,Suit_Jetpack_Tank,Name (en),Name (zh-CN)\n0,0.5,120,Jet,喷气\n",
        )
        .unwrap();
        let table = read_csv(&path).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].name(Language::ZhHans), Some("喷气"));
        assert_eq!(table.rows[0].stat(StatId::SuitJetpackTank), Some(120.0));
        let _ = fs::remove_dir_all(&root);
    }
}
