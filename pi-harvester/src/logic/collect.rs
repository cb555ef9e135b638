//! Concurrent collection batch.
//!
//! Each selected item tier is swept by one blocking worker that owns its
//! source for the whole sweep. Workers never share state beyond the batch
//! counters, and one item's failure is logged without touching its siblings.

use anyhow::{Context, Result, ensure};
use pi_engine::{
    ItemKey, SampleRow, SeedPartition, SeedWalker, StatId, StatTable, TableLayout, TierContext,
    WalkError, carry_forward, resume_range, score_table,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::Harvest;
use crate::common::format_elapsed;
use crate::sources::{RecordedSources, SourceFactory, SourceKind, SyntheticSources};

#[derive(Debug, Clone)]
pub struct CollectRequest {
    pub partition: SeedPartition,
    pub filters: Vec<String>,
    pub source: SourceKind,
    pub captures: PathBuf,
}

/// Spawned and finished workers of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounters {
    pub spawned: usize,
    pub finished: usize,
}

impl BatchCounters {
    #[must_use]
    pub const fn is_complete(&self, total: usize) -> bool {
        self.spawned == total && self.finished == total
    }
}

#[derive(Debug, Default)]
struct BatchTracker {
    counters: Mutex<BatchCounters>,
}

impl BatchTracker {
    fn update(&self, apply: impl FnOnce(&mut BatchCounters)) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut counters);
    }

    fn snapshot(&self) -> BatchCounters {
        *self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What happened to one item tier in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Every seed is present; the table was scored and written.
    /// `out_of_range` covers the seeds walked in this run only.
    Finalized {
        item: String,
        rows: usize,
        max_stats_possible: usize,
        out_of_range: Vec<StatId>,
    },
    /// This slice is done; later slices remain.
    Partial { item: String, next_seed: u32 },
    /// The final slice is done but earlier slices never ran.
    Incomplete { item: String, missing: usize },
    Unavailable { item: String },
    Failed { item: String, error: String },
    Cancelled { item: String },
}

impl ItemOutcome {
    #[must_use]
    pub fn item(&self) -> &str {
        match self {
            Self::Finalized { item, .. }
            | Self::Partial { item, .. }
            | Self::Incomplete { item, .. }
            | Self::Unavailable { item }
            | Self::Failed { item, .. }
            | Self::Cancelled { item } => item,
        }
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub outcomes: Vec<ItemOutcome>,
    #[serde(skip)]
    pub counters: BatchCounters,
    pub elapsed: Duration,
}

/// Sweep every selected item tier over the requested slice.
///
/// # Errors
///
/// Returns an error if nothing matches the filters. Per-item failures are
/// reported in the summary instead.
pub async fn run_collect(
    harvest: Arc<Harvest>,
    request: CollectRequest,
    cancel: Arc<AtomicBool>,
) -> Result<BatchSummary> {
    let started = Instant::now();
    let keys: Vec<ItemKey> = harvest
        .catalog
        .select(&request.filters)
        .iter()
        .map(TierContext::key)
        .collect();
    ensure!(
        !keys.is_empty(),
        "no catalog entries match {:?}",
        request.filters
    );
    let factory: Arc<dyn SourceFactory> = match request.source {
        SourceKind::Recorded => Arc::new(RecordedSources::new(request.captures.clone())),
        SourceKind::Synthetic => Arc::new(SyntheticSources::new(
            harvest.config.game_version.clone(),
        )),
    };
    let total = keys.len();
    log::info!(
        "collecting {total} item tiers over seeds {:?} with {} workers",
        request.partition.range(),
        harvest.config.workers
    );

    let tracker = Arc::new(BatchTracker::default());
    let semaphore = Arc::new(Semaphore::new(harvest.config.workers));
    let mut workers = JoinSet::new();
    for (idx, key) in keys.into_iter().enumerate() {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("worker pool closed")?;
        tracker.update(|c| c.spawned += 1);
        let harvest = Arc::clone(&harvest);
        let factory = Arc::clone(&factory);
        let tracker = Arc::clone(&tracker);
        let cancel = Arc::clone(&cancel);
        let partition = request.partition;
        workers.spawn_blocking(move || {
            let _permit = permit;
            let result = collect_item(&harvest, factory.as_ref(), &key, partition, &cancel);
            tracker.update(|c| c.finished += 1);
            let outcome = result.unwrap_or_else(|err| {
                log::error!("{key}: {err:#}");
                ItemOutcome::Failed {
                    item: key.to_string(),
                    error: format!("{err:#}"),
                }
            });
            (idx, outcome)
        });
    }

    let mut outcomes = Vec::with_capacity(total);
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(indexed) => outcomes.push(indexed),
            Err(err) => {
                log::error!("worker aborted: {err}");
                outcomes.push((
                    usize::MAX,
                    ItemOutcome::Failed {
                        item: "<worker>".to_string(),
                        error: err.to_string(),
                    },
                ));
            }
        }
    }
    outcomes.sort_by_key(|(idx, _)| *idx);

    let counters = tracker.snapshot();
    if !counters.is_complete(total) {
        log::warn!("batch ended with {counters:?} of {total} workers");
    }
    let elapsed = started.elapsed();
    log::info!("batch finished in {}", format_elapsed(elapsed));
    Ok(BatchSummary {
        outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
        counters,
        elapsed,
    })
}

fn collect_item(
    harvest: &Harvest,
    factory: &dyn SourceFactory,
    key: &ItemKey,
    partition: SeedPartition,
    cancel: &AtomicBool,
) -> Result<ItemOutcome> {
    let item = key.to_string();
    if cancel.load(Ordering::SeqCst) {
        log::info!("{key}: skipped after cancellation");
        return Ok(ItemOutcome::Cancelled { item });
    }
    let tier = harvest
        .catalog
        .tier(key)
        .with_context(|| format!("{key} is not in the catalog"))?;
    let store = &harvest.store;
    let started = Instant::now();

    let checkpoint = store.load_checkpoint(key)?;
    let seeds = resume_range(&partition, key, checkpoint.as_ref())?;
    log::info!("{key}: starting at seed {} of {:?}", seeds.start, partition.range());
    let mut out_of_range = Vec::new();
    if !seeds.is_empty() {
        store.discard_partial_range(key, seeds.start..partition.range().end)?;
        let mut source = factory.open(&tier)?;
        let walker = SeedWalker::new(StatTable::embedded(), harvest.config.walk_options());
        let mut writer = store.partial_writer(key, seeds.start)?;
        match walker.walk(&tier, seeds.clone(), source.as_mut(), &mut writer) {
            Ok(summary) => {
                writer.commit(seeds.end)?;
                out_of_range = summary.out_of_range;
            }
            Err(WalkError::ItemUnavailable(_)) => {
                drop(writer);
                store.clear_progress(key)?;
                store.set_unavailable(key, true)?;
                log::warn!(
                    "{key}: not available in game version {}",
                    harvest.config.game_version
                );
                return Ok(ItemOutcome::Unavailable { item });
            }
            Err(err) => {
                if let Some(seed) = err.seed() {
                    writer.commit(seed)?;
                }
                return Err(err.into());
            }
        }
    }
    store.set_unavailable(key, false)?;

    if !partition.is_final() {
        log::info!("{key}: slice done in {}", format_elapsed(started.elapsed()));
        return Ok(ItemOutcome::Partial {
            item,
            next_seed: partition.range().end,
        });
    }

    let mut rows = store.load_partial_rows(key)?;
    rows.sort_by_key(|row| row.seed);
    rows.dedup_by_key(|row| row.seed);
    let missing = missing_seeds(&rows, harvest.config.total_seeds);
    if missing > 0 {
        log::warn!("{key}: {missing} seeds still missing; run the earlier iterations first");
        return Ok(ItemOutcome::Incomplete { item, missing });
    }

    let (rows, max_stats_possible) = finalize_table(harvest, &tier, rows)?;
    store.clear_progress(key)?;
    log::info!(
        "{key}: finished {rows} seeds in {}",
        format_elapsed(started.elapsed())
    );
    Ok(ItemOutcome::Finalized {
        item,
        rows,
        max_stats_possible,
        out_of_range,
    })
}

fn missing_seeds(rows: &[SampleRow], total_seeds: u32) -> usize {
    let present = rows.iter().filter(|row| row.seed < total_seeds).count();
    usize::try_from(total_seeds)
        .unwrap_or(usize::MAX)
        .saturating_sub(present)
}

/// Carry names forward from the previous table, score, and write both formats.
///
/// # Errors
///
/// Returns an error if the previous table cannot be read or the new one
/// cannot be written.
pub fn finalize_table(
    harvest: &Harvest,
    tier: &TierContext<'_>,
    mut rows: Vec<SampleRow>,
) -> Result<(usize, usize)> {
    let key = tier.key();
    let family = tier.family();
    if let Some(previous) = harvest.store.read_existing(family, &key)? {
        let filled = carry_forward(&mut rows, &previous.rows);
        log::debug!("{key}: carried {filled} names forward");
    }
    let digits = harvest.config.rounding.for_family(family);
    let score = score_table(&mut rows, tier.spec, family, digits);
    log::debug!(
        "{key}: scored with {} (max stats {})",
        score.strategy,
        score.max_stats_possible
    );
    let layout = TableLayout::for_rows(&rows, &tier.spec.stats);
    harvest.store.write_table(family, &key, &layout, &rows)?;
    Ok((rows.len(), score.max_stats_possible))
}
