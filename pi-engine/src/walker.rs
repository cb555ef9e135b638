//! Seed walker: drives an [`ItemSampleSource`] across a seed range.
//!
//! The source is shared mutable memory that may be read mid-write, so each
//! seed is polled until a consistent snapshot is seen or the retry budget
//! runs out. Accepted snapshots are converted into [`SampleRow`]s and handed
//! to a [`WalkObserver`] in seed order.

use smallvec::SmallVec;
use std::ops::Range;
use std::time::Duration;
use thiserror::Error;

use crate::catalog::{ItemKey, StatSpec, TierContext};
use crate::extract::{ExtractionRule, extract, is_no_stats_sentinel, tagged_stat_names};
use crate::language::Language;
use crate::row::SampleRow;
use crate::scoring::RangeTracker;
use crate::stats::{StatId, StatTable};

/// One raw read of the source's name, description and stat strings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawSample {
    pub name: String,
    pub description: String,
    pub stat_strings: SmallVec<[String; 6]>,
}

impl RawSample {
    fn fields_present(&self) -> bool {
        !self.name.is_empty() && !self.description.is_empty()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("item is not available in the connected game version")]
    Unavailable,
    #[error("source failed: {0}")]
    Failed(String),
}

/// Exclusive handle on whatever produces item snapshots.
pub trait ItemSampleSource {
    /// Number of stat capture slots this binding provides.
    fn stat_slots(&self) -> usize;

    /// Read the current snapshot of `key` at `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] when the item does not exist in
    /// the connected game version.
    fn read_current(&mut self, key: &ItemKey, seed: u32) -> Result<RawSample, SourceError>;

    /// Move the source to `next_seed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be repositioned.
    fn advance(&mut self, next_seed: u32) -> Result<(), SourceError>;

    /// Clear the captured fields so a stale snapshot is never read twice.
    ///
    /// # Errors
    ///
    /// Returns an error if the fields cannot be cleared.
    fn reset_fields(&mut self) -> Result<(), SourceError>;
}

/// Bounded busy-poll settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 200,
            poll_interval: Duration::from_millis(5),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalkError {
    #[error("{0} is not available in the connected game version")]
    ItemUnavailable(ItemKey),
    #[error("{item}: source provides {provided} stat slots but the tier needs {expected}")]
    ConfigurationMismatch {
        item: ItemKey,
        provided: usize,
        expected: usize,
    },
    #[error("{item}: seed {seed} did not load after {attempts} attempts")]
    Timeout {
        item: ItemKey,
        seed: u32,
        attempts: u32,
    },
    #[error("{item}: seed {seed} is malformed: {reason}")]
    MalformedSample {
        item: ItemKey,
        seed: u32,
        reason: String,
    },
    #[error("{item}: {error}")]
    Source { item: ItemKey, error: SourceError },
    #[error("{item}: seed {seed} could not be stored: {reason}")]
    Sink {
        item: ItemKey,
        seed: u32,
        reason: String,
    },
}

impl WalkError {
    /// Seed the walk stopped at, when it got that far.
    #[must_use]
    pub const fn seed(&self) -> Option<u32> {
        match self {
            Self::Timeout { seed, .. }
            | Self::MalformedSample { seed, .. }
            | Self::Sink { seed, .. } => Some(*seed),
            Self::ItemUnavailable(_) | Self::ConfigurationMismatch { .. } | Self::Source { .. } => {
                None
            }
        }
    }
}

/// Receives accepted rows in seed order.
pub trait WalkObserver {
    /// # Errors
    ///
    /// A returned message aborts the walk as [`WalkError::Sink`].
    fn on_row(&mut self, row: SampleRow) -> Result<(), String>;

    fn on_progress(&mut self, _walked: u32, _total: u32) {}
}

impl WalkObserver for Vec<SampleRow> {
    fn on_row(&mut self, row: SampleRow) -> Result<(), String> {
        self.push(row);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    pub retry: RetryPolicy,
    /// Language the source reports names in.
    pub language: Language,
    /// Report progress every this many seeds; 0 disables it.
    pub progress_step: u32,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            language: Language::En,
            progress_step: 10_000,
        }
    }
}

/// Result of a completed walk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WalkSummary {
    pub rows: u32,
    pub out_of_range: Vec<StatId>,
}

enum Snapshot {
    Accepted(SampleRow),
    /// Fields never filled in.
    Missing,
    /// Fields present but not yet valid.
    Invalid(String),
}

pub struct SeedWalker<'a> {
    table: &'a StatTable,
    options: WalkOptions,
}

impl<'a> SeedWalker<'a> {
    #[must_use]
    pub const fn new(table: &'a StatTable, options: WalkOptions) -> Self {
        Self { table, options }
    }

    /// Walk `seeds` and hand every accepted row to `observer`.
    ///
    /// # Errors
    ///
    /// Fails before any seed on a slot count mismatch, and aborts the item on
    /// unavailability, source failure or an exhausted retry budget.
    pub fn walk<S, O>(
        &self,
        tier: &TierContext<'_>,
        seeds: Range<u32>,
        source: &mut S,
        observer: &mut O,
    ) -> Result<WalkSummary, WalkError>
    where
        S: ItemSampleSource + ?Sized,
        O: WalkObserver + ?Sized,
    {
        let key = tier.key();
        let expected = tier.slot_count();
        let provided = source.stat_slots();
        if provided != expected {
            return Err(WalkError::ConfigurationMismatch {
                item: key,
                provided,
                expected,
            });
        }

        let source_error = |error| source_failure(&key, error);

        let total = seeds.end.saturating_sub(seeds.start);
        let mut tracker = RangeTracker::new(key.to_string(), &tier.spec.stats);
        let mut walked = 0_u32;
        if !seeds.is_empty() {
            source.advance(seeds.start).map_err(source_error)?;
        }
        for seed in seeds.clone() {
            let row = self.poll_seed(tier, &key, seed, source)?;
            tracker.observe(&row);
            observer.on_row(row).map_err(|reason| WalkError::Sink {
                item: key.clone(),
                seed,
                reason,
            })?;
            walked += 1;

            source.reset_fields().map_err(source_error)?;
            if seed + 1 < seeds.end {
                source.advance(seed + 1).map_err(source_error)?;
            }
            if self.options.progress_step > 0 && walked % self.options.progress_step == 0 {
                log::info!("{key}: {walked}/{total} seeds");
                observer.on_progress(walked, total);
            }
        }

        Ok(WalkSummary {
            rows: walked,
            out_of_range: tracker.out_of_range(),
        })
    }

    /// Walk `seeds` and return the rows.
    ///
    /// # Errors
    ///
    /// See [`SeedWalker::walk`].
    pub fn collect<S>(
        &self,
        tier: &TierContext<'_>,
        seeds: Range<u32>,
        source: &mut S,
    ) -> Result<Vec<SampleRow>, WalkError>
    where
        S: ItemSampleSource + ?Sized,
    {
        let mut rows = Vec::with_capacity(seeds.len());
        self.walk(tier, seeds, source, &mut rows)?;
        Ok(rows)
    }

    fn poll_seed<S>(
        &self,
        tier: &TierContext<'_>,
        key: &ItemKey,
        seed: u32,
        source: &mut S,
    ) -> Result<SampleRow, WalkError>
    where
        S: ItemSampleSource + ?Sized,
    {
        let attempts = self.options.retry.max_attempts.max(1);
        let mut last = Snapshot::Missing;
        for attempt in 0..attempts {
            if attempt > 0 && !self.options.retry.poll_interval.is_zero() {
                std::thread::sleep(self.options.retry.poll_interval);
            }
            let raw = source
                .read_current(key, seed)
                .map_err(|error| source_failure(key, error))?;
            last = self.interpret(tier, seed, &raw);
            if let Snapshot::Accepted(row) = last {
                return Ok(row);
            }
        }
        Err(match last {
            Snapshot::Invalid(reason) => WalkError::MalformedSample {
                item: key.clone(),
                seed,
                reason,
            },
            Snapshot::Missing | Snapshot::Accepted(_) => WalkError::Timeout {
                item: key.clone(),
                seed,
                attempts,
            },
        })
    }

    fn interpret(&self, tier: &TierContext<'_>, seed: u32, raw: &RawSample) -> Snapshot {
        if !raw.fields_present() {
            return Snapshot::Missing;
        }
        let mut row = SampleRow::new(seed).with_name(self.options.language, raw.name.clone());
        let parsed = if tier.family().is_product() {
            self.product_stats(raw)
        } else {
            self.technology_stats(tier, raw)
        };
        match parsed {
            Ok(stats) => {
                row.stats.extend(stats);
                Snapshot::Accepted(row)
            }
            Err(reason) => Snapshot::Invalid(reason),
        }
    }

    fn value(&self, stat: StatId, raw: &str) -> Result<f64, String> {
        let rule = self
            .table
            .rule(stat)
            .ok_or_else(|| format!("{stat} has no extraction rule"))?;
        if !rule.validate(raw) {
            return Err(format!("{stat} value {raw:?} does not match {rule}"));
        }
        let value = extract(raw, rule).as_f64();
        Ok(if rule == ExtractionRule::RawBonus {
            self.table.transform_raw(stat, value)
        } else {
            value
        })
    }

    fn technology_stats(
        &self,
        tier: &TierContext<'_>,
        raw: &RawSample,
    ) -> Result<Vec<(StatId, f64)>, String> {
        if is_no_stats_sentinel(&raw.description) {
            return Ok(Vec::new());
        }
        let specs: Vec<&StatSpec> = tagged_stat_names(&raw.description)
            .into_iter()
            .map(|name| {
                tier.spec
                    .spec_by_display_name(self.table, name)
                    .ok_or_else(|| format!("description names unknown stat {name:?}"))
            })
            .collect::<Result<_, _>>()?;
        if specs.len() > raw.stat_strings.len() {
            return Err(format!(
                "{} stats tagged but {} captured",
                specs.len(),
                raw.stat_strings.len()
            ));
        }
        specs
            .iter()
            .zip(&raw.stat_strings)
            .map(|(spec, text)| self.value(spec.stat, text).map(|value| (spec.stat, value)))
            .collect()
    }

    fn product_stats(&self, raw: &RawSample) -> Result<Vec<(StatId, f64)>, String> {
        let age = self.value(StatId::Age, &raw.description)?;
        let text = raw
            .stat_strings
            .first()
            .ok_or_else(|| "no value captured".to_string())?;
        let value = self.value(StatId::Value, text)?;
        Ok(vec![(StatId::Age, age), (StatId::Value, value)])
    }
}

fn source_failure(key: &ItemKey, error: SourceError) -> WalkError {
    match error {
        SourceError::Unavailable => WalkError::ItemUnavailable(key.clone()),
        other => WalkError::Source {
            item: key.clone(),
            error: other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Tier};
    use smallvec::smallvec;
    use std::collections::VecDeque;

    /// Serves queued snapshots per seed, then repeats the last one.
    struct Scripted {
        slots: usize,
        seed: u32,
        queue: VecDeque<RawSample>,
        resets: u32,
    }

    impl ItemSampleSource for Scripted {
        fn stat_slots(&self) -> usize {
            self.slots
        }

        fn read_current(&mut self, _key: &ItemKey, seed: u32) -> Result<RawSample, SourceError> {
            assert_eq!(seed, self.seed);
            Ok(if self.queue.len() > 1 {
                self.queue.pop_front().unwrap_or_default()
            } else {
                self.queue.front().cloned().unwrap_or_default()
            })
        }

        fn advance(&mut self, next_seed: u32) -> Result<(), SourceError> {
            self.seed = next_seed;
            Ok(())
        }

        fn reset_fields(&mut self) -> Result<(), SourceError> {
            self.resets += 1;
            Ok(())
        }
    }

    fn fast() -> WalkOptions {
        WalkOptions {
            retry: RetryPolicy {
                max_attempts: 3,
                poll_interval: Duration::ZERO,
            },
            ..WalkOptions::default()
        }
    }

    fn shield(description: &str, value: &str) -> RawSample {
        RawSample {
            name: "Shield Module".to_string(),
            description: description.to_string(),
            stat_strings: smallvec![value.to_string(), String::new()],
        }
    }

    #[test]
    fn retries_until_snapshot_is_consistent() {
        let catalog = Catalog::embedded();
        let tier = catalog
            .tier(&ItemKey::new("UP_SHLD", Tier::One))
            .unwrap();
        let mut source = Scripted {
            slots: 2,
            seed: 0,
            queue: VecDeque::from(vec![
                RawSample::default(),
                shield("to <STELLAR>Shield Strength<>.", "+9"),
                shield("to <STELLAR>Shield Strength<>.", "+93%"),
            ]),
            resets: 0,
        };
        let walker = SeedWalker::new(StatTable::embedded(), fast());
        let rows = walker.collect(&tier, 0..1, &mut source).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stat(StatId::SuitArmourShieldStrength), Some(93.0));
        assert_eq!(rows[0].name(Language::En), Some("Shield Module"));
        assert_eq!(source.resets, 1);
    }

    #[test]
    fn exhausted_retries_distinguish_timeout_from_malformed() {
        let catalog = Catalog::embedded();
        let tier = catalog
            .tier(&ItemKey::new("UP_SHLD", Tier::One))
            .unwrap();
        let walker = SeedWalker::new(StatTable::embedded(), fast());

        let mut empty = Scripted {
            slots: 2,
            seed: 0,
            queue: VecDeque::from(vec![RawSample::default()]),
            resets: 0,
        };
        assert!(matches!(
            walker.collect(&tier, 5..6, &mut empty),
            Err(WalkError::Timeout {
                seed: 5,
                attempts: 3,
                ..
            })
        ));

        let mut garbled = Scripted {
            slots: 2,
            seed: 0,
            queue: VecDeque::from(vec![shield("to <STELLAR>Shield Strength<>.", "93")]),
            resets: 0,
        };
        let err = walker.collect(&tier, 0..1, &mut garbled).unwrap_err();
        assert!(matches!(err, WalkError::MalformedSample { seed: 0, .. }), "{err}");
    }

    #[test]
    fn slot_mismatch_fails_before_reading() {
        let catalog = Catalog::embedded();
        let tier = catalog
            .tier(&ItemKey::new("UP_JET", Tier::X))
            .unwrap();
        let mut source = Scripted {
            slots: 3,
            seed: 99,
            queue: VecDeque::new(),
            resets: 0,
        };
        let walker = SeedWalker::new(StatTable::embedded(), fast());
        assert_eq!(
            walker.collect(&tier, 0..10, &mut source),
            Err(WalkError::ConfigurationMismatch {
                item: ItemKey::new("UP_JET", Tier::X),
                provided: 3,
                expected: 4,
            })
        );
        assert_eq!(source.seed, 99);
    }

    #[test]
    fn sentinel_description_yields_statless_row() {
        let catalog = Catalog::embedded();
        let tier = catalog
            .tier(&ItemKey::new("UP_SHLD", Tier::One))
            .unwrap();
        let mut source = Scripted {
            slots: 2,
            seed: 0,
            queue: VecDeque::from(vec![shield("UPGRADE_0_DESC", "")]),
            resets: 0,
        };
        let walker = SeedWalker::new(StatTable::embedded(), fast());
        let rows = walker.collect(&tier, 0..2, &mut source).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.stats.is_empty()));
    }

    #[test]
    fn stat_without_metadata_is_malformed() {
        let catalog = Catalog::embedded();
        let tier = catalog
            .tier(&ItemKey::new("PROC_LOOT", Tier::Untiered))
            .unwrap();
        let table = StatTable::from_json(
            r#"{"Value": {"display_name": "Value", "rule": "leading_integer"}}"#,
        )
        .unwrap();
        let mut source = Scripted {
            slots: 1,
            seed: 0,
            queue: VecDeque::from(vec![RawSample {
                name: "Ancient Relic".to_string(),
                description: "Dating back 1320 years".to_string(),
                stat_strings: smallvec!["2299932".to_string()],
            }]),
            resets: 0,
        };
        let walker = SeedWalker::new(&table, fast());
        let err = walker.collect(&tier, 0..1, &mut source).unwrap_err();
        match err {
            WalkError::MalformedSample { seed, reason, .. } => {
                assert_eq!(seed, 0);
                assert!(reason.contains("no extraction rule"), "{reason}");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn unavailable_read_maps_to_item_unavailable() {
        struct Gone;

        impl ItemSampleSource for Gone {
            fn stat_slots(&self) -> usize {
                2
            }

            fn read_current(
                &mut self,
                _key: &ItemKey,
                _seed: u32,
            ) -> Result<RawSample, SourceError> {
                Err(SourceError::Unavailable)
            }

            fn advance(&mut self, _next_seed: u32) -> Result<(), SourceError> {
                Ok(())
            }

            fn reset_fields(&mut self) -> Result<(), SourceError> {
                Ok(())
            }
        }

        let catalog = Catalog::embedded();
        let key = ItemKey::new("UP_SHLD", Tier::One);
        let tier = catalog.tier(&key).unwrap();
        let walker = SeedWalker::new(StatTable::embedded(), fast());
        assert_eq!(
            walker.collect(&tier, 0..3, &mut Gone),
            Err(WalkError::ItemUnavailable(key))
        );
    }
}
