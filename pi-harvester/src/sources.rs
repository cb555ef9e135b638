//! Concrete sample sources handed to seed walkers.
//!
//! `RecordedSource` replays JSON-lines captures taken from a live session.
//! `SyntheticSource` rolls deterministic values per `(item, seed)` and mimics
//! a source that is read while still being written.

use anyhow::{Context, Result};
use pi_engine::{
    ExtractionRule, ItemDefinition, ItemKey, ItemSampleSource, RawSample, SourceError, StatId,
    StatRange, StatTable, TierContext,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::Hasher;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use twox_hash::XxHash64;

use crate::common::compare_versions;

/// One captured seed as stored in `captures/<ITEM>.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub seed: u32,
    pub name: String,
    pub description: String,
    /// Every capture slot, empty strings included.
    #[serde(default)]
    pub stats: Vec<String>,
}

impl CaptureRecord {
    fn sample(&self) -> RawSample {
        RawSample {
            name: self.name.clone(),
            description: self.description.clone(),
            stat_strings: self.stats.iter().cloned().collect(),
        }
    }
}

/// Which source backs a collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceKind {
    /// Replay JSON-lines captures
    Recorded,
    /// Deterministic generated rolls
    Synthetic,
}

pub type BoxedSource = Box<dyn ItemSampleSource + Send>;

/// Hands every worker its own exclusive source.
pub trait SourceFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the backing data exists but cannot be opened.
    fn open(&self, tier: &TierContext<'_>) -> Result<BoxedSource>;
}

pub struct RecordedSources {
    dir: PathBuf,
}

impl RecordedSources {
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl SourceFactory for RecordedSources {
    fn open(&self, tier: &TierContext<'_>) -> Result<BoxedSource> {
        let path = self.dir.join(format!("{}.jsonl", tier.key()));
        Ok(Box::new(RecordedSource::open(&path, tier.slot_count())?))
    }
}

/// Synthetic sources report items newer than `game_version` as unavailable.
pub struct SyntheticSources {
    game_version: String,
}

impl SyntheticSources {
    #[must_use]
    pub const fn new(game_version: String) -> Self {
        Self { game_version }
    }
}

impl SourceFactory for SyntheticSources {
    fn open(&self, tier: &TierContext<'_>) -> Result<BoxedSource> {
        let available = tier
            .item
            .available_since
            .as_deref()
            .is_none_or(|since| compare_versions(since, &self.game_version) != Ordering::Greater);
        Ok(Box::new(SyntheticSource::new(
            tier,
            StatTable::embedded(),
            available,
        )?))
    }
}

/// Replays a capture file positioned like a live source.
#[derive(Debug)]
pub struct RecordedSource {
    records: Option<BTreeMap<u32, CaptureRecord>>,
    slots: usize,
    current: u32,
    cleared: bool,
}

impl RecordedSource {
    /// Load `path`; a missing file yields a source reporting the item as
    /// unavailable.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: &Path, default_slots: usize) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                records: None,
                slots: default_slots,
                current: 0,
                cleared: false,
            });
        }
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open capture {}", path.display()))?;
        let mut records = BTreeMap::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("failed to read {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: CaptureRecord = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: malformed capture", path.display(), idx + 1))?;
            records.insert(record.seed, record);
        }
        let slots = records
            .values()
            .next()
            .map_or(default_slots, |record| record.stats.len());
        Ok(Self {
            records: Some(records),
            slots,
            current: 0,
            cleared: false,
        })
    }
}

impl ItemSampleSource for RecordedSource {
    fn stat_slots(&self) -> usize {
        self.slots
    }

    fn read_current(&mut self, _key: &ItemKey, _seed: u32) -> Result<RawSample, SourceError> {
        let records = self.records.as_ref().ok_or(SourceError::Unavailable)?;
        if self.cleared {
            return Ok(RawSample::default());
        }
        Ok(records
            .get(&self.current)
            .map(CaptureRecord::sample)
            .unwrap_or_default())
    }

    fn advance(&mut self, next_seed: u32) -> Result<(), SourceError> {
        self.current = next_seed;
        self.cleared = false;
        Ok(())
    }

    fn reset_fields(&mut self) -> Result<(), SourceError> {
        self.cleared = true;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SlotPlan {
    display_name: String,
    rule: ExtractionRule,
    range: StatRange,
    fixed: bool,
}

const NAME_PREFIXES: [&str; 6] = ["Nimble", "Radiant", "Sturdy", "Silent", "Volatile", "Ancient"];

/// Deterministic rolls keyed by item and seed.
#[derive(Debug)]
pub struct SyntheticSource {
    item_key: String,
    title: String,
    product: bool,
    plans: Vec<SlotPlan>,
    slots: usize,
    available: bool,
    current: u32,
    /// Incomplete reads still to serve for the current seed.
    pending_glitches: u32,
    cleared: bool,
}

impl SyntheticSource {
    /// # Errors
    ///
    /// Returns an error if a tier stat has no metadata in `table`.
    pub fn new(tier: &TierContext<'_>, table: &StatTable, available: bool) -> Result<Self> {
        let item_key = tier.key().to_string();
        let product = tier.family().is_product();
        let plans = tier
            .spec
            .stats
            .iter()
            .map(|spec| -> Result<SlotPlan> {
                let rule = table.rule(spec.stat).with_context(|| {
                    format!("{}: {} has no extraction rule", tier.key(), spec.stat)
                })?;
                Ok(SlotPlan {
                    display_name: table.display_name(spec.stat).to_string(),
                    rule,
                    range: spec
                        .range
                        .unwrap_or_else(|| fallback_range(tier.item, spec.stat, rule)),
                    fixed: spec.always_same,
                })
            })
            .collect::<Result<_>>()?;
        let mut source = Self {
            item_key,
            title: tier.item.display_title().to_string(),
            product,
            plans,
            slots: tier.slot_count(),
            available,
            current: 0,
            pending_glitches: 0,
            cleared: false,
        };
        source.pending_glitches = source.glitches_for(0);
        Ok(source)
    }

    fn rng(&self, seed: u32, salt: u64) -> ChaCha8Rng {
        let mut hasher = XxHash64::with_seed(salt);
        hasher.write(self.item_key.as_bytes());
        hasher.write(&seed.to_le_bytes());
        ChaCha8Rng::seed_from_u64(hasher.finish())
    }

    fn glitches_for(&self, seed: u32) -> u32 {
        self.rng(seed, 1).gen_range(0..=2)
    }

    fn roll(&self, seed: u32) -> RawSample {
        let mut rng = self.rng(seed, 0);
        let prefix = NAME_PREFIXES[rng.gen_range(0..NAME_PREFIXES.len())];
        let name = format!("{prefix} {}", self.title);
        let mut stat_strings: SmallVec<[String; 6]> =
            (0..self.slots).map(|_| String::new()).collect();

        if self.product {
            let age = self.plans.iter().find(|plan| plan.rule == ExtractionRule::LeadingInteger);
            let value = self.plans.last();
            let (Some(age), Some(value)) = (age, value) else {
                return RawSample::default();
            };
            let years = roll_value(&mut rng, age);
            if let Some(slot) = stat_strings.first_mut() {
                *slot = format_value(value.rule, roll_value(&mut rng, value));
            }
            return RawSample {
                name,
                description: format!("Dated to roughly {years} years before the present."),
                stat_strings,
            };
        }

        if rng.gen_ratio(1, 50) {
            return RawSample {
                name,
                description: "UPGRADE_0_DESC".to_string(),
                stat_strings,
            };
        }
        let mut order: Vec<&SlotPlan> = self.plans.iter().collect();
        for idx in (1..order.len()).rev() {
            order.swap(idx, rng.gen_range(0..=idx));
        }
        let count = rng.gen_range(1..=self.slots.min(order.len()).max(1));
        let picked: Vec<&SlotPlan> = order.into_iter().take(count).collect();
        let tags: Vec<String> = picked
            .iter()
            .map(|plan| format!("<STELLAR>{}<>", plan.display_name))
            .collect();
        for (slot, plan) in stat_strings.iter_mut().zip(&picked) {
            *slot = format_value(plan.rule, roll_value(&mut rng, plan));
        }
        RawSample {
            name,
            description: format!("Upgrades {} by improving {}.", self.title, tags.join(" and ")),
            stat_strings,
        }
    }
}

impl ItemSampleSource for SyntheticSource {
    fn stat_slots(&self) -> usize {
        self.slots
    }

    fn read_current(&mut self, _key: &ItemKey, _seed: u32) -> Result<RawSample, SourceError> {
        if !self.available {
            return Err(SourceError::Unavailable);
        }
        if self.cleared {
            return Ok(RawSample::default());
        }
        let mut sample = self.roll(self.current);
        match self.pending_glitches {
            0 => {}
            1 => {
                // text loaded, values not yet
                if let Some(slot) = sample.stat_strings.iter_mut().find(|s| !s.is_empty()) {
                    slot.clear();
                }
                self.pending_glitches = 0;
            }
            _ => {
                sample = RawSample::default();
                self.pending_glitches -= 1;
            }
        }
        Ok(sample)
    }

    fn advance(&mut self, next_seed: u32) -> Result<(), SourceError> {
        self.current = next_seed;
        self.cleared = false;
        self.pending_glitches = self.glitches_for(next_seed);
        Ok(())
    }

    fn reset_fields(&mut self) -> Result<(), SourceError> {
        self.cleared = true;
        Ok(())
    }
}

/// Range used for stats scored on the table's own spread.
fn fallback_range(item: &ItemDefinition, stat: StatId, rule: ExtractionRule) -> StatRange {
    match (stat, rule) {
        (StatId::Age, _) => StatRange {
            min: 1.0,
            max: 9_999.0,
        },
        (StatId::Value, _) => {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(item.item_id.as_bytes());
            let spread = u32::try_from(hasher.finish() % 100_000).unwrap_or(0);
            let min = 100_000.0 + f64::from(spread);
            StatRange {
                min,
                max: min * 20.0,
            }
        }
        (_, ExtractionRule::BooleanEnabled) => StatRange { min: 1.0, max: 1.0 },
        (_, ExtractionRule::LightyearDistance) => StatRange {
            min: 100.0,
            max: 100.0,
        },
        _ => StatRange { min: 1.0, max: 1.0 },
    }
}

fn roll_value(rng: &mut ChaCha8Rng, plan: &SlotPlan) -> f64 {
    if plan.fixed || plan.range.width() <= 0.0 {
        return plan.range.min;
    }
    let raw = plan.range.min + rng.gen_range(0.0..=1.0) * plan.range.width();
    let snapped = if plan.rule == ExtractionRule::FloatLiteral {
        (raw * 10.0).round() / 10.0
    } else {
        raw.round()
    };
    snapped.clamp(plan.range.min, plan.range.max)
}

/// Render a value the way the game displays it for `rule`.
#[must_use]
pub fn format_value(rule: ExtractionRule, value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "+" };
    match rule {
        ExtractionRule::Percent => format!("{sign}{}%", value.abs()),
        ExtractionRule::PercentThousands => {
            let thousands = (value / 1000.0).floor();
            let rest = value - thousands * 1000.0;
            format!("+{thousands},{rest:03}%")
        }
        ExtractionRule::FloatLiteral => format!("+{value:.1}"),
        ExtractionRule::LightyearDistance => format!("{value} ly"),
        ExtractionRule::BooleanEnabled => {
            if value > 0.0 { "Enabled" } else { "Disabled" }.to_string()
        }
        ExtractionRule::LeadingInteger | ExtractionRule::RawBonus => format!("{value}"),
    }
}
