//! Pi Engine
//!
//! Core logic for sweeping procedural item seeds: value extraction, the item
//! catalog, perfection scoring, desirability overrides, compendium ranking and
//! the seed walker. No filesystem or async dependencies; concrete sample
//! sources and table I/O live in the harvester binary.

pub mod catalog;
pub mod desirability;
pub mod extract;
pub mod language;
pub mod numbers;
pub mod partition;
pub mod ranking;
pub mod row;
pub mod scoring;
pub mod stats;
pub mod walker;

// Re-export commonly used types
pub use catalog::{
    Catalog, CatalogError, Inventory, ItemDefinition, ItemFamily, ItemKey, PRODUCT_PREFIX,
    StatRange, StatSpec, Tier, TierContext, TierSpec,
};
pub use desirability::{
    CandidateContext, DesirabilityOverride, OverrideRegistry, OverrideRule, OverrideSpec,
    RejectStats, TwoSided,
};
pub use extract::{ExtractedValue, ExtractionRule, Operator, TransformStep, extract};
pub use language::Language;
pub use partition::{
    Checkpoint, CheckpointError, PartitionError, SeedPartition, TOTAL_SEEDS, resume_range,
};
pub use ranking::{
    BestPerStat, HIGH_NUMBER_MULTIPLIER, TierSelection, best_per_stat, select_candidates,
    select_product_candidates,
};
pub use row::{SampleRow, TableError, TableLayout, carry_forward, ensure_unique_seeds};
pub use scoring::{
    ConfiguredRangeWeighted, EmpiricalRangeUnweighted, RangeTracker, RoundingDigits,
    ScoringStrategy, TableScore, Weights, compute_weights, max_stats_possible, score_row,
    score_table, stat_score, strategy_for,
};
pub use stats::{StatId, StatMeta, StatParseError, StatTable};
pub use walker::{
    ItemSampleSource, RawSample, RetryPolicy, SeedWalker, SourceError, WalkError, WalkObserver,
    WalkOptions, WalkSummary,
};
