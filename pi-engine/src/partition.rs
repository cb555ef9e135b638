//! Seed-space partitioning and resumable checkpoints.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

use crate::catalog::ItemKey;

/// Seeds per item in a full sweep.
pub const TOTAL_SEEDS: u32 = 100_000;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("iteration count must be at least 1")]
    ZeroIterations,
    #[error("iteration {iteration} is outside 0..{total}")]
    IterationOutOfRange { iteration: u32, total: u32 },
    #[error("seed space must not be empty")]
    ZeroSeeds,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("checkpoint belongs to {found}, not {expected}")]
    WrongItem { expected: ItemKey, found: ItemKey },
}

/// One of `total_iterations` consecutive slices of the seed space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPartition {
    pub iteration: u32,
    pub total_iterations: u32,
    pub total_seeds: u32,
}

impl SeedPartition {
    /// # Errors
    ///
    /// Rejects zero iterations, an iteration index past the last slice and an
    /// empty seed space.
    pub const fn new(
        iteration: u32,
        total_iterations: u32,
        total_seeds: u32,
    ) -> Result<Self, PartitionError> {
        if total_iterations == 0 {
            return Err(PartitionError::ZeroIterations);
        }
        if iteration >= total_iterations {
            return Err(PartitionError::IterationOutOfRange {
                iteration,
                total: total_iterations,
            });
        }
        if total_seeds == 0 {
            return Err(PartitionError::ZeroSeeds);
        }
        Ok(Self {
            iteration,
            total_iterations,
            total_seeds,
        })
    }

    #[must_use]
    pub const fn full(total_seeds: u32) -> Self {
        Self {
            iteration: 0,
            total_iterations: 1,
            total_seeds,
        }
    }

    /// Seeds of this slice; the last slice absorbs the remainder.
    #[must_use]
    pub const fn range(&self) -> Range<u32> {
        let count = self.total_seeds / self.total_iterations;
        let start = self.iteration * count;
        let end = if self.is_final() {
            self.total_seeds
        } else {
            start + count
        };
        start..end
    }

    /// Completing the final slice completes the item.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        self.iteration + 1 == self.total_iterations
    }
}

/// Persisted "next seed to process" of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub item: ItemKey,
    pub next_seed: u32,
}

impl Checkpoint {
    #[must_use]
    pub const fn new(item: ItemKey, next_seed: u32) -> Self {
        Self { item, next_seed }
    }
}

/// Remaining seeds of `partition` for `item`, honoring a checkpoint that
/// falls inside the slice. Checkpoints from other slices are ignored.
///
/// # Errors
///
/// Returns an error if the checkpoint was written for another item.
pub fn resume_range(
    partition: &SeedPartition,
    item: &ItemKey,
    checkpoint: Option<&Checkpoint>,
) -> Result<Range<u32>, CheckpointError> {
    let range = partition.range();
    let Some(checkpoint) = checkpoint else {
        return Ok(range);
    };
    if &checkpoint.item != item {
        return Err(CheckpointError::WrongItem {
            expected: item.clone(),
            found: checkpoint.item.clone(),
        });
    }
    if (range.start..=range.end).contains(&checkpoint.next_seed) {
        Ok(checkpoint.next_seed..range.end)
    } else {
        Ok(range)
    }
}
