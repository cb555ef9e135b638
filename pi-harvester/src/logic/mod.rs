pub mod collect;
pub mod compile;
pub mod recompute;
pub mod reports;
pub mod store;

use anyhow::{Context, Result};
use pi_engine::Catalog;

use crate::config::HarvestConfig;
use store::TableStore;

pub use collect::{BatchCounters, BatchSummary, CollectRequest, ItemOutcome, run_collect};
pub use compile::{Compendium, build_compendium};
pub use recompute::{RecomputeSummary, recompute_all};

/// Everything a command needs: settings, item catalog and the output store.
#[derive(Debug)]
pub struct Harvest {
    pub config: HarvestConfig,
    pub catalog: Catalog,
    pub store: TableStore,
}

impl Harvest {
    /// Load the catalog override named by the config, or the embedded one.
    ///
    /// # Errors
    ///
    /// Returns an error if the override catalog cannot be read or validated.
    pub fn open(config: HarvestConfig) -> Result<Self> {
        let catalog = match &config.catalog {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read catalog {}", path.display()))?;
                let catalog = Catalog::from_json(&raw)
                    .with_context(|| format!("invalid catalog {}", path.display()))?;
                log::info!("using catalog {} ({} items)", path.display(), catalog.items.len());
                catalog
            }
            None => Catalog::embedded().clone(),
        };
        let store = TableStore::new(config.output_root.clone(), config.checkpoint_dir());
        Ok(Self {
            config,
            catalog,
            store,
        })
    }
}
