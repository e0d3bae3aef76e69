//! Choice between direct batched processing and chunked dispatch.

use serde::{Deserialize, Serialize};

use crate::config::ImportSettings;

/// Which import job flavour handles the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportVariant {
    /// Always direct, large batches.
    Standard,
    /// Chunked above the size threshold, small direct batches below it.
    #[default]
    Optimized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct { batch_size: usize },
    Chunked { chunk_size: usize },
}

pub fn select_strategy(file_size: u64, settings: &ImportSettings, variant: ImportVariant) -> Strategy {
    match variant {
        ImportVariant::Standard => Strategy::Direct {
            batch_size: settings.standard_batch_size.max(1),
        },
        ImportVariant::Optimized if file_size > settings.chunk_threshold_bytes => {
            Strategy::Chunked {
                chunk_size: settings.chunk_size.max(1),
            }
        }
        ImportVariant::Optimized => Strategy::Direct {
            batch_size: settings.optimized_batch_size.max(1),
        },
    }
}
