pub mod batcher;
pub mod dataset;
pub mod store;

#[cfg(test)]
pub(crate) mod fixtures;

pub use batcher::{BatchLoader, SequenceBatch};
pub use dataset::BassetDataset;

use crate::error::DataError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of nucleotide channels in a one-hot sequence (A, C, G, T)
pub const NUM_NUCLEOTIDES: usize = 4;

/// Number of positions in every sequence window
pub const SEQUENCE_LENGTH: usize = 600;

/// Number of cell types with an accessibility label
pub const NUM_CELL_TYPES: usize = 164;

/// Metadata key holding the JSON list of cell type names
pub const TARGET_LABELS_KEY: &str = "target_labels";

/// Metadata key holding the JSON list of test sequence identifiers
pub const TEST_HEADERS_KEY: &str = "test_headers";

/// Dataset partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Valid, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        }
    }

    /// Name of the array holding this split's sequences
    pub fn input_key(&self) -> String {
        format!("{}_in", self.as_str())
    }

    /// Name of the array holding this split's labels
    pub fn target_key(&self) -> String {
        format!("{}_out", self.as_str())
    }
}

impl FromStr for Split {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Split::Train),
            "valid" => Ok(Split::Valid),
            "test" => Ok(Split::Test),
            other => Err(DataError::InvalidSplit(other.to_string())),
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed shape of the records in a dataset file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetShape {
    /// Positions per sequence
    pub sequence_length: usize,
    /// Labels per sequence
    pub num_targets: usize,
}

impl Default for DatasetShape {
    fn default() -> Self {
        Self {
            sequence_length: SEQUENCE_LENGTH,
            num_targets: NUM_CELL_TYPES,
        }
    }
}

/// One sequence window and its labels
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceRecord {
    /// One-hot sequence in compute layout `[1, length, 4]`, row-major
    pub sequence: Vec<f32>,
    /// Binary accessibility label per cell type
    pub target: Vec<u8>,
}

impl SequenceRecord {
    /// Shape of `sequence`
    pub fn sequence_shape(&self) -> [usize; 3] {
        [1, self.sequence.len() / NUM_NUCLEOTIDES, NUM_NUCLEOTIDES]
    }

    /// Nucleotide index (0..4) at `position`, if the position is one-hot
    pub fn nucleotide_at(&self, position: usize) -> Option<usize> {
        let row = self
            .sequence
            .get(position * NUM_NUCLEOTIDES..(position + 1) * NUM_NUCLEOTIDES)?;
        let mut hot = row.iter().enumerate().filter(|(_, &v)| v == 1.0);
        match (hot.next(), hot.next()) {
            (Some((index, _)), None) => Some(index),
            _ => None,
        }
    }
}
