use crate::data::store::{decode_labels, widen_f16, ArrayInfo, ArrayStore, Encoding};
use crate::data::{
    DatasetShape, SequenceRecord, Split, NUM_NUCLEOTIDES, TARGET_LABELS_KEY, TEST_HEADERS_KEY,
};
use crate::error::DataError;
use burn::data::dataset::Dataset;
use std::path::Path;
use tracing::{info, warn};

/// One split of a Basset dataset file
///
/// Sequences are stored as packed half floats in nucleotide-major layout,
/// `(N, 4, 1, L)` or equivalently `(N, 4, L, 1)`. Each record is widened to
/// `f32` and transposed to `[1, L, 4]` when it is read.
pub struct BassetDataset {
    split: Split,
    store: ArrayStore,
    inputs: ArrayInfo,
    targets: ArrayInfo,
    shape: DatasetShape,
    target_labels: Vec<String>,
    ids: Option<Vec<String>>,
}

impl BassetDataset {
    /// Open `split` of the dataset at `path` with the standard Basset shape
    pub fn open<P: AsRef<Path>>(path: P, split: Split) -> Result<Self, DataError> {
        Self::with_shape(path, split, DatasetShape::default())
    }

    /// Open a split given by name; anything but `train`, `valid` or `test`
    /// is rejected before the file is touched
    pub fn open_named<P: AsRef<Path>>(path: P, split: &str) -> Result<Self, DataError> {
        let split: Split = split.parse()?;
        Self::open(path, split)
    }

    /// Open `split`, checking the stored arrays against `shape`
    pub fn with_shape<P: AsRef<Path>>(
        path: P,
        split: Split,
        shape: DatasetShape,
    ) -> Result<Self, DataError> {
        let store = ArrayStore::open(path)?;

        let inputs = store.array(&split.input_key())?;
        check_input_shape(&inputs, shape.sequence_length)?;
        if inputs.encoding != Encoding::F16 {
            return Err(DataError::UnsupportedDtype {
                name: inputs.name.clone(),
                dtype: format!("{:?}", inputs.encoding),
            });
        }

        let targets = store.array(&split.target_key())?;
        if targets.shape.len() != 2 || targets.shape[1] != shape.num_targets {
            return Err(DataError::ShapeMismatch {
                name: targets.name.clone(),
                actual: targets.shape.clone(),
                expected: format!("(N, {})", shape.num_targets),
            });
        }
        if inputs.rows() != targets.rows() {
            return Err(DataError::RowCountMismatch {
                inputs: inputs.rows(),
                targets: targets.rows(),
            });
        }

        let target_labels = match store.string_list(TARGET_LABELS_KEY)? {
            Some(labels) if labels.len() == shape.num_targets => labels,
            Some(labels) => {
                return Err(DataError::Metadata {
                    key: TARGET_LABELS_KEY.to_string(),
                    reason: format!("{} names for {} targets", labels.len(), shape.num_targets),
                })
            }
            None => {
                warn!("No target labels in {:?}, using positional names", store.path());
                (0..shape.num_targets).map(|i| format!("target_{i}")).collect()
            }
        };

        let ids = match split {
            Split::Test => store.string_list(TEST_HEADERS_KEY)?,
            _ => None,
        };
        if let Some(ref ids) = ids {
            if ids.len() != inputs.rows() {
                return Err(DataError::Metadata {
                    key: TEST_HEADERS_KEY.to_string(),
                    reason: format!("{} headers for {} sequences", ids.len(), inputs.rows()),
                });
            }
        }

        info!(
            "Opened {} split of {:?}: {} sequences of length {}",
            split,
            store.path(),
            inputs.rows(),
            shape.sequence_length
        );

        Ok(Self {
            split,
            store,
            inputs,
            targets,
            shape,
            target_labels,
            ids,
        })
    }

    pub fn split(&self) -> Split {
        self.split
    }

    /// Number of sequences in this split
    pub fn len(&self) -> usize {
        self.inputs.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Positions per sequence; fixed by the dataset shape, not inferred per record
    pub fn sequence_length(&self) -> usize {
        self.shape.sequence_length
    }

    pub fn num_targets(&self) -> usize {
        self.shape.num_targets
    }

    /// Cell type names, one per target column
    pub fn target_labels(&self) -> &[String] {
        &self.target_labels
    }

    /// Sequence identifiers (test split only)
    pub fn ids(&self) -> Option<&[String]> {
        self.ids.as_deref()
    }

    /// Read record `index`, widened and transposed to compute layout
    pub fn record(&self, index: usize) -> Result<SequenceRecord, DataError> {
        if index >= self.len() {
            return Err(DataError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }

        let length = self.shape.sequence_length;
        let mut stored = Vec::with_capacity(NUM_NUCLEOTIDES * length);
        widen_f16(self.store.row_bytes(&self.inputs, index)?, &mut stored);

        // [4, L] -> [L, 4]
        let mut sequence = vec![0.0f32; NUM_NUCLEOTIDES * length];
        for (channel, row) in stored.chunks_exact(length).enumerate() {
            for (position, &value) in row.iter().enumerate() {
                sequence[position * NUM_NUCLEOTIDES + channel] = value;
            }
        }

        let target = decode_labels(
            self.store.row_bytes(&self.targets, index)?,
            self.targets.encoding,
        );

        Ok(SequenceRecord { sequence, target })
    }
}

impl Dataset<SequenceRecord> for BassetDataset {
    fn get(&self, index: usize) -> Option<SequenceRecord> {
        self.record(index).ok()
    }

    fn len(&self) -> usize {
        self.inputs.rows()
    }
}

fn check_input_shape(inputs: &ArrayInfo, length: usize) -> Result<(), DataError> {
    let valid = matches!(
        inputs.shape.as_slice(),
        [_, NUM_NUCLEOTIDES, 1, l] | [_, NUM_NUCLEOTIDES, l, 1] if *l == length
    );
    if valid {
        Ok(())
    } else {
        Err(DataError::ShapeMismatch {
            name: inputs.name.clone(),
            actual: inputs.shape.clone(),
            expected: format!("(N, {NUM_NUCLEOTIDES}, 1, {length})"),
        })
    }
}
