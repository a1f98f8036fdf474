use crate::data::{BassetDataset, NUM_NUCLEOTIDES};
use crate::error::DataError;
use crate::utils::random::seeded_rng;
use burn::prelude::*;
use rand::seq::SliceRandom;

/// A batch of sequences ready for the forward pass
#[derive(Debug, Clone)]
pub struct SequenceBatch<B: Backend> {
    /// One-hot sequences, `[batch, 1, length, 4]`
    pub sequences: Tensor<B, 4>,
    /// Labels, `[batch, targets]`
    pub targets: Tensor<B, 2, Int>,
    /// Host copy of `targets`, row-major, for metric computation
    pub labels: Vec<u8>,
    /// Dataset indices of the rows, in batch order
    pub indices: Vec<usize>,
}

/// Iterates a dataset split in fixed-size batches
pub struct BatchLoader<'a> {
    dataset: &'a BassetDataset,
    batch_size: usize,
    order: Vec<usize>,
}

impl<'a> BatchLoader<'a> {
    /// Sequential loader; the last batch may be smaller than `batch_size`
    pub fn new(dataset: &'a BassetDataset, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            order: (0..dataset.len()).collect(),
        }
    }

    /// Loader visiting the split in a seeded random order
    pub fn shuffled(dataset: &'a BassetDataset, batch_size: usize, seed: u64) -> Self {
        let mut loader = Self::new(dataset, batch_size);
        loader.order.shuffle(&mut seeded_rng(seed));
        loader
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches in one pass
    pub fn num_batches(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }

    pub fn dataset(&self) -> &BassetDataset {
        self.dataset
    }

    /// Iterate the batches, materializing each on `device`
    pub fn iter<B: Backend>(
        &self,
        device: &B::Device,
    ) -> impl Iterator<Item = Result<SequenceBatch<B>, DataError>> + '_ {
        let device = device.clone();
        self.order
            .chunks(self.batch_size)
            .map(move |indices| self.batch(indices, &device))
    }

    /// Stack the records at `indices` into one batch
    pub fn batch<B: Backend>(
        &self,
        indices: &[usize],
        device: &B::Device,
    ) -> Result<SequenceBatch<B>, DataError> {
        let length = self.dataset.sequence_length();
        let num_targets = self.dataset.num_targets();
        let rows = indices.len();

        let mut sequences = Vec::with_capacity(rows * length * NUM_NUCLEOTIDES);
        let mut labels = Vec::with_capacity(rows * num_targets);
        for &index in indices {
            let record = self.dataset.record(index)?;
            sequences.extend_from_slice(&record.sequence);
            labels.extend_from_slice(&record.target);
        }

        let targets: Vec<i64> = labels.iter().map(|&v| i64::from(v)).collect();

        Ok(SequenceBatch {
            sequences: Tensor::from_data(
                TensorData::new(sequences, [rows, 1, length, NUM_NUCLEOTIDES]),
                device,
            ),
            targets: Tensor::from_data(TensorData::new(targets, [rows, num_targets]), device),
            labels,
            indices: indices.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{label, write_dataset};
    use crate::data::{DatasetShape, Split};
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn small_dataset(rows: usize) -> (crate::data::fixtures::Fixture, BassetDataset) {
        let fixture = write_dataset([rows, 1, 1], 60, 5);
        let shape = DatasetShape {
            sequence_length: 60,
            num_targets: 5,
        };
        let dataset = BassetDataset::with_shape(&fixture.path, Split::Train, shape).unwrap();
        (fixture, dataset)
    }

    #[test]
    fn test_batch_shapes() {
        let (_fixture, dataset) = small_dataset(5);
        let device = <TestBackend as Backend>::Device::default();
        let loader = BatchLoader::new(&dataset, 2);

        assert_eq!(loader.num_batches(), 3);

        let batches: Vec<SequenceBatch<TestBackend>> =
            loader.iter(&device).collect::<Result<_, _>>().unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].sequences.dims(), [2, 1, 60, 4]);
        assert_eq!(batches[0].targets.dims(), [2, 5]);
        assert_eq!(batches[2].sequences.dims(), [1, 1, 60, 4]);
        assert_eq!(batches[2].labels.len(), 5);
        assert_eq!(batches[2].labels[3], label(4, 3));
    }

    #[test]
    fn test_shuffled_covers_every_row_once() {
        let (_fixture, dataset) = small_dataset(7);
        let device = <TestBackend as Backend>::Device::default();
        let loader = BatchLoader::shuffled(&dataset, 3, 42);

        let mut seen: Vec<usize> = loader
            .iter::<TestBackend>(&device)
            .flat_map(|batch| batch.unwrap().indices)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let (_fixture, dataset) = small_dataset(2);
        let loader = BatchLoader::new(&dataset, 0);
        assert_eq!(loader.batch_size(), 1);
        assert_eq!(loader.num_batches(), 2);
    }
}
