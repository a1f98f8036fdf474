//! Small on-disk datasets for tests.

use crate::data::{Split, NUM_NUCLEOTIDES, TARGET_LABELS_KEY, TEST_HEADERS_KEY};
use half::f16;
use safetensors::tensor::{Dtype, TensorView};
use std::collections::HashMap;
use std::path::PathBuf;
use tempfile::TempDir;

/// Nucleotide placed at `position` of row `row`
pub fn nucleotide(row: usize, position: usize) -> usize {
    (row + position) % NUM_NUCLEOTIDES
}

/// Label of cell type `target` for row `row`; every row holds both classes
/// when there are at least two targets
pub fn label(row: usize, target: usize) -> u8 {
    ((row + target) % 2) as u8
}

fn encode_inputs(rows: usize, length: usize) -> Vec<u8> {
    // storage layout per row: [4, 1, length], nucleotide-major
    let mut bytes = Vec::with_capacity(rows * NUM_NUCLEOTIDES * length * 2);
    for row in 0..rows {
        for channel in 0..NUM_NUCLEOTIDES {
            for position in 0..length {
                let value = if nucleotide(row, position) == channel { 1.0 } else { 0.0 };
                bytes.extend_from_slice(&f16::from_f32(value).to_le_bytes());
            }
        }
    }
    bytes
}

fn encode_targets(rows: usize, targets: usize) -> Vec<u8> {
    (0..rows)
        .flat_map(|row| (0..targets).map(move |t| label(row, t)))
        .collect()
}

/// Dataset file holding every split with `rows[split]` records
pub struct Fixture {
    _dir: TempDir,
    pub path: PathBuf,
}

pub fn write_dataset(rows: [usize; 3], length: usize, targets: usize) -> Fixture {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("er.safetensors");

    let mut buffers = Vec::new();
    for (split, &count) in Split::ALL.iter().zip(rows.iter()) {
        buffers.push((
            split.input_key(),
            encode_inputs(count, length),
            vec![count, NUM_NUCLEOTIDES, 1, length],
            Dtype::F16,
        ));
        buffers.push((
            split.target_key(),
            encode_targets(count, targets),
            vec![count, targets],
            Dtype::U8,
        ));
    }

    let views: Vec<(String, TensorView<'_>)> = buffers
        .iter()
        .map(|(name, bytes, shape, dtype)| {
            (name.clone(), TensorView::new(*dtype, shape.clone(), bytes).unwrap())
        })
        .collect();

    let labels: Vec<String> = (0..targets).map(|t| format!("cell_{t}")).collect();
    let headers: Vec<String> = (0..rows[2])
        .map(|r| format!("chr1:{}-{}", r * length, (r + 1) * length))
        .collect();
    let mut metadata = HashMap::new();
    metadata.insert(TARGET_LABELS_KEY.to_string(), serde_json::to_string(&labels).unwrap());
    metadata.insert(TEST_HEADERS_KEY.to_string(), serde_json::to_string(&headers).unwrap());

    let bytes = safetensors::serialize(views, &Some(metadata)).unwrap();
    std::fs::write(&path, bytes).unwrap();

    Fixture { _dir: dir, path }
}
