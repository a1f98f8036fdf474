use crate::error::DataError;
use memmap2::Mmap;
use safetensors::tensor::{Dtype, Metadata};
use safetensors::SafeTensors;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Element encoding of a stored array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    U8,
    F16,
    F32,
}

impl Encoding {
    fn from_dtype(name: &str, dtype: Dtype) -> Result<Self, DataError> {
        match dtype {
            Dtype::U8 => Ok(Encoding::U8),
            Dtype::F16 => Ok(Encoding::F16),
            Dtype::F32 => Ok(Encoding::F32),
            other => Err(DataError::UnsupportedDtype {
                name: name.to_string(),
                dtype: format!("{other:?}"),
            }),
        }
    }

    /// Size of one element in bytes
    pub fn width(&self) -> usize {
        match self {
            Encoding::U8 => 1,
            Encoding::F16 => 2,
            Encoding::F32 => 4,
        }
    }
}

/// Location and layout of one named array inside the mapped file
#[derive(Debug, Clone)]
pub struct ArrayInfo {
    pub name: String,
    pub encoding: Encoding,
    pub shape: Vec<usize>,
    bytes: Range<usize>,
}

impl ArrayInfo {
    /// Length of the leading (row) dimension
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Elements per row
    pub fn row_elements(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// Byte range of `row` relative to the start of the file
    fn row_range(&self, row: usize) -> Range<usize> {
        let row_bytes = self.row_elements() * self.encoding.width();
        let start = self.bytes.start + row * row_bytes;
        start..start + row_bytes
    }
}

/// Read-only, memory-mapped container of named arrays
///
/// The file follows the safetensors layout: an 8-byte little-endian header
/// length, a JSON header describing every array, then the raw array bytes.
/// Free-form string metadata lives in the header's `__metadata__` map.
pub struct ArrayStore {
    path: PathBuf,
    mmap: Mmap,
    data_start: usize,
    metadata: Metadata,
}

impl ArrayStore {
    /// Map `path` and parse its header
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // SAFETY: the mapping is read-only and the dataset file is treated as
        // immutable for the lifetime of the store.
        let mmap = unsafe { Mmap::map(&file)? };

        let (header_len, metadata) =
            SafeTensors::read_metadata(&mmap[..]).map_err(|e| DataError::Header(e.to_string()))?;

        debug!("Mapped {:?} ({} bytes)", path, mmap.len());

        Ok(Self {
            path,
            mmap,
            data_start: 8 + header_len,
            metadata,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a named array
    pub fn array(&self, name: &str) -> Result<ArrayInfo, DataError> {
        let info = self
            .metadata
            .info(name)
            .ok_or_else(|| DataError::MissingArray(name.to_string()))?;
        let (begin, end) = info.data_offsets;

        Ok(ArrayInfo {
            name: name.to_string(),
            encoding: Encoding::from_dtype(name, info.dtype)?,
            shape: info.shape.clone(),
            bytes: self.data_start + begin..self.data_start + end,
        })
    }

    /// Raw bytes of one row of `array`
    pub fn row_bytes(&self, array: &ArrayInfo, row: usize) -> Result<&[u8], DataError> {
        if row >= array.rows() {
            return Err(DataError::IndexOutOfRange {
                index: row,
                len: array.rows(),
            });
        }
        Ok(&self.mmap[array.row_range(row)])
    }

    /// Decode a JSON list of strings stored under `key` in the file metadata
    pub fn string_list(&self, key: &str) -> Result<Option<Vec<String>>, DataError> {
        let raw = match self.metadata.metadata() {
            Some(map) => map.get(key),
            None => None,
        };

        raw.map(|json| {
            serde_json::from_str::<Vec<String>>(json).map_err(|e| DataError::Metadata {
                key: key.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
    }
}

/// Widen packed little-endian half floats into `out`
pub fn widen_f16(bytes: &[u8], out: &mut Vec<f32>) {
    out.extend(
        bytes
            .chunks_exact(2)
            .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32()),
    );
}

/// Decode a row of labels, mapping any nonzero value to 1
pub fn decode_labels(bytes: &[u8], encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::U8 => bytes.iter().map(|&b| (b != 0) as u8).collect(),
        Encoding::F16 => bytes
            .chunks_exact(2)
            .map(|b| (half::f16::from_le_bytes([b[0], b[1]]).to_f32() != 0.0) as u8)
            .collect(),
        Encoding::F32 => bytes
            .chunks_exact(4)
            .map(|b| (f32::from_le_bytes([b[0], b[1], b[2], b[3]]) != 0.0) as u8)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    #[test]
    fn test_widen_f16_is_exact() {
        let values = [0.0f32, 1.0, -2.5, 0.25, 65504.0];
        let bytes: Vec<u8> = values
            .iter()
            .flat_map(|&v| f16::from_f32(v).to_le_bytes())
            .collect();

        let mut widened = Vec::new();
        widen_f16(&bytes, &mut widened);
        assert_eq!(widened, values);
    }

    #[test]
    fn test_decode_labels() {
        assert_eq!(decode_labels(&[0, 1, 7], Encoding::U8), vec![0, 1, 1]);

        let f32_bytes: Vec<u8> = [0.0f32, 1.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(decode_labels(&f32_bytes, Encoding::F32), vec![0, 1]);

        let f16_bytes: Vec<u8> = [1.0f32, 0.0]
            .iter()
            .flat_map(|&v| f16::from_f32(v).to_le_bytes())
            .collect();
        assert_eq!(decode_labels(&f16_bytes, Encoding::F16), vec![1, 0]);
    }

    #[test]
    fn test_missing_file() {
        let result = ArrayStore::open("/nonexistent/er.safetensors");
        assert!(matches!(result, Err(DataError::Io(_))));
    }
}
