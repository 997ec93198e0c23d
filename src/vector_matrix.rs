use std::{io::Write, path::Path};

use crate::{
    atomic::write_atomically,
    error::{Error, Result},
};

const MAGIC: &[u8; 4] = b"CBVM";

/// Header size: 4 bytes magic + 4 bytes row count + 4 bytes dimension.
const HEADER_SIZE: usize = 12;

/// A dense `[rows, dimension]` matrix of f32 embeddings.
///
/// Binary file format:
/// - 4 bytes: magic `CBVM`
/// - 4 bytes: row count N (u32 LE)
/// - 4 bytes: dimension D (u32 LE)
/// - N * D * 4 bytes: f32 LE values in row-major order
///
/// Row `i` belongs to corpus record `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatrix {
    rows: usize,
    dimension: usize,
    /// `data[row * dimension + dim]`.
    data: Vec<f32>,
}

impl VectorMatrix {
    pub fn new(rows: usize, dimension: usize, data: Vec<f32>) -> Result<Self> {
        if rows.checked_mul(dimension) != Some(data.len()) {
            return Err(Error::Embedding(format!(
                "matrix data has {} values, expected {rows} x {dimension}",
                data.len()
            )));
        }
        Ok(Self {
            rows,
            dimension,
            data,
        })
    }

    /// Stack equally sized rows into a matrix.
    pub fn from_rows(rows: &[Vec<f32>], dimension: usize) -> Result<Self> {
        let mut data = Vec::with_capacity(rows.len() * dimension);
        for row in rows {
            if row.len() != dimension {
                return Err(Error::Embedding(format!(
                    "row has dimension {} but expected {dimension}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::new(rows.len(), dimension, data)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[f32] {
        let start = i * self.dimension;
        &self.data[start..start + self.dimension]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact(0) panics; a zero-dimension matrix has no rows.
        self.data.chunks_exact(self.dimension.max(1)).take(self.rows)
    }

    /// Write the matrix to `path`, replacing any existing file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let rows = u32::try_from(self.rows).map_err(|_| {
            Error::Config(format!("too many rows to persist: {}", self.rows))
        })?;
        let dimension = u32::try_from(self.dimension).map_err(|_| {
            Error::Config(format!("dimension too large: {}", self.dimension))
        })?;

        write_atomically(path, |w| {
            w.write_all(MAGIC)?;
            w.write_all(&rows.to_le_bytes())?;
            w.write_all(&dimension.to_le_bytes())?;
            w.write_all(bytemuck::cast_slice(&self.data))?;
            Ok(())
        })
    }

    /// Read a matrix written by [`VectorMatrix::save`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::missing_path("vector matrix", path));
        }

        let bytes = std::fs::read(path)?;
        if bytes.len() < HEADER_SIZE || &bytes[0..4] != MAGIC {
            return Err(Error::IndexInconsistent(format!(
                "{} is not a vector matrix file",
                path.display()
            )));
        }

        let rows = read_u32(&bytes[4..8]) as usize;
        let dimension = read_u32(&bytes[8..12]) as usize;
        let expected_len = rows
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(HEADER_SIZE));
        if expected_len != Some(bytes.len()) {
            return Err(Error::IndexInconsistent(format!(
                "vector matrix {} has {} bytes, which does not fit \
                 {rows} x {dimension}",
                path.display(),
                bytes.len()
            )));
        }

        // The payload is not guaranteed to be 4-byte aligned inside the Vec,
        // so decode value by value instead of casting the slice.
        let data = bytes[HEADER_SIZE..]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Self::new(rows, dimension, data)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
