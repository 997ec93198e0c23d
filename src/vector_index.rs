use std::path::Path;

use candle_core::{Device, Tensor};
use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};

use crate::{
    error::{Error, Result},
    record_id::RecordId,
    vector_matrix::VectorMatrix,
};

const ROWS: TableDefinition<u64, &[u8]> = TableDefinition::new("rows");
const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

/// Row header: 8 bytes record id.
const ROW_HEADER_SIZE: usize = 8;

/// Provenance stored next to the vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    /// Embedding model used to build the index.
    pub model_id: String,
    /// [`crate::record_id::fingerprint`] of the corpus the index was built from.
    pub corpus_fingerprint: u64,
}

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position in the index (and in the corpus it was built from).
    pub row: usize,
    pub id: RecordId,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

/// Exact nearest-neighbour index under squared L2 distance.
///
/// Every query is compared against every stored row. Rows are immutable
/// once built; rebuilding means constructing a new index.
///
/// On disk the index is a redb database:
/// - `rows`: row position (u64) → 8 bytes record id (u64 LE) followed by
///   D f32 LE values
/// - `meta`: `dimension`, `count`, `model_id`, `corpus_fingerprint`
#[derive(Debug, Clone)]
pub struct FlatL2Index {
    ids: Vec<RecordId>,
    vectors: VectorMatrix,
    tensor: Tensor,
}

impl FlatL2Index {
    /// Build an index where row `i` holds `vectors.row(i)` for `ids[i]`.
    pub fn build(ids: Vec<RecordId>, vectors: VectorMatrix) -> Result<Self> {
        if ids.len() != vectors.rows() {
            return Err(Error::IndexInconsistent(format!(
                "{} ids for {} vectors",
                ids.len(),
                vectors.rows()
            )));
        }
        let tensor = Tensor::from_slice(
            vectors.as_slice(),
            (vectors.rows(), vectors.dimension()),
            &Device::Cpu,
        )?;
        Ok(Self {
            ids,
            vectors,
            tensor,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.vectors.dimension()
    }

    pub fn ids(&self) -> &[RecordId] {
        &self.ids
    }

    pub fn vectors(&self) -> &VectorMatrix {
        &self.vectors
    }

    /// Return the `k` rows closest to `query`, nearest first.
    ///
    /// Fewer than `k` hits are returned when the index holds fewer rows.
    /// Equal distances keep row order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension() {
            return Err(Error::IndexInconsistent(format!(
                "query has dimension {} but the index has dimension {}",
                query.len(),
                self.dimension()
            )));
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query = Tensor::from_slice(query, (1, query.len()), &Device::Cpu)?;
        let distances: Vec<f32> = self
            .tensor
            .broadcast_sub(&query)?
            .sqr()?
            .sum(1)?
            .to_vec1()?;

        let mut order: Vec<usize> = (0..distances.len()).collect();
        order.sort_by(|&a, &b| {
            distances[a].total_cmp(&distances[b]).then(a.cmp(&b))
        });

        Ok(order
            .into_iter()
            .take(k)
            .map(|row| Neighbor {
                row,
                id: self.ids[row],
                distance: distances[row],
            })
            .collect())
    }

    /// Persist to a redb database at `path`, replacing it atomically.
    pub fn save(&self, path: &Path, meta: &IndexMeta) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let staging = tempfile::Builder::new()
            .prefix(".index")
            .tempfile_in(dir)?
            .into_temp_path();

        {
            let db = Database::create(&staging)?;
            let txn = db.begin_write()?;
            {
                let mut rows = txn.open_table(ROWS)?;
                for (row, (id, vector)) in
                    self.ids.iter().zip(self.vectors.iter_rows()).enumerate()
                {
                    let mut bytes = Vec::with_capacity(
                        ROW_HEADER_SIZE + std::mem::size_of_val(vector),
                    );
                    bytes.extend_from_slice(&id.0.to_le_bytes());
                    bytes.extend_from_slice(bytemuck::cast_slice(vector));
                    rows.insert(row as u64, bytes.as_slice())?;
                }

                let mut table = txn.open_table(META)?;
                let dimension = self.dimension().to_string();
                table.insert("dimension", dimension.as_str())?;
                table.insert("count", self.len().to_string().as_str())?;
                table.insert("model_id", meta.model_id.as_str())?;
                table.insert(
                    "corpus_fingerprint",
                    meta.corpus_fingerprint.to_string().as_str(),
                )?;
            }
            txn.commit()?;
        }

        staging.persist(path).map_err(|e| Error::Io(e.error))?;
        tracing::debug!(
            path = %path.display(),
            rows = self.len(),
            "index written"
        );
        Ok(())
    }

    /// Load an index written by [`FlatL2Index::save`].
    ///
    /// Any mismatch between the recorded shape and the stored rows is
    /// reported as [`Error::IndexInconsistent`].
    pub fn load(path: &Path) -> Result<(Self, IndexMeta)> {
        if !path.exists() {
            return Err(Error::missing_path("vector index", path));
        }

        // Shared lock: concurrent readers must not exclude each other.
        let db = Database::builder().open_read_only(path)?;
        let txn = db.begin_read()?;

        let meta_table = txn.open_table(META)?;
        let setting = |key: &str| -> Result<String> {
            meta_table
                .get(key)?
                .map(|v| v.value().to_string())
                .ok_or_else(|| {
                    Error::IndexInconsistent(format!(
                        "index metadata is missing '{key}'"
                    ))
                })
        };
        let dimension: usize = parse_meta("dimension", &setting("dimension")?)?;
        let count: usize = parse_meta("count", &setting("count")?)?;
        let meta = IndexMeta {
            model_id: setting("model_id")?,
            corpus_fingerprint: parse_meta(
                "corpus_fingerprint",
                &setting("corpus_fingerprint")?,
            )?,
        };

        let rows = txn.open_table(ROWS)?;
        let stored = rows.len()?;
        if stored != count as u64 {
            return Err(Error::IndexInconsistent(format!(
                "index metadata records {count} rows but {stored} are stored"
            )));
        }
        let Some(expected_len) = dimension
            .checked_mul(4)
            .and_then(|n| n.checked_add(ROW_HEADER_SIZE))
        else {
            return Err(Error::IndexInconsistent(format!(
                "index dimension {dimension} is out of range"
            )));
        };
        // Capacity follows the stored rows, never the recorded dimension.
        let mut ids = Vec::with_capacity(count);
        let mut data = Vec::new();

        for (expected_row, entry) in rows.iter()?.enumerate() {
            let (key, value) = entry?;
            let bytes = value.value();
            if key.value() != expected_row as u64
                || bytes.len() != expected_len
            {
                return Err(Error::IndexInconsistent(format!(
                    "index row {} is damaged",
                    key.value()
                )));
            }
            let mut id = [0u8; 8];
            id.copy_from_slice(&bytes[..ROW_HEADER_SIZE]);
            ids.push(RecordId(u64::from_le_bytes(id)));
            data.extend(
                bytes[ROW_HEADER_SIZE..]
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            );
        }

        let vectors = VectorMatrix::new(count, dimension, data)?;
        Ok((Self::build(ids, vectors)?, meta))
    }
}

fn parse_meta<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        Error::IndexInconsistent(format!(
            "index metadata '{key}' has invalid value '{value}'"
        ))
    })
}
