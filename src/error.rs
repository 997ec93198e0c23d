use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("tensor computation error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("could not move artifact into place: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("index is inconsistent with corpus: {0}")]
    IndexInconsistent(String),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl Error {
    /// Shorthand for a missing file or directory.
    pub fn missing_path(kind: &'static str, path: &std::path::Path) -> Self {
        Self::NotFound {
            kind,
            name: path.display().to_string(),
        }
    }
}
