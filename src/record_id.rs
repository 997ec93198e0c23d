use std::hash::Hasher;

use fnv::FnvHasher;

/// A stable record identifier derived from the normalized
/// (vacancy, response) pair.
///
/// Ids are persisted in the vector index, so the hash (FNV-1a) must not
/// change between builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub u64);

impl RecordId {
    pub fn new(vacancy: &str, response: &str) -> Self {
        let mut hasher = FnvHasher::default();
        hasher.write(vacancy.as_bytes());
        // 0xff never occurs in UTF-8.
        hasher.write_u8(0xff);
        hasher.write(response.as_bytes());
        Self(hasher.finish())
    }

    /// Short hex form for human display (e.g. "a1b2c3").
    pub fn short(&self) -> String {
        format!("{:016x}", self.0)[..6].to_string()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.short())
    }
}

/// Order-sensitive fingerprint over a sequence of record ids.
///
/// Stored in the index metadata so a corpus that was re-saved without
/// rebuilding the index is detected even when its length is unchanged.
pub fn fingerprint<'a>(ids: impl IntoIterator<Item = &'a RecordId>) -> u64 {
    let mut hasher = FnvHasher::default();
    for id in ids {
        hasher.write_u64(id.0);
    }
    hasher.finish()
}
