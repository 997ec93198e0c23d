use std::{collections::HashMap, sync::Mutex};

use serde::Serialize;

use crate::{
    corpus::{self, ExampleRecord},
    data_dir::ArtifactPaths,
    embedding::{Embedder, encode_query},
    error::{Error, Result},
    record_id::{self, RecordId},
    vector_index::{FlatL2Index, IndexMeta},
    vector_matrix::VectorMatrix,
};

/// Number of examples retrieved when the caller does not say otherwise.
pub const DEFAULT_K: usize = 3;

/// Characters of vacancy/response shown per result in the terminal.
const PREVIEW_CHARS: usize = 100;

/// A retrieved example with its distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    /// 1-based position in the result list.
    pub rank: usize,
    /// Squared Euclidean distance between query and vacancy embeddings.
    pub distance: f32,
    pub record: ExampleRecord,
}

#[derive(Debug)]
struct Loaded {
    corpus: Vec<ExampleRecord>,
    by_id: HashMap<RecordId, usize>,
    index: FlatL2Index,
    meta: IndexMeta,
}

/// Query-time access to the persisted artifacts.
///
/// Artifacts are read and cross-checked once in [`Retriever::open`] and
/// reused by every search; call [`Retriever::reload`] after a rebuild.
/// Searches take `&self` and may run concurrently; only the embedding call
/// is serialized.
pub struct Retriever<E> {
    paths: ArtifactPaths,
    embedder: Mutex<E>,
    loaded: Loaded,
}

impl<E: Embedder> Retriever<E> {
    /// Load and validate the artifacts at `paths`.
    ///
    /// Fails with [`Error::NotFound`] if an artifact is missing and with
    /// [`Error::IndexInconsistent`] if they disagree with each other or
    /// with the dimension produced by `embedder`.
    pub fn open(paths: ArtifactPaths, mut embedder: E) -> Result<Self> {
        let loaded = load_artifacts(&paths)?;
        check_embedder(&mut embedder, &loaded)?;
        Ok(Self {
            paths,
            embedder: Mutex::new(embedder),
            loaded,
        })
    }

    /// Re-read the artifacts from disk, e.g. after `build` replaced them.
    ///
    /// On failure the previously loaded state is kept.
    pub fn reload(&mut self) -> Result<()> {
        let loaded = load_artifacts(&self.paths)?;
        let embedder = self.embedder.get_mut().map_err(|_| poisoned())?;
        check_embedder(embedder, &loaded)?;
        self.loaded = loaded;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.loaded.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.corpus.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.loaded.index.dimension()
    }

    /// Model id recorded when the index was built.
    pub fn index_model_id(&self) -> &str {
        &self.loaded.meta.model_id
    }

    /// The `k` examples whose vacancies are closest to `query`, nearest first.
    ///
    /// Returns all records when `k` exceeds the corpus size.
    pub fn search_few_shot(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ExampleRecord>> {
        Ok(self
            .search_scored(query, k)?
            .into_iter()
            .map(|hit| hit.record)
            .collect())
    }

    /// Like [`Retriever::search_few_shot`], keeping ranks and distances.
    pub fn search_scored(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        if k == 0 {
            return Err(Error::Config("k must be at least 1".to_string()));
        }

        let query_vector = {
            let mut embedder = self.embedder.lock().map_err(|_| poisoned())?;
            encode_query(&mut *embedder, query)?
        };

        let hits = self.loaded.index.search(&query_vector, k)?;
        hits.into_iter()
            .enumerate()
            .map(|(i, hit)| {
                let position =
                    self.loaded.by_id.get(&hit.id).copied().ok_or_else(|| {
                        Error::IndexInconsistent(format!(
                            "index row {} refers to unknown record {}",
                            hit.row, hit.id
                        ))
                    })?;
                Ok(ScoredRecord {
                    rank: i + 1,
                    distance: hit.distance,
                    record: self.loaded.corpus[position].clone(),
                })
            })
            .collect()
    }
}

fn poisoned() -> Error {
    Error::Embedding("embedding model lock poisoned".to_string())
}

fn load_artifacts(paths: &ArtifactPaths) -> Result<Loaded> {
    let corpus = corpus::load_clean_corpus(&paths.corpus)?;
    let matrix = VectorMatrix::load(&paths.vectors)?;
    let (index, meta) = FlatL2Index::load(&paths.index)?;

    if corpus.len() != index.len() || matrix.rows() != index.len() {
        return Err(Error::IndexInconsistent(format!(
            "corpus has {} records, vector matrix {} rows, index {} rows",
            corpus.len(),
            matrix.rows(),
            index.len()
        )));
    }
    if matrix.dimension() != index.dimension() {
        return Err(Error::IndexInconsistent(format!(
            "vector matrix dimension {} differs from index dimension {}",
            matrix.dimension(),
            index.dimension()
        )));
    }
    if &matrix != index.vectors() {
        return Err(Error::IndexInconsistent(
            "vector matrix and index hold different vectors".to_string(),
        ));
    }

    let corpus_ids: Vec<RecordId> =
        corpus.iter().map(ExampleRecord::id).collect();
    if record_id::fingerprint(&corpus_ids) != meta.corpus_fingerprint {
        return Err(Error::IndexInconsistent(
            "corpus changed since the index was built; run `build` again"
                .to_string(),
        ));
    }
    if let Some(row) = corpus_ids
        .iter()
        .zip(index.ids())
        .position(|(corpus_id, index_id)| corpus_id != index_id)
    {
        return Err(Error::IndexInconsistent(format!(
            "index row {row} does not match corpus record {row}"
        )));
    }

    let by_id = corpus_ids
        .iter()
        .enumerate()
        .map(|(position, id)| (*id, position))
        .collect();

    tracing::debug!(
        records = corpus.len(),
        dimension = index.dimension(),
        model = %meta.model_id,
        "loaded retrieval artifacts"
    );
    Ok(Loaded {
        corpus,
        by_id,
        index,
        meta,
    })
}

/// Embed one corpus vacancy and make sure the model speaks the index's
/// dimension before any query is served.
fn check_embedder<E: Embedder + ?Sized>(
    embedder: &mut E,
    loaded: &Loaded,
) -> Result<()> {
    if embedder.model_id() != loaded.meta.model_id {
        tracing::warn!(
            index_model = %loaded.meta.model_id,
            query_model = %embedder.model_id(),
            "querying with a different model than the index was built with"
        );
    }

    let Some(first) = loaded.corpus.first() else {
        return Ok(());
    };
    let dimension = encode_query(embedder, first.vacancy())?.len();
    if dimension != loaded.index.dimension() {
        return Err(Error::IndexInconsistent(format!(
            "model '{}' produces {dimension}-dimensional vectors but the index has dimension {}",
            embedder.model_id(),
            loaded.index.dimension()
        )));
    }
    Ok(())
}

fn preview(text: &str, full: bool) -> String {
    if full || text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}

/// Format results for human-readable terminal output.
pub fn format_human(results: &[ScoredRecord], full: bool) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for r in results {
        println!(
            "{:>3}. [{:.4}] {}",
            r.rank,
            r.distance,
            r.record.id()
        );
        println!("     vacancy: {}", preview(r.record.vacancy(), full));
        println!("     response: {}", preview(r.record.response(), full));
    }
    println!("\n{} result(s)", results.len());
}

#[derive(Serialize)]
struct JsonResult<'a> {
    rank: usize,
    distance: f32,
    id: String,
    vacancy: &'a str,
    response: &'a str,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    query: &'a str,
    result_count: usize,
    results: Vec<JsonResult<'a>>,
}

/// Format results as JSON output.
pub fn format_json(results: &[ScoredRecord], query: &str) -> Result<()> {
    let output = JsonOutput {
        query,
        result_count: results.len(),
        results: results
            .iter()
            .map(|r| JsonResult {
                rank: r.rank,
                distance: r.distance,
                id: r.record.id().short(),
                vacancy: r.record.vacancy(),
                response: r.record.response(),
            })
            .collect(),
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder, embedding::testing::HashingEmbedder};

    const RAW: &str = concat!(
        r#"{"vacancy":"Backend Python role","response":"Dear hiring..."}"#,
        "\n",
        r#"{"vacancy":"","response":"x"}"#,
        "\n",
        "not-json-line\n",
        r#"{"vacancy":"Frontend React role","response":"Hello..."}"#,
        "\n",
    );

    fn built() -> (tempfile::TempDir, ArtifactPaths) {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("raw.jsonl");
        std::fs::write(&source, RAW).unwrap();
        let paths = ArtifactPaths::in_dir(tmp.path());
        builder::build(&mut HashingEmbedder::new(64), &source, &paths).unwrap();
        (tmp, paths)
    }

    #[test]
    fn nearest_example_comes_first() {
        let (_tmp, paths) = built();
        let retriever =
            Retriever::open(paths, HashingEmbedder::new(64)).unwrap();

        let results = retriever
            .search_few_shot("Python backend developer", 1)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].vacancy(), "Backend Python role");
    }

    #[test]
    fn k_larger_than_corpus_returns_everything() {
        let (_tmp, paths) = built();
        let retriever =
            Retriever::open(paths, HashingEmbedder::new(64)).unwrap();

        let results = retriever.search_scored("anything at all", 10).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].distance <= results[1].distance);
        assert_eq!(results[1].rank, 2);
    }

    #[test]
    fn exact_vacancy_matches_at_distance_zero() {
        let (_tmp, paths) = built();
        let retriever =
            Retriever::open(paths, HashingEmbedder::new(64)).unwrap();

        let results =
            retriever.search_scored("Frontend React role", 2).unwrap();
        assert_eq!(results[0].record.vacancy(), "Frontend React role");
        assert_eq!(results[0].distance, 0.0);
    }

    #[test]
    fn zero_k_is_rejected() {
        let (_tmp, paths) = built();
        let retriever =
            Retriever::open(paths, HashingEmbedder::new(64)).unwrap();
        assert!(matches!(
            retriever.search_few_shot("x", 0),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn missing_artifacts_are_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::in_dir(tmp.path());
        assert!(matches!(
            Retriever::open(paths, HashingEmbedder::new(8)),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn dimension_mismatch_is_caught_at_open() {
        let (_tmp, paths) = built();
        assert!(matches!(
            Retriever::open(paths, HashingEmbedder::new(16)),
            Err(Error::IndexInconsistent(_))
        ));
    }

    #[test]
    fn shrunken_corpus_is_inconsistent() {
        let (_tmp, paths) = built();
        let corpus = corpus::load_clean_corpus(&paths.corpus).unwrap();
        corpus::save_corpus(&corpus[..1], &paths.corpus).unwrap();

        assert!(matches!(
            Retriever::open(paths, HashingEmbedder::new(64)),
            Err(Error::IndexInconsistent(_))
        ));
    }

    #[test]
    fn reordered_corpus_is_inconsistent() {
        let (_tmp, paths) = built();
        let mut corpus = corpus::load_clean_corpus(&paths.corpus).unwrap();
        corpus.reverse();
        corpus::save_corpus(&corpus, &paths.corpus).unwrap();

        assert!(matches!(
            Retriever::open(paths, HashingEmbedder::new(64)),
            Err(Error::IndexInconsistent(_))
        ));
    }

    fn open_with_vectors(
        paths: ArtifactPaths,
        vectors: VectorMatrix,
    ) -> Result<()> {
        vectors.save(&paths.vectors).unwrap();
        Retriever::open(paths, HashingEmbedder::new(64)).map(|_| ())
    }

    #[test]
    fn matrix_with_extra_rows_is_inconsistent() {
        let (_tmp, paths) = built();
        let vectors = VectorMatrix::new(3, 64, vec![0.5; 3 * 64]).unwrap();
        assert!(matches!(
            open_with_vectors(paths, vectors),
            Err(Error::IndexInconsistent(_))
        ));
    }

    #[test]
    fn matrix_with_other_dimension_is_inconsistent() {
        let (_tmp, paths) = built();
        let vectors = VectorMatrix::new(2, 32, vec![0.5; 2 * 32]).unwrap();
        assert!(matches!(
            open_with_vectors(paths, vectors),
            Err(Error::IndexInconsistent(_))
        ));
    }

    #[test]
    fn matrix_with_other_values_is_inconsistent() {
        let (_tmp, paths) = built();
        let stored = VectorMatrix::load(&paths.vectors).unwrap();
        let mut data = stored.as_slice().to_vec();
        data[0] += 1.0;
        let vectors = VectorMatrix::new(2, 64, data).unwrap();
        assert!(matches!(
            open_with_vectors(paths, vectors),
            Err(Error::IndexInconsistent(_))
        ));
    }

    #[test]
    fn reload_picks_up_rebuild() {
        let (tmp, paths) = built();
        let mut retriever =
            Retriever::open(paths.clone(), HashingEmbedder::new(64)).unwrap();
        assert_eq!(retriever.len(), 2);

        let source = tmp.path().join("raw2.jsonl");
        std::fs::write(
            &source,
            concat!(
                r#"{"vacancy":"Data engineer","response":"Hi"}"#,
                "\n",
                r#"{"vacancy":"Rust developer","response":"Hello"}"#,
                "\n",
                r#"{"vacancy":"QA engineer","response":"Hey"}"#,
                "\n",
            ),
        )
        .unwrap();
        builder::build(&mut HashingEmbedder::new(64), &source, &paths).unwrap();

        retriever.reload().unwrap();
        assert_eq!(retriever.len(), 3);
        let top = retriever.search_few_shot("Rust developer", 1).unwrap();
        assert_eq!(top[0].response(), "Hello");
    }

    #[test]
    fn preview_truncates_long_text() {
        let long = "é".repeat(150);
        let shown = preview(&long, false);
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview(&long, true), long);
        assert_eq!(preview("short", false), "short");
    }
}
