//! Offline build: clean corpus → embeddings → persisted index.

use std::path::Path;

use serde::Serialize;

use crate::{
    corpus::{self, CorpusStats, ExampleRecord},
    data_dir::ArtifactPaths,
    embedding::{Embedder, encode_matrix},
    error::{Error, Result},
    record_id,
    vector_index::{FlatL2Index, IndexMeta},
};

/// What a build produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    pub corpus: CorpusStats,
    pub dimension: usize,
    pub model_id: String,
}

/// Embed every record's vacancy in one batch and build a flat L2 index.
///
/// Nothing is written here; see [`persist`].
pub fn build_index<E: Embedder + ?Sized>(
    embedder: &mut E,
    corpus: &[ExampleRecord],
) -> Result<(FlatL2Index, IndexMeta)> {
    if corpus.is_empty() {
        return Err(Error::Config(
            "clean corpus is empty, nothing to index".to_string(),
        ));
    }

    let vacancies: Vec<String> =
        corpus.iter().map(|r| r.vacancy().to_string()).collect();
    let vectors = encode_matrix(embedder, &vacancies)?;

    let ids: Vec<_> = corpus.iter().map(ExampleRecord::id).collect();
    let meta = IndexMeta {
        model_id: embedder.model_id().to_string(),
        corpus_fingerprint: record_id::fingerprint(&ids),
    };
    let index = FlatL2Index::build(ids, vectors)?;

    tracing::info!(
        rows = index.len(),
        dimension = index.dimension(),
        model = %meta.model_id,
        "built vector index"
    );
    Ok((index, meta))
}

/// Write all three artifacts for `corpus`.
///
/// The index goes last so that a reader racing the build sees either the
/// old index or a fingerprint mismatch, never a silently misaligned one.
pub fn persist(
    corpus: &[ExampleRecord],
    index: &FlatL2Index,
    meta: &IndexMeta,
    paths: &ArtifactPaths,
) -> Result<()> {
    corpus::save_corpus(corpus, &paths.corpus)?;
    index.vectors().save(&paths.vectors)?;
    index.save(&paths.index, meta)?;
    Ok(())
}

/// Run the full pipeline: load and clean `source`, embed, and persist.
///
/// Embedding happens before anything is written, so a model failure leaves
/// previously built artifacts untouched.
pub fn build<E: Embedder + ?Sized>(
    embedder: &mut E,
    source: &Path,
    paths: &ArtifactPaths,
) -> Result<BuildSummary> {
    let raw = corpus::load_raw(source)?;
    let prepared = corpus::prepare_corpus(&raw);
    let stats = CorpusStats::new(raw.len(), prepared.records.len());
    tracing::info!(
        total = stats.total,
        kept = stats.kept,
        dropped = stats.dropped,
        "prepared corpus"
    );

    let (index, meta) = build_index(embedder, &prepared.records)?;
    persist(&prepared.records, &index, &meta, paths)?;

    Ok(BuildSummary {
        corpus: stats,
        dimension: index.dimension(),
        model_id: meta.model_id,
    })
}
