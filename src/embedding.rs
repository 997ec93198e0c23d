use candle_core::Tensor;
use rayon::prelude::*;

use crate::{
    error::{Error, Result},
    vector_matrix::VectorMatrix,
};

/// Anything that turns text into fixed-length vectors.
///
/// Implementations must be deterministic for a fixed model and return one
/// vector per input, all of the same dimension.
pub trait Embedder {
    /// Identifier of the underlying model, recorded alongside the index.
    fn model_id(&self) -> &str;

    /// Encode a batch of texts, one vector per text, in input order.
    fn encode(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Encode `texts` and check the output shape before handing it on.
///
/// Returns an `[N, D]` matrix. Shape violations are reported as
/// [`Error::Embedding`].
pub fn encode_matrix<E: Embedder + ?Sized>(
    embedder: &mut E,
    texts: &[String],
) -> Result<VectorMatrix> {
    let vectors = embedder.encode(texts)?;

    if vectors.len() != texts.len() {
        return Err(Error::Embedding(format!(
            "model '{}' returned {} vectors for {} inputs",
            embedder.model_id(),
            vectors.len(),
            texts.len()
        )));
    }

    let dimension = vectors.first().map_or(0, Vec::len);
    if !texts.is_empty() && dimension == 0 {
        return Err(Error::Embedding(format!(
            "model '{}' returned empty vectors",
            embedder.model_id()
        )));
    }
    if let Some((i, v)) =
        vectors.iter().enumerate().find(|(_, v)| v.len() != dimension)
    {
        return Err(Error::Embedding(format!(
            "vector {i} has dimension {} but expected {dimension}",
            v.len()
        )));
    }
    if vectors.iter().flatten().any(|x| !x.is_finite()) {
        return Err(Error::Embedding(format!(
            "model '{}' produced non-finite values",
            embedder.model_id()
        )));
    }

    VectorMatrix::from_rows(&vectors, dimension)
}

/// Encode a single query into one vector.
pub fn encode_query<E: Embedder + ?Sized>(
    embedder: &mut E,
    query: &str,
) -> Result<Vec<f32>> {
    let matrix = encode_matrix(embedder, &[query.to_string()])?;
    Ok(matrix.row(0).to_vec())
}

/// Mean-pool a `[batch, tokens, dimension]` tensor of token embeddings into
/// one vector per batch entry.
///
/// Padding positions come back as all-zero rows and are excluded from the
/// mean, so a text pools to the same vector whether or not it was padded
/// to a longer batch neighbour.
pub fn mean_pool(token_embeddings: &Tensor) -> Result<Vec<Vec<f32>>> {
    let (_batch, _tokens, dimension) = token_embeddings.dims3()?;
    let nested: Vec<Vec<Vec<f32>>> = token_embeddings.to_vec3::<f32>()?;

    Ok(nested
        .into_par_iter()
        .map(|tokens| {
            let mut sum = vec![0.0f32; dimension];
            let mut count = 0usize;
            for token in tokens.iter().filter(|t| t.iter().any(|&x| x != 0.0)) {
                for (acc, x) in sum.iter_mut().zip(token) {
                    *acc += x;
                }
                count += 1;
            }
            if count > 0 {
                let scale = 1.0 / count as f32;
                sum.iter_mut().for_each(|x| *x *= scale);
            }
            sum
        })
        .collect())
}
