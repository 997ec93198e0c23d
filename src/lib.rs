//! coverbert - few-shot example retrieval for application letter generation.
//!
//! coverbert keeps a small corpus of (vacancy, response) pairs, embeds each
//! vacancy with a [ColBERT](https://github.com/stanford-futuredata/ColBERT)
//! model, and retrieves the examples closest to a new vacancy under squared
//! Euclidean distance. The retrieved pairs become few-shot demonstrations in
//! a language model prompt.
//!
//! # Quick start
//!
//! ```no_run
//! use coverbert::{DataDir, ModelManager, Retriever, builder};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let paths = data_dir.artifacts();
//!
//! let mut model = ModelManager::new();
//! builder::build(&mut model, &data_dir.raw_corpus(), &paths).unwrap();
//!
//! let retriever = Retriever::open(paths, model).unwrap();
//! let query = "Senior Rust engineer";
//! for example in retriever.search_few_shot(query, 3).unwrap() {
//!     println!("{}\n{}\n", example.vacancy(), example.response());
//! }
//! ```

pub mod atomic;
pub mod builder;
pub mod cli;
pub mod corpus;
pub mod data_dir;
pub mod document;
pub mod embedding;
pub mod error;
pub mod model_manager;
pub mod prompt;
pub mod record_id;
pub mod retriever;
pub mod vector_index;
pub mod vector_matrix;

pub use corpus::ExampleRecord;
pub use data_dir::{ArtifactPaths, DataDir};
pub use embedding::Embedder;
pub use error::{Error, Result};
pub use model_manager::ModelManager;
pub use record_id::RecordId;
pub use retriever::Retriever;
pub use vector_index::FlatL2Index;
