use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DATA_DIR_ENV_VAR: &str = "COVERBERT_DATA_DIR";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The COVERBERT_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/coverbert/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var(DATA_DIR_ENV_VAR) {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("coverbert")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Default location of the raw, uncleaned example corpus.
    pub fn raw_corpus(&self) -> PathBuf {
        self.root.join("few_shot_examples.jsonl")
    }

    /// Default location of the résumé summary shown with every example.
    pub fn static_summary(&self) -> PathBuf {
        self.root.join("resume_short.txt")
    }

    pub fn artifacts(&self) -> ArtifactPaths {
        ArtifactPaths::in_dir(&self.root)
    }
}

/// Locations of the three artifacts produced by a build.
///
/// They are only meaningful together: the corpus, vector matrix and index
/// must come from the same build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub corpus: PathBuf,
    pub vectors: PathBuf,
    pub index: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            corpus: dir.join("few_shot_corpus.jsonl"),
            vectors: dir.join("few_shot_vectors.bin"),
            index: dir.join("few_shot_index.redb"),
        }
    }

    /// Paths of artifacts that do not exist yet.
    pub fn missing(&self) -> Vec<&Path> {
        [&self.corpus, &self.vectors, &self.index]
            .into_iter()
            .filter(|p| !p.exists())
            .map(PathBuf::as_path)
            .collect()
    }
}
