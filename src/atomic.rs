use std::{
    io::{BufWriter, Write},
    path::Path,
};

use tempfile::NamedTempFile;

use crate::error::Result;

/// Write a file by streaming into a sibling temp file and renaming it over
/// `path` once `write` has succeeded.
///
/// Parent directories are created as needed. On failure the temp file is
/// removed; a failed removal is logged rather than masking the original
/// error.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let tmp = NamedTempFile::new_in(dir)?;
    let written = {
        let mut writer = BufWriter::new(tmp.as_file());
        write(&mut writer).and_then(|()| writer.flush().map_err(Into::into))
    }
    .and_then(|()| tmp.as_file().sync_all().map_err(Into::into));

    match written {
        Ok(()) => {
            tmp.persist(path)?;
            tracing::debug!(path = %path.display(), "artifact written");
            Ok(())
        }
        Err(err) => {
            let tmp_path = tmp.path().to_path_buf();
            if let Err(close_err) = tmp.close() {
                tracing::warn!(
                    path = %tmp_path.display(),
                    error = %close_err,
                    "failed to remove temporary file"
                );
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a").join("b").join("out.txt");

        write_atomically(&path, |w| {
            w.write_all(b"hello")?;
            Ok(())
        })
        .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn failed_write_leaves_previous_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.txt");
        std::fs::write(&path, "old").unwrap();

        let result = write_atomically(&path, |w| {
            w.write_all(b"partial")?;
            Err(Error::Embedding("boom".into()))
        });

        assert!(matches!(result, Err(Error::Embedding(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old");
        let leftovers = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
