//! Loading and cleaning of the few-shot example corpus.
//!
//! The raw corpus is a JSON-lines file of arbitrary objects. Loading is
//! resilient: blank and unparsable lines are skipped, and records that do
//! not carry a usable `vacancy`/`response` pair are dropped during
//! preparation. The clean corpus written by [`save_corpus`] is the
//! authority for record order at query time.

use std::{io::Write, path::Path};

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;

use crate::{
    atomic::write_atomically,
    error::{Error, Result},
    record_id::RecordId,
};

/// One (vacancy, response) few-shot example.
///
/// Both fields are whitespace-normalized and non-empty; the only way to
/// obtain a record is through [`ExampleRecord::new`], which enforces this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleRecord {
    id: RecordId,
    vacancy: String,
    response: String,
}

#[derive(Serialize)]
struct RecordLine<'a> {
    vacancy: &'a str,
    response: &'a str,
}

impl ExampleRecord {
    /// Normalize both fields and build a record, or `None` if either field
    /// is empty after normalization.
    pub fn new(vacancy: &str, response: &str) -> Option<Self> {
        let vacancy = normalize_whitespace(vacancy);
        let response = normalize_whitespace(response);
        if vacancy.is_empty() || response.is_empty() {
            return None;
        }
        Some(Self::from_normalized(vacancy, response))
    }

    /// Both fields must already be normalized and non-empty.
    fn from_normalized(vacancy: String, response: String) -> Self {
        Self {
            id: RecordId::new(&vacancy, &response),
            vacancy,
            response,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn vacancy(&self) -> &str {
        &self.vacancy
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    /// The record as a JSON object with `vacancy` and `response` keys.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "vacancy": self.vacancy,
            "response": self.response,
        })
    }
}

/// Why a raw record was dropped. Never surfaced as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedRecord {
    NotAnObject,
    MissingField(&'static str),
    NotAString(&'static str),
    Empty(&'static str),
}

impl std::fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "record is not an object"),
            Self::MissingField(name) => write!(f, "missing field '{name}'"),
            Self::NotAString(name) => {
                write!(f, "field '{name}' is not a string")
            }
            Self::Empty(name) => {
                write!(f, "field '{name}' is empty after normalization")
            }
        }
    }
}

/// Collapse every run of whitespace into a single space and trim both ends.
///
/// # Examples
///
/// ```
/// use coverbert::corpus::normalize_whitespace;
///
/// assert_eq!(
///     normalize_whitespace("  Backend\n\tPython   role "),
///     "Backend Python role"
/// );
/// ```
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Validate a single raw record.
pub fn validate_record(
    raw: &Value,
) -> std::result::Result<ExampleRecord, MalformedRecord> {
    let object = raw.as_object().ok_or(MalformedRecord::NotAnObject)?;

    type FieldResult = std::result::Result<String, MalformedRecord>;
    let field = |name: &'static str| -> FieldResult {
        let value =
            object.get(name).ok_or(MalformedRecord::MissingField(name))?;
        let text = value.as_str().ok_or(MalformedRecord::NotAString(name))?;
        let normalized = normalize_whitespace(text);
        if normalized.is_empty() {
            return Err(MalformedRecord::Empty(name));
        }
        Ok(normalized)
    };

    let vacancy = field("vacancy")?;
    let response = field("response")?;
    Ok(ExampleRecord::from_normalized(vacancy, response))
}

/// Read a JSON-lines file into raw, unvalidated values.
///
/// Blank lines and lines that are not valid JSON are skipped. Fails with
/// [`Error::NotFound`] if the file does not exist.
pub fn load_raw(path: &Path) -> Result<Vec<Value>> {
    if !path.exists() {
        return Err(Error::missing_path("raw corpus", path));
    }

    let bytes = std::fs::read(path)?;
    let lines: Vec<&[u8]> = bytes.split(|&b| b == b'\n').collect();

    let records: Vec<Value> = lines
        .par_iter()
        .filter_map(|line| {
            let line = line.trim_ascii();
            if line.is_empty() {
                return None;
            }
            serde_json::from_slice(line).ok()
        })
        .collect();

    tracing::debug!(
        path = %path.display(),
        parsed = records.len(),
        "loaded raw corpus"
    );
    Ok(records)
}

/// The clean corpus together with the raw positions it was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedCorpus {
    pub records: Vec<ExampleRecord>,
    /// Index into the raw input of every kept record, in corpus order.
    pub kept_indices: Vec<usize>,
}

/// Validate and normalize raw records, dropping the malformed ones.
///
/// Order is preserved. This never fails.
pub fn prepare_corpus(raw: &[Value]) -> PreparedCorpus {
    let mut prepared = PreparedCorpus::default();

    for (i, value) in raw.iter().enumerate() {
        match validate_record(value) {
            Ok(record) => {
                prepared.records.push(record);
                prepared.kept_indices.push(i);
            }
            Err(reason) => {
                tracing::debug!(index = i, %reason, "dropping raw record");
            }
        }
    }

    prepared
}

/// Write the corpus as JSON lines, replacing `path` atomically.
pub fn save_corpus(corpus: &[ExampleRecord], path: &Path) -> Result<()> {
    write_atomically(path, |w| {
        for record in corpus {
            let line = RecordLine {
                vacancy: &record.vacancy,
                response: &record.response,
            };
            serde_json::to_writer(&mut *w, &line)?;
            w.write_all(b"\n")?;
        }
        Ok(())
    })
}

/// Load a clean corpus previously written by [`save_corpus`].
///
/// Unlike [`load_raw`], every non-blank line must hold a valid record: a
/// damaged clean corpus would silently shift record positions, so it is
/// reported as [`Error::IndexInconsistent`].
pub fn load_clean_corpus(path: &Path) -> Result<Vec<ExampleRecord>> {
    if !path.exists() {
        return Err(Error::missing_path("clean corpus", path));
    }

    let content = std::fs::read_to_string(path)?;
    let mut corpus = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|e| {
            Error::IndexInconsistent(format!(
                "clean corpus line {} is not valid JSON: {e}",
                line_no + 1
            ))
        })?;
        let record = validate_record(&value).map_err(|reason| {
            Error::IndexInconsistent(format!(
                "clean corpus line {} is malformed: {reason}",
                line_no + 1
            ))
        })?;
        corpus.push(record);
    }
    Ok(corpus)
}

/// Counts reported by [`build_clean_corpus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    /// Raw records that parsed as JSON.
    pub total: usize,
    pub kept: usize,
    pub dropped: usize,
}

impl CorpusStats {
    /// Counts for `kept` valid records out of `total` raw ones.
    pub fn new(total: usize, kept: usize) -> Self {
        Self {
            total,
            kept,
            dropped: total.saturating_sub(kept),
        }
    }
}

/// Load, prepare and save the clean corpus in one step.
pub fn build_clean_corpus(
    src_path: &Path,
    out_path: &Path,
) -> Result<CorpusStats> {
    let raw = load_raw(src_path)?;
    let prepared = prepare_corpus(&raw);
    save_corpus(&prepared.records, out_path)?;

    let stats = CorpusStats::new(raw.len(), prepared.records.len());
    tracing::info!(
        total = stats.total,
        kept = stats.kept,
        dropped = stats.dropped,
        "clean corpus written"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    const SCENARIO: &str = concat!(
        r#"{"vacancy":"Backend Python role","response":"Dear hiring..."}"#,
        "\n",
        r#"{"vacancy":"","response":"x"}"#,
        "\n",
        "not-json-line\n",
        r#"{"vacancy":"Frontend React role","response":"Hello..."}"#,
        "\n",
    );

    fn write_raw(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("raw.jsonl");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn normalize_collapses_and_trims() {
        assert_eq!(normalize_whitespace("\t a \n\n b  c \r\n"), "a b c");
        assert_eq!(normalize_whitespace("   "), "");
    }

    #[test]
    fn load_raw_missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_raw(&tmp.path().join("missing.jsonl")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn load_raw_skips_blank_and_broken_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let content = format!("\n  \n{SCENARIO}{{broken\n");
        let path = write_raw(tmp.path(), &content);
        let raw = load_raw(&path).unwrap();
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[0]["vacancy"], "Backend Python role");
        assert_eq!(raw[2]["vacancy"], "Frontend React role");
    }

    #[test]
    fn load_raw_keeps_non_object_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_raw(tmp.path(), "[1,2]\n\"text\"\n42\n");
        assert_eq!(load_raw(&path).unwrap().len(), 3);
    }

    #[test]
    fn validate_rejects_each_malformed_shape() {
        assert_eq!(
            validate_record(&json!(["a"])),
            Err(MalformedRecord::NotAnObject)
        );
        assert_eq!(
            validate_record(&json!({"response": "x"})),
            Err(MalformedRecord::MissingField("vacancy"))
        );
        assert_eq!(
            validate_record(&json!({"vacancy": "x"})),
            Err(MalformedRecord::MissingField("response"))
        );
        assert_eq!(
            validate_record(&json!({"vacancy": 3, "response": "x"})),
            Err(MalformedRecord::NotAString("vacancy"))
        );
        assert_eq!(
            validate_record(&json!({"vacancy": "x", "response": null})),
            Err(MalformedRecord::NotAString("response"))
        );
        assert_eq!(
            validate_record(&json!({"vacancy": " \n ", "response": "x"})),
            Err(MalformedRecord::Empty("vacancy"))
        );
        assert_eq!(
            validate_record(&json!({"vacancy": "x", "response": "\t"})),
            Err(MalformedRecord::Empty("response"))
        );
    }

    #[test]
    fn validate_builds_normalized_record() {
        let record =
            validate_record(&json!({"vacancy": " Go  dev", "response": "Hi "}))
                .unwrap();
        assert_eq!(Some(record), ExampleRecord::new("Go dev", "Hi"));
    }

    #[test]
    fn stats_derive_dropped_count() {
        assert_eq!(
            CorpusStats::new(5, 3),
            CorpusStats {
                total: 5,
                kept: 3,
                dropped: 2
            }
        );
    }

    #[test]
    fn prepare_normalizes_and_tracks_kept_indices() {
        let raw = vec![
            json!({
                "vacancy": "  Rust\n dev ",
                "response": "Hi\tthere",
                "extra": 1
            }),
            json!({"vacancy": "", "response": "x"}),
            json!("not an object"),
            json!({"vacancy": "Go dev", "response": "Hello"}),
        ];
        let prepared = prepare_corpus(&raw);

        assert_eq!(prepared.kept_indices, vec![0, 3]);
        assert_eq!(prepared.records[0].vacancy(), "Rust dev");
        assert_eq!(prepared.records[0].response(), "Hi there");
        assert_eq!(prepared.records[1].vacancy(), "Go dev");
    }

    #[test]
    fn build_clean_corpus_scenario_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let src = write_raw(tmp.path(), SCENARIO);
        let out = tmp.path().join("emb").join("corpus.jsonl");

        let stats = build_clean_corpus(&src, &out).unwrap();
        assert_eq!(
            stats,
            CorpusStats {
                total: 3,
                kept: 2,
                dropped: 1
            }
        );

        let corpus = load_clean_corpus(&out).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus[0].vacancy(), "Backend Python role");
        assert_eq!(corpus[1].vacancy(), "Frontend React role");
    }

    #[test]
    fn save_keeps_non_ascii_unescaped() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("corpus.jsonl");
        let record =
            ExampleRecord::new("Разработчик Rust", "Здравствуйте").unwrap();

        save_corpus(&[record], &out).unwrap();
        let content = std::fs::read_to_string(&out).unwrap();
        assert!(content.contains("Разработчик Rust"));
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn load_clean_corpus_rejects_damaged_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("corpus.jsonl");
        std::fs::write(
            &out,
            "{\"vacancy\":\"a\",\"response\":\"b\"}\ngarbage\n",
        )
        .unwrap();

        let err = load_clean_corpus(&out).unwrap_err();
        assert!(matches!(err, Error::IndexInconsistent(_)));
    }

    fn raw_value() -> impl Strategy<Value = Value> {
        let text = prop_oneof![
            Just(String::new()),
            Just("   ".to_string()),
            "[a-z \\t\\n]{0,12}",
        ]
        .boxed();
        let field = prop_oneof![
            text.clone().prop_map(Value::String),
            any::<i64>().prop_map(Value::from),
            Just(Value::Null),
        ]
        .boxed();
        prop_oneof![
            (field.clone(), field.clone())
                .prop_map(|(v, r)| json!({"vacancy": v, "response": r})),
            field.clone().prop_map(|v| json!({"vacancy": v})),
            field.prop_map(|r| json!({"response": r})),
            text.prop_map(Value::String),
        ]
    }

    proptest! {
        #[test]
        fn kept_plus_dropped_is_total(
            raw in prop::collection::vec(raw_value(), 0..40),
        ) {
            let prepared = prepare_corpus(&raw);
            let dropped = raw.len() - prepared.records.len();
            prop_assert_eq!(prepared.records.len() + dropped, raw.len());
            prop_assert_eq!(
                prepared.kept_indices.len(),
                prepared.records.len()
            );
            for record in &prepared.records {
                prop_assert!(!record.vacancy().is_empty());
                prop_assert!(!record.response().is_empty());
            }
        }

        #[test]
        fn prepare_is_idempotent(
            raw in prop::collection::vec(raw_value(), 0..40),
        ) {
            let once = prepare_corpus(&raw).records;
            let as_json: Vec<Value> =
                once.iter().map(ExampleRecord::to_json).collect();
            let twice = prepare_corpus(&as_json).records;
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn save_then_reload_roundtrips(
            raw in prop::collection::vec(raw_value(), 0..20),
        ) {
            let tmp = tempfile::tempdir().unwrap();
            let out = tmp.path().join("corpus.jsonl");
            let corpus = prepare_corpus(&raw).records;

            save_corpus(&corpus, &out).unwrap();
            let reloaded = prepare_corpus(&load_raw(&out).unwrap()).records;
            prop_assert_eq!(corpus, reloaded);
        }
    }
}
