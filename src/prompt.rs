//! Prompt assembly for application letter generation.
//!
//! Retrieved examples are shown to the language model as few-shot
//! demonstrations, each paired with a fixed summary of the résumé the
//! reference letters were written for.

use std::path::Path;

use crate::{
    corpus::ExampleRecord,
    embedding::Embedder,
    error::{Error, Result},
    retriever::Retriever,
};

/// Separator between consecutive few-shot examples.
pub const EXAMPLE_SEPARATOR: &str = "\n\n---\n\n";

/// Final instruction appended to every generation prompt.
pub const INSTRUCTION: &str = "Using the candidate's experience summary, \
    the example responses and the vacancy text, write a personalized \
    response that is relevant to this vacancy and grounded in the \
    candidate's experience.";

/// Read the fixed résumé summary that accompanies every few-shot example.
pub fn load_static_summary(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::missing_path("static resume summary", path));
    }
    Ok(std::fs::read_to_string(path)?.trim().to_string())
}

/// Render examples as `Vacancy` / `Resume summary` / `Response` blocks.
///
/// # Examples
///
/// ```
/// use coverbert::{corpus::ExampleRecord, prompt::format_few_shot_examples};
///
/// let ex = ExampleRecord::new("Rust developer", "Dear team").unwrap();
/// let text = format_few_shot_examples(&[ex], "Ten years of systems work");
/// assert!(text.starts_with("Vacancy:\nRust developer\n\n"));
/// assert!(text.ends_with("Response:\nDear team"));
/// ```
pub fn format_few_shot_examples(
    examples: &[ExampleRecord],
    static_summary: &str,
) -> String {
    examples
        .iter()
        .map(|ex| {
            format!(
                "Vacancy:\n{}\n\nResume summary:\n{static_summary}\n\nResponse:\n{}",
                ex.vacancy(),
                ex.response()
            )
        })
        .collect::<Vec<_>>()
        .join(EXAMPLE_SEPARATOR)
}

/// Assemble the full generation prompt.
pub fn build_prompt(
    vacancy: &str,
    candidate_summary: &str,
    static_summary: &str,
    examples: &[ExampleRecord],
) -> String {
    format!(
        "New resume summary:\n{candidate_summary}\n\n\
         Example responses:\n{}\n\n\
         Input vacancy:\n{vacancy}\n\n\
         {INSTRUCTION}",
        format_few_shot_examples(examples, static_summary)
    )
}

/// Retrieve `k` examples for `vacancy` and assemble the prompt around them.
pub fn compose_with_retrieval<E: Embedder>(
    retriever: &Retriever<E>,
    vacancy: &str,
    candidate_summary: &str,
    static_summary: &str,
    k: usize,
) -> Result<String> {
    let examples = retriever.search_few_shot(vacancy, k)?;
    Ok(build_prompt(vacancy, candidate_summary, static_summary, &examples))
}

/// Request asking a language model to condense a résumé into a short
/// experience summary.
pub fn experience_summary_request(resume_text: &str) -> String {
    format!(
        "Here is the text of a resume:\n{resume_text}\n\n\
         Write a short summary of the candidate's experience in 4-5 sentences: \
         key skills, technologies, projects. \
         Leave out unnecessary details, only the essentials."
    )
}
