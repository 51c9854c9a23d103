//! Prompt construction for the generation oracle.
//!
//! The first attempt describes the task and the document structure; every
//! retry additionally carries the previous candidate and the sandbox
//! diagnostics so the oracle can address the concrete failure.

use std::fmt::Write as _;

use parsergen_core::{StructuralSummary, Target};

/// Read-only context assembled once per run.
pub struct TaskBrief<'a> {
    pub target: &'a Target,
    pub summary: &'a StructuralSummary,
    pub expected_header: &'a [String],
}

pub fn initial_prompt(brief: &TaskBrief<'_>) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Write a Python function `parse(pdf_path: str)` that extracts every \
         transaction from a `{bank}` bank statement PDF and returns a pandas \
         DataFrame.",
        bank = brief.target.name
    );
    let _ = writeln!(prompt);
    let _ = writeln!(
        prompt,
        "The DataFrame columns must be exactly: {}.",
        brief.expected_header.join(", ")
    );
    let _ = writeln!(
        prompt,
        "Use pdfplumber for extraction. Return only the function's module \
         source; no explanations, no usage examples."
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Document structure ({} pages total):", brief.summary.total_pages);
    for info in &brief.summary.table_info {
        let _ = writeln!(prompt, "- {info}");
    }
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Text sample from the first pages:");
    let _ = writeln!(prompt, "{}", brief.summary.text_sample);

    prompt
}

pub fn refinement_prompt(
    brief: &TaskBrief<'_>,
    previous_source: &str,
    diagnostics: &str,
) -> String {
    let mut prompt = initial_prompt(brief);
    let _ = writeln!(prompt);
    let _ = writeln!(
        prompt,
        "Your previous attempt failed validation. Fix the specific problem \
         below and return the complete corrected module source."
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Previous attempt:");
    let _ = writeln!(prompt, "{previous_source}");
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Validation output:");
    let _ = writeln!(prompt, "{diagnostics}");

    prompt
}
