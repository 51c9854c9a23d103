//! Document structure inspection.
//!
//! Produces the one-shot [`StructuralSummary`] the oracle sees as context.
//! Only a bounded prefix of pages is sampled; the excerpt exists to keep
//! the prompt relevant, not to be exhaustive.

use std::path::Path;

use lopdf::Document;
use tracing::debug;

use parsergen_core::{AgentError, StructuralSummary, Target};

/// Pages sampled from the front of the document.
const SAMPLE_PAGES: usize = 3;

/// Lines a whitespace-aligned block needs before it counts as a table.
const MIN_TABLE_ROWS: usize = 3;

pub trait StructureAnalyzer: Send + Sync {
    fn analyze(&self, target: &Target) -> Result<StructuralSummary, AgentError>;
}

/// lopdf-backed analyzer for real statement PDFs.
#[derive(Clone, Copy, Debug, Default)]
pub struct PdfStructureAnalyzer;

impl StructureAnalyzer for PdfStructureAnalyzer {
    fn analyze(&self, target: &Target) -> Result<StructuralSummary, AgentError> {
        let pdf_path = &target.sample_pdf;
        if !pdf_path.exists() {
            return Err(AgentError::DocumentNotFound(pdf_path.clone()));
        }

        let document = Document::load(pdf_path)
            .map_err(|err| AgentError::Analysis(format!("could not decode PDF: {err}")))?;

        let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
        let total_pages = page_numbers.len();

        let mut text_sample = String::new();
        let mut table_info = Vec::new();
        for (index, page_number) in page_numbers.iter().take(SAMPLE_PAGES).enumerate() {
            let text = document.extract_text(&[*page_number]).map_err(|err| {
                AgentError::Analysis(format!("could not extract text from page {}: {err}", index + 1))
            })?;

            table_info.push(format!("Page {} tables: {}", index + 1, estimate_table_count(&text)));
            if !text_sample.is_empty() {
                text_sample.push('\n');
            }
            text_sample.push_str(text.trim_end());
        }

        debug!(
            event_name = "agent.analyzer.summary",
            target = %target.name,
            total_pages,
            sampled_pages = table_info.len(),
            "document structure sampled"
        );

        Ok(StructuralSummary { text_sample, table_info, total_pages })
    }
}

/// Rough tabular-region count: maximal runs of consecutive multi-column
/// lines. Statement tables render as aligned columns in extracted text, so
/// this is enough signal for the prompt without a layout engine.
fn estimate_table_count(text: &str) -> usize {
    let mut tables = 0;
    let mut run = 0;

    for line in text.lines() {
        if line.split_whitespace().count() >= 3 {
            run += 1;
        } else {
            if run >= MIN_TABLE_ROWS {
                tables += 1;
            }
            run = 0;
        }
    }
    if run >= MIN_TABLE_ROWS {
        tables += 1;
    }

    tables
}

/// Read the ground-truth CSV's header row so the prompt can name the exact
/// column set the candidate must reproduce.
pub fn read_expected_header(csv_path: &Path) -> Result<Vec<String>, AgentError> {
    if !csv_path.exists() {
        return Err(AgentError::DocumentNotFound(csv_path.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .map_err(|err| AgentError::Analysis(format!("could not open expected CSV: {err}")))?;
    let header = reader
        .headers()
        .map_err(|err| AgentError::Analysis(format!("could not read expected CSV header: {err}")))?;

    Ok(header.iter().map(str::to_string).collect())
}
