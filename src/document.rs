use std::path::Path;

use anyhow::{Context, Result};
use log::debug;
use mime_guess::from_path;

/// A single page of extracted document text.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPage {
    /// Zero-based page number.
    pub number: usize,
    /// Extracted text, whitespace-normalized.
    pub text: String,
}

/// Extract text from a PDF file, one entry per page.
/// Returns an error for files that are not PDFs.
pub fn load_pdf_pages<P: AsRef<Path>>(file_path: P) -> Result<Vec<DocumentPage>> {
    let path = file_path.as_ref();

    let mime_type = from_path(path).first_or_octet_stream().to_string();
    debug!("Detected MIME type: {}", mime_type);

    if !mime_type.starts_with("application/pdf") {
        return Err(anyhow::anyhow!(
            "Unsupported document format: {}. Only PDF files are supported.",
            mime_type
        ));
    }

    let pages = pdf_extract::extract_text_by_pages(path)
        .with_context(|| format!("Failed to extract text from PDF: {}", path.display()))?;

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(number, text)| DocumentPage {
            number,
            text: normalize_whitespace(&text),
        })
        .collect())
}

/// Collapse the whitespace runs PDF extraction leaves behind: spaces and
/// tabs within a line become one space, blank-line runs become one blank
/// line, and the result is trimmed.
pub fn normalize_whitespace(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();

    let mut result: Vec<&str> = Vec::new();
    let mut previous_empty = false;
    for line in &lines {
        let is_empty = line.is_empty();
        if is_empty && previous_empty {
            continue;
        }
        result.push(line);
        previous_empty = is_empty;
    }

    result.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        let text = "First   line\t with gaps\n\n\n\nSecond    paragraph\n";
        let normalized = normalize_whitespace(text);
        assert_eq!(normalized, "First line with gaps\n\nSecond paragraph");
    }

    #[test]
    fn test_normalize_whitespace_empty() {
        assert_eq!(normalize_whitespace("   \n \t \n"), "");
    }

    #[test]
    fn test_load_rejects_non_pdf() {
        let err = load_pdf_pages("notes.txt").unwrap_err();
        assert!(err.to_string().contains("Unsupported document format"));
    }

    #[test]
    fn test_load_missing_pdf_fails() {
        assert!(load_pdf_pages("/nonexistent/report.pdf").is_err());
    }
}
