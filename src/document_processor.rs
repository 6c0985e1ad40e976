use anyhow::{anyhow, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Source formats a business requirements document can come in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Markdown,
    Csv,
    Pdf,
    Docx,
    Spreadsheet,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "txt" | "rst" => Some(DocumentFormat::Text),
            "md" | "markdown" => Some(DocumentFormat::Markdown),
            "csv" | "tsv" => Some(DocumentFormat::Csv),
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            "xlsx" | "xls" | "ods" => Some(DocumentFormat::Spreadsheet),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentFormat::Text => "text",
            DocumentFormat::Markdown => "markdown",
            DocumentFormat::Csv => "csv",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Spreadsheet => "spreadsheet",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub name: String,
    pub path: PathBuf,
    pub format: DocumentFormat,
    pub content: String,
}

#[derive(Debug, Default)]
pub struct DocumentProcessor;

impl DocumentProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn is_supported_format<P: AsRef<Path>>(&self, file_path: P) -> bool {
        DocumentFormat::from_path(file_path.as_ref()).is_some()
    }

    pub async fn extract<P: AsRef<Path>>(&self, file_path: P) -> Result<ExtractedDocument> {
        let path = file_path.as_ref();
        let format = DocumentFormat::from_path(path).ok_or_else(|| {
            anyhow!(
                "Unsupported document format: {} (expected txt, md, csv, pdf, docx, xlsx or xls)",
                path.display()
            )
        })?;

        let raw = match format {
            DocumentFormat::Text | DocumentFormat::Markdown | DocumentFormat::Csv => fs::read_to_string(path)
                .await
                .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?,
            DocumentFormat::Pdf => self.pdf_text(path).await?,
            DocumentFormat::Docx => self.docx_text(path).await?,
            DocumentFormat::Spreadsheet => self.spreadsheet_text(path)?,
        };

        let content = clean_extracted_text(&raw);
        if content.is_empty() {
            return Err(anyhow!("No text could be extracted from {}", path.display()));
        }
        debug!(path = %path.display(), %format, chars = content.len(), "document extracted");

        Ok(ExtractedDocument {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "document".to_string()),
            path: path.to_path_buf(),
            format,
            content,
        })
    }

    async fn pdf_text(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path)
            .await
            .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
        pdf_extract::extract_text_from_mem(&bytes).map_err(|e| anyhow!("Failed to extract PDF text: {}", e))
    }

    async fn docx_text(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path)
            .await
            .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
        let docx = docx_rs::read_docx(&bytes).map_err(|e| anyhow!("Failed to read DOCX file: {}", e))?;

        let mut text = String::new();
        for child in docx.document.children {
            if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
                for run in paragraph.children {
                    if let docx_rs::ParagraphChild::Run(run) = run {
                        for piece in run.children {
                            match piece {
                                docx_rs::RunChild::Text(t) => text.push_str(&t.text),
                                docx_rs::RunChild::Tab(_) => text.push('\t'),
                                _ => {}
                            }
                        }
                    }
                }
                text.push('\n');
            }
        }
        Ok(text)
    }

    fn spreadsheet_text(&self, path: &Path) -> Result<String> {
        use calamine::{open_workbook_auto, Reader};

        let mut workbook =
            open_workbook_auto(path).map_err(|e| anyhow!("Failed to open spreadsheet: {}", e))?;

        let mut text = String::new();
        for sheet_name in workbook.sheet_names() {
            let Ok(range) = workbook.worksheet_range(&sheet_name) else {
                continue;
            };
            text.push_str(&format!("=== {} ===\n", sheet_name));
            for row in range.rows() {
                let cells: Vec<String> = row
                    .iter()
                    .map(cell_text)
                    .filter(|cell| !cell.trim().is_empty())
                    .collect();
                if !cells.is_empty() {
                    text.push_str(&cells.join(" | "));
                    text.push('\n');
                }
            }
        }
        Ok(text)
    }
}

fn cell_text(cell: &calamine::Data) -> String {
    match cell {
        calamine::Data::String(s) => s.clone(),
        calamine::Data::Float(f) => f.to_string(),
        calamine::Data::Int(i) => i.to_string(),
        calamine::Data::Bool(b) => b.to_string(),
        calamine::Data::DateTime(dt) => format!("{:?}", dt),
        calamine::Data::DateTimeIso(dt) => dt.clone(),
        calamine::Data::DurationIso(d) => d.clone(),
        calamine::Data::Error(e) => format!("#{:?}", e),
        calamine::Data::Empty => String::new(),
    }
}

/// Trims lines and drops blank ones.
pub fn clean_extracted_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
