//! Text extraction — turning origin files into plain text.
//!
//! Each [`TextExtractor`] claims a set of MIME types. The registry asks
//! extractors in registration order and the first one that supports the
//! file wins. Files nobody claims are reported as unsupported so the
//! cache can skip them.

use std::io::{Cursor, Read};

use agentgate_core::OriginFile;
use agentgate_core::error::KnowledgeError;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Converts a raw origin file into text.
pub trait TextExtractor: Send + Sync {
    /// Extractor name, used in logs.
    fn name(&self) -> &str;

    /// Whether this extractor handles the given MIME type.
    fn supports(&self, mime_type: &str) -> bool;

    /// Extract the text content of a file.
    fn extract(&self, file: &OriginFile) -> Result<String, KnowledgeError>;
}

/// Plain text, markdown, JSON and rich documents exported as text.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "plain_text"
    }

    fn supports(&self, mime_type: &str) -> bool {
        matches!(
            mime_type,
            "text/plain"
                | "text/markdown"
                | "text/x-markdown"
                | "application/json"
                | "application/vnd.google-apps.document"
        )
    }

    fn extract(&self, file: &OriginFile) -> Result<String, KnowledgeError> {
        Ok(String::from_utf8_lossy(&file.content).into_owned())
    }
}

/// HTML with tags, scripts and styles stripped.
pub struct HtmlExtractor;

impl TextExtractor for HtmlExtractor {
    fn name(&self) -> &str {
        "html"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type == "text/html"
    }

    fn extract(&self, file: &OriginFile) -> Result<String, KnowledgeError> {
        Ok(strip_html(&String::from_utf8_lossy(&file.content)))
    }
}

/// CSV / TSV exports, one ` | `-joined line per row.
pub struct TabularExtractor;

impl TextExtractor for TabularExtractor {
    fn name(&self) -> &str {
        "tabular"
    }

    fn supports(&self, mime_type: &str) -> bool {
        matches!(
            mime_type,
            "text/csv" | "text/tab-separated-values" | "application/vnd.google-apps.spreadsheet"
        )
    }

    fn extract(&self, file: &OriginFile) -> Result<String, KnowledgeError> {
        let text = String::from_utf8_lossy(&file.content);
        let delimiter = if file.mime_type == "text/tab-separated-values" {
            '\t'
        } else {
            ','
        };

        let rows: Vec<String> = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                split_row(line, delimiter)
                    .iter()
                    .map(|cell| cell.trim())
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .collect();

        Ok(rows.join("\n"))
    }
}

/// PDF text via `lopdf`, pages in order.
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn name(&self) -> &str {
        "pdf"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type == "application/pdf"
    }

    fn extract(&self, file: &OriginFile) -> Result<String, KnowledgeError> {
        let document = lopdf::Document::load_mem(&file.content)
            .map_err(|e| extraction_failed(file, e))?;
        let pages: Vec<u32> = document.get_pages().keys().copied().collect();
        let text = document
            .extract_text(&pages)
            .map_err(|e| extraction_failed(file, e))?;
        Ok(collapse_blank_lines(&text))
    }
}

/// Word documents: the paragraphs of `word/document.xml`, one per line.
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn name(&self) -> &str {
        "docx"
    }

    fn supports(&self, mime_type: &str) -> bool {
        mime_type == DOCX_MIME
    }

    fn extract(&self, file: &OriginFile) -> Result<String, KnowledgeError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(file.content.as_slice()))
            .map_err(|e| extraction_failed(file, e))?;
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|e| extraction_failed(file, e))?
            .read_to_string(&mut xml)
            .map_err(|e| extraction_failed(file, e))?;
        Ok(docx_paragraphs(&xml))
    }
}

/// Ordered set of extractors.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// An empty registry. Every file is unsupported.
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Register an extractor. Earlier registrations take precedence.
    pub fn register(&mut self, extractor: Box<dyn TextExtractor>) {
        self.extractors.push(extractor);
    }

    /// Extract text from a file, or `UnsupportedFormat` if no extractor claims it.
    pub fn extract(&self, file: &OriginFile) -> Result<String, KnowledgeError> {
        let extractor = self
            .extractors
            .iter()
            .find(|e| e.supports(&file.mime_type))
            .ok_or_else(|| KnowledgeError::UnsupportedFormat {
                filename: file.filename.clone(),
                mime_type: file.mime_type.clone(),
            })?;

        tracing::trace!(
            filename = %file.filename,
            extractor = extractor.name(),
            "Extracting text"
        );
        extractor.extract(file)
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl Default for ExtractorRegistry {
    /// Plain text, HTML, tabular, PDF and Word extractors. Images and
    /// legacy binary office formats need a custom extractor.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(PlainTextExtractor));
        registry.register(Box::new(HtmlExtractor));
        registry.register(Box::new(TabularExtractor));
        registry.register(Box::new(PdfExtractor));
        registry.register(Box::new(DocxExtractor));
        registry
    }
}

/// Guess a MIME type from a file extension.
pub fn mime_from_filename(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "text" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "pdf" => "application/pdf",
        "docx" => DOCX_MIME,
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "doc" => "application/msword",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Split one delimited row, honouring double-quoted cells.
fn split_row(line: &str, delimiter: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => cells.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    cells.push(current);
    cells
}

fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let lower = after.get(..7).unwrap_or(after).to_ascii_lowercase();

        // Drop script/style bodies entirely.
        let skip_until = if lower.starts_with("<script") {
            Some("</script>")
        } else if lower.starts_with("<style") {
            Some("</style>")
        } else {
            None
        };

        rest = match skip_until {
            Some(close) => match after.to_ascii_lowercase().find(close) {
                Some(end) => &after[end + close.len()..],
                None => "",
            },
            None => match after.find('>') {
                Some(end) => {
                    out.push(' ');
                    &after[end + 1..]
                }
                None => "",
            },
        };
    }
    out.push_str(rest);

    collapse_blank_lines(&decode_entities(&out))
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Collapse runs of whitespace within lines and drop empty lines.
fn collapse_blank_lines(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text runs (`<w:t>`) of each `<w:p>` paragraph.
fn docx_paragraphs(xml: &str) -> String {
    let mut lines = Vec::new();

    for paragraph in xml.split("</w:p>") {
        let mut line = String::new();
        let mut rest = paragraph;

        while let Some(start) = rest.find("<w:t") {
            let after = &rest[start..];
            let Some(close) = after.find('>') else {
                break;
            };
            let tag = &after[..close];
            rest = &after[close + 1..];
            // `<w:tab/>`, `<w:tbl>` and self-closing `<w:t/>` carry no text.
            if (tag != "<w:t" && !tag.starts_with("<w:t ")) || tag.ends_with('/') {
                continue;
            }
            let end = rest.find("</w:t>").unwrap_or(rest.len());
            line.push_str(&rest[..end]);
            rest = &rest[end..];
        }

        lines.push(decode_entities(&line));
    }

    collapse_blank_lines(&lines.join("\n"))
}

fn extraction_failed(file: &OriginFile, error: impl std::fmt::Display) -> KnowledgeError {
    KnowledgeError::ExtractionFailed {
        filename: file.filename.clone(),
        reason: error.to_string(),
    }
}
