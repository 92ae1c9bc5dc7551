//! Plain-text extraction for ingested files.
//!
//! The format is chosen by filename extension. PDF goes through
//! `pdf-extract`, DOCX is read as a ZIP archive whose `word/document.xml`
//! text runs are concatenated paragraph by paragraph, CSV cells are joined
//! with spaces and rows with newlines, and TXT must be valid UTF-8.

use std::io::Read;

use askdb_core::models::DocumentFormat;
use quick_xml::events::Event;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("CSV extraction failed: {0}")]
    Csv(String),
    #[error("file is not valid UTF-8 text")]
    Encoding,
}

/// Detect the format of `filename` and extract its text from `bytes`.
pub fn extract(filename: &str, bytes: &[u8]) -> Result<(DocumentFormat, String), ExtractError> {
    let format = DocumentFormat::from_filename(filename)
        .ok_or_else(|| ExtractError::UnsupportedFormat(filename.to_string()))?;
    let text = extract_text(bytes, format)?;
    Ok((format, text))
}

pub fn extract_text(bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractError> {
    match format {
        DocumentFormat::Pdf => extract_pdf(bytes),
        DocumentFormat::Docx => extract_docx(bytes),
        DocumentFormat::Csv => extract_csv(bytes),
        DocumentFormat::Txt => extract_txt(bytes),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_txt(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ExtractError::Encoding)?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

fn extract_csv(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ExtractError::Csv(e.to_string()))?;
        let line = record
            .iter()
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !line.is_empty() {
            lines.push(line);
        }
    }
    Ok(lines.join("\n"))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;
    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    docx_paragraphs(&xml)
}

/// Text of every `w:t` run, one line per `w:p` paragraph.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(t)) if in_text => {
                current.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let line = current.trim();
                    if !line.is_empty() {
                        paragraphs.push(line.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }
    Ok(paragraphs.join("\n"))
}
