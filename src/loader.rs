//! Plain-text extraction from uploaded files.
//!
//! Dispatches on the file extension:
//!
//! | Extension | Units produced |
//! |-----------|----------------|
//! | `.pdf` | one per page, with a 1-based page number |
//! | `.docx` | one for the whole document |
//! | `.txt` | one for the whole file (UTF-8) |
//! | anything else | none; [`LoadOutcome::Unsupported`] |
//!
//! An unsupported extension is a normal outcome, not an error. Missing or
//! unreadable files and corrupt content fail with [`LoadError`].

use std::io::{ErrorKind, Read};
use std::path::Path;

use docqa_core::models::TextUnit;

use crate::error::LoadError;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Result of loading one file.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Units(Vec<TextUnit>),
    /// The extension (lowercased, without the dot) is not handled.
    Unsupported(String),
}

/// Lowercased extension of `path` without the leading dot, or `""`.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Load `path`, dispatching on `extension` (case-insensitive, dot optional).
pub fn load(path: &Path, extension: &str) -> Result<LoadOutcome, LoadError> {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    let units = match ext.as_str() {
        "pdf" => load_pdf(&read_bytes(path)?)?,
        "docx" => vec![TextUnit::new(extract_docx(&read_bytes(path)?)?)],
        "txt" => {
            let bytes = read_bytes(path)?;
            let text =
                String::from_utf8(bytes).map_err(|_| LoadError::Encoding(path.to_path_buf()))?;
            vec![TextUnit::new(text)]
        }
        _ => return Ok(LoadOutcome::Unsupported(ext)),
    };
    Ok(LoadOutcome::Units(units))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, LoadError> {
    std::fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => LoadError::Missing(path.to_path_buf()),
        _ => LoadError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })
}

fn load_pdf(bytes: &[u8]) -> Result<Vec<TextUnit>, LoadError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| LoadError::Pdf(e.to_string()))?;
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| TextUnit::with_page(text, i as u32 + 1))
        .collect())
}

fn extract_docx(bytes: &[u8]) -> Result<String, LoadError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| LoadError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| LoadError::Docx("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| LoadError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(LoadError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_paragraphs(&doc_xml)
}

/// Collect `<w:t>` runs, one line per `<w:p>` paragraph.
fn extract_paragraphs(xml: &[u8]) -> Result<String, LoadError> {
    use quick_xml::events::Event;

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| LoadError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Ok(Event::Eof) => break,
            Err(e) => return Err(LoadError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join("\n"))
}
