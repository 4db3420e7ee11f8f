//! DOCX text extraction
//!
//! A .docx file is a zip archive; the body text lives in
//! `word/document.xml` as `<w:t>` runs grouped into `<w:p>` paragraphs.

use crate::errors::IngestionError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const DOCUMENT_PART: &str = "word/document.xml";

/// Extract paragraph text from a .docx file
pub fn extract_text_from_docx(path: &Path) -> Result<String, IngestionError> {
    let parse_error = |message: String| IngestionError::DocxParseError {
        path: path.display().to_string(),
        message,
    };

    let file = File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| parse_error(format!("not a zip archive: {}", e)))?;
    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| parse_error(format!("missing {}: {}", DOCUMENT_PART, e)))?;

    let mut xml = String::new();
    part.read_to_string(&mut xml)?;

    document_xml_to_text(&xml).map_err(parse_error)
}

/// Flatten WordprocessingML body XML to plain text, one line per paragraph
pub(crate) fn document_xml_to_text(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_run_text = true,
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_run_text = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" | b"cr" => text.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_run_text => text.push_str(&String::from_utf8_lossy(&t)),
            Event::GeneralRef(r) if in_run_text => {
                if let Some(c) = resolve_reference(&r) {
                    text.push(c);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(text.trim_end().to_string())
}

fn resolve_reference(name: &[u8]) -> Option<char> {
    match name {
        b"amp" => Some('&'),
        b"lt" => Some('<'),
        b"gt" => Some('>'),
        b"quot" => Some('"'),
        b"apos" => Some('\''),
        [b'#', b'x' | b'X', hex @ ..] => std::str::from_utf8(hex)
            .ok()
            .and_then(|h| u32::from_str_radix(h, 16).ok())
            .and_then(char::from_u32),
        [b'#', dec @ ..] => std::str::from_utf8(dec)
            .ok()
            .and_then(|d| d.parse::<u32>().ok())
            .and_then(char::from_u32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Phase one</w:t></w:r><w:r><w:t xml:space="preserve"> ends in May.</w:t></w:r></w:p>
    <w:p><w:r><w:t>R&amp;D</w:t><w:tab/><w:t>approved</w:t></w:r></w:p>
    <w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr></w:p>
  </w:body>
</w:document>"#;

    #[test]
    fn test_paragraphs_and_runs() {
        let text = document_xml_to_text(BODY).unwrap();
        assert_eq!(text, "Phase one ends in May.\nR&D\tapproved");
    }

    #[test]
    fn test_numeric_references() {
        assert_eq!(resolve_reference(b"#8217"), Some('\u{2019}'));
        assert_eq!(resolve_reference(b"#x41"), Some('A'));
        assert_eq!(resolve_reference(b"nbsp"), None);
    }

    #[test]
    fn test_extract_from_archive() {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file(DOCUMENT_PART, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(BODY.as_bytes()).unwrap();
            writer.finish().unwrap();
        }

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(buffer.get_ref()).unwrap();

        let text = extract_text_from_docx(file.path()).unwrap();
        assert!(text.starts_with("Phase one ends in May."));
    }

    #[test]
    fn test_plain_bytes_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"plain text pretending to be docx").unwrap();

        let err = extract_text_from_docx(file.path()).unwrap_err();
        assert!(matches!(err, IngestionError::DocxParseError { .. }));
    }
}
