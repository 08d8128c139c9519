//! XML parser with encoding auto-detection.
//!
//! Converts raw document bytes into a [`Document`]. Valid UTF-8 is used as
//! is; anything else is decoded using the encoding named in the XML
//! declaration, falling back to statistical detection.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;

use crate::document::{Attribute, Document, DocumentBuilder};
use crate::error::{DocumentError, DocumentResult};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Read the `encoding="..."` pseudo-attribute of the XML declaration, if any.
pub fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(256)];
    let head = String::from_utf8_lossy(head);
    let decl_end = head.find("?>")?;
    let decl = &head[..decl_end];
    if !decl.trim_start().starts_with("<?xml") {
        return None;
    }
    let idx = decl.find("encoding")?;
    let rest = decl[idx + "encoding".len()..].trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let value = &rest[1..];
    let end = value.find(quote)?;
    Some(value[..end].to_string())
}

/// Decode bytes to string using the specified encoding label
pub fn decode_content(bytes: &[u8], encoding: &str) -> DocumentResult<String> {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8(bytes.to_vec())
            .map_err(|e| DocumentError::Encoding(e.to_string())),
        "iso-8859-1" | "latin-1" | "latin1" => {
            Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned())
        }
        label => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(enc) => {
                let (text, _, had_errors) = enc.decode(bytes);
                if had_errors {
                    Err(DocumentError::Encoding(format!(
                        "content is not valid {}",
                        enc.name()
                    )))
                } else {
                    Ok(text.into_owned())
                }
            }
            None => Err(DocumentError::Encoding(format!(
                "unsupported encoding '{}'",
                encoding
            ))),
        },
    }
}

/// Decode raw document bytes, returning the text and the encoding used.
pub fn decode_bytes(bytes: &[u8]) -> DocumentResult<(String, String)> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok((text.to_string(), "utf-8".to_string()));
    }

    let encoding = declared_encoding(bytes).unwrap_or_else(|| detect_encoding(bytes));
    let text = decode_content(bytes, &encoding)?;
    Ok((text, encoding))
}

/// Parse raw document bytes.
pub fn parse_bytes(bytes: &[u8]) -> DocumentResult<Document> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(DocumentError::Empty);
    }
    let (text, _) = decode_bytes(bytes)?;
    parse_str(&text)
}

/// Parse an XML file from disk.
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Document, crate::error::RunError> {
    let bytes = std::fs::read(path.as_ref())?;
    Ok(parse_bytes(&bytes)?)
}

fn malformed(reader: &Reader<&[u8]>, message: impl Into<String>) -> DocumentError {
    DocumentError::Malformed {
        position: reader.buffer_position() as u64,
        message: message.into(),
    }
}

fn read_element(
    reader: &Reader<&[u8]>,
    start: &BytesStart<'_>,
) -> DocumentResult<(String, Vec<Attribute>)> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| malformed(reader, format!("element name is not UTF-8: {}", e)))?
        .to_string();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(reader, format!("bad attribute on <{}>: {}", name, e)))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| malformed(reader, format!("attribute name is not UTF-8: {}", e)))?
            .to_string();
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(reader, format!("bad value for attribute '{}': {}", key, e)))?
            .into_owned();
        attributes.push(Attribute { name: key, value });
    }
    Ok((name, attributes))
}

/// Parse an XML string into a [`Document`].
///
/// Namespace declarations are not kept as attributes; element and attribute
/// names keep their prefixes.
pub fn parse_str(xml: &str) -> DocumentResult<Document> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut builder = DocumentBuilder::new();
    let mut seen_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed(&reader, e.to_string()))?;

        match event {
            Event::Start(e) => {
                if builder.depth() == 0 {
                    if seen_root {
                        return Err(malformed(&reader, "multiple root elements"));
                    }
                    seen_root = true;
                }
                let (name, attributes) = read_element(&reader, &e)?;
                builder.open_element(name, attributes);
            }
            Event::Empty(e) => {
                if builder.depth() == 0 {
                    if seen_root {
                        return Err(malformed(&reader, "multiple root elements"));
                    }
                    seen_root = true;
                }
                let (name, attributes) = read_element(&reader, &e)?;
                builder.open_element(name, attributes);
                builder.close_element();
            }
            Event::End(_) => {
                if builder.depth() == 0 {
                    return Err(malformed(&reader, "unexpected closing tag"));
                }
                builder.close_element();
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|err| malformed(&reader, err.to_string()))?;
                if builder.depth() == 0 {
                    if !text.trim().is_empty() {
                        return Err(malformed(&reader, "text outside of the root element"));
                    }
                    continue;
                }
                builder.text(&text);
            }
            Event::CData(e) => {
                if builder.depth() == 0 {
                    return Err(malformed(&reader, "CDATA outside of the root element"));
                }
                builder.text(&String::from_utf8_lossy(&e));
            }
            Event::Comment(e) => {
                builder.comment(&String::from_utf8_lossy(&e));
            }
            Event::Eof => break,
            // Declarations, doctypes and processing instructions carry no row data
            _ => {}
        }
    }

    if let Some(open) = builder.open_element_name() {
        return Err(DocumentError::Unclosed(open.to_string()));
    }
    if !seen_root {
        return Err(DocumentError::NoRoot);
    }
    Ok(builder.finish())
}
