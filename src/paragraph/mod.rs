// src/paragraph/mod.rs

//! Ordered field/value paragraphs
//!
//! The universal on-disk record format: `Field: value` lines, continuation
//! lines prefixed by whitespace, paragraphs separated by a blank line.
//! Parsing is tolerant of trailing whitespace but rejects duplicate fields;
//! serialisation preserves field insertion order, so a well-formed file
//! round-trips byte-identically modulo the final newline.

use crate::error::{Error, Result};
use crate::filesystem::Filesystem;
use std::fmt;
use std::path::Path;

/// One paragraph: an ordered list of `(field, value)` pairs.
///
/// Multi-line values keep their continuation lines embedded in the value,
/// newline-separated, with the original leading whitespace intact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
    fields: Vec<(String, String)>,
}

impl Paragraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. Insertion order is what serialisation emits.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.fields {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Paragraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

/// Parse a whole file into its sequence of paragraphs.
pub fn parse_paragraphs(text: &str) -> std::result::Result<Vec<Paragraph>, String> {
    let mut paragraphs = Vec::new();
    let mut current = Paragraph::new();

    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim_end();
        let line_no = idx + 1;

        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }

        if raw_line.starts_with(' ') || raw_line.starts_with('\t') {
            match current.fields.last_mut() {
                Some((_, value)) => {
                    value.push('\n');
                    value.push_str(line);
                }
                None => {
                    return Err(format!("line {}: continuation line with no preceding field", line_no))
                }
            }
            continue;
        }

        let colon = line
            .find(':')
            .ok_or_else(|| format!("line {}: expected 'Field: value'", line_no))?;
        let name = line[..colon].trim_end();
        let value = line[colon + 1..].trim_start();

        if name.is_empty() {
            return Err(format!("line {}: empty field name", line_no));
        }
        if current.get(name).is_some() {
            return Err(format!("line {}: duplicate field '{}'", line_no, name));
        }
        current.push(name, value);
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs)
}

/// Serialise paragraphs with a blank separator line between them.
pub fn serialize_paragraphs(paragraphs: &[Paragraph]) -> String {
    let mut out = String::new();
    for (idx, pgh) in paragraphs.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        out.push_str(&pgh.serialize());
    }
    out
}

/// Read and parse a paragraph file.
pub fn get_paragraphs(fs: &dyn Filesystem, path: &Path) -> Result<Vec<Paragraph>> {
    let contents = fs.read_contents(path)?;
    parse_paragraphs(&contents).map_err(|reason| Error::ParagraphParse {
        path: path.to_path_buf(),
        reason,
    })
}

/// Read a file expected to hold exactly one paragraph.
pub fn get_single_paragraph(fs: &dyn Filesystem, path: &Path) -> Result<Paragraph> {
    let mut paragraphs = get_paragraphs(fs, path)?;
    if paragraphs.len() != 1 {
        return Err(Error::ParagraphParse {
            path: path.to_path_buf(),
            reason: format!("expected a single paragraph, found {}", paragraphs.len()),
        });
    }
    Ok(paragraphs.remove(0))
}

/// Field extractor that accumulates missing/unexpected fields so a control
/// file can be reported with every problem at once.
pub struct ParagraphParser {
    fields: Vec<(String, String)>,
    missing: Vec<String>,
}

impl ParagraphParser {
    pub fn new(paragraph: Paragraph) -> Self {
        Self {
            fields: paragraph.fields,
            missing: Vec::new(),
        }
    }

    fn take(&mut self, name: &str) -> Option<String> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    /// Extract a required field; its absence is recorded and reported by
    /// [`ParagraphParser::finish`].
    pub fn required_field(&mut self, name: &str) -> String {
        match self.take(name) {
            Some(value) => value,
            None => {
                self.missing.push(name.to_string());
                String::new()
            }
        }
    }

    pub fn optional_field(&mut self, name: &str) -> Option<String> {
        self.take(name)
    }

    /// Fail if any required field was missing or unexpected fields remain.
    pub fn finish(self, origin: &str) -> Result<()> {
        if self.missing.is_empty() && self.fields.is_empty() {
            return Ok(());
        }
        let mut problems = Vec::new();
        if !self.missing.is_empty() {
            problems.push(format!("missing required fields: {}", self.missing.join(", ")));
        }
        if !self.fields.is_empty() {
            let names: Vec<&str> = self.fields.iter().map(|(n, _)| n.as_str()).collect();
            problems.push(format!("unexpected fields: {}", names.join(", ")));
        }
        Err(Error::ParagraphParse {
            path: origin.into(),
            reason: problems.join("; "),
        })
    }

    /// Fail only on missing fields, leaving extra fields untouched.
    pub fn finish_lenient(self, origin: &str) -> Result<()> {
        if self.missing.is_empty() {
            return Ok(());
        }
        Err(Error::ParagraphParse {
            path: origin.into(),
            reason: format!("missing required fields: {}", self.missing.join(", ")),
        })
    }
}

/// Split a comma-separated field value into trimmed, nonempty entries.
pub fn parse_comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_paragraph() {
        let text = "Package: zlib\nVersion: 1.2.11\n";
        let pghs = parse_paragraphs(text).unwrap();
        assert_eq!(pghs.len(), 1);
        assert_eq!(pghs[0].get("Package"), Some("zlib"));
        assert_eq!(pghs[0].get("Version"), Some("1.2.11"));
    }

    #[test]
    fn test_parse_multiple_paragraphs() {
        let text = "Package: zlib\n\nPackage: curl\nDepends: zlib\n";
        let pghs = parse_paragraphs(text).unwrap();
        assert_eq!(pghs.len(), 2);
        assert_eq!(pghs[1].get("Depends"), Some("zlib"));
    }

    #[test]
    fn test_continuation_lines() {
        let text = "Description: a compression library\n  with a long tail\n";
        let pghs = parse_paragraphs(text).unwrap();
        assert_eq!(
            pghs[0].get("Description"),
            Some("a compression library\n  with a long tail")
        );
    }

    #[test]
    fn test_round_trip_byte_identical() {
        let text = "Package: zlib\nVersion: 1.2.11\nDescription: a library\n  second line\n\nPackage: curl\nVersion: 7.55.1\n";
        let pghs = parse_paragraphs(text).unwrap();
        assert_eq!(serialize_paragraphs(&pghs), text);
    }

    #[test]
    fn test_trailing_whitespace_tolerated() {
        let text = "Package: zlib   \nVersion: 1.2.11\t\n";
        let pghs = parse_paragraphs(text).unwrap();
        assert_eq!(pghs[0].get("Package"), Some("zlib"));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let text = "Package: zlib\nPackage: curl\n";
        let err = parse_paragraphs(text).unwrap_err();
        assert!(err.contains("duplicate field 'Package'"), "{}", err);
    }

    #[test]
    fn test_orphan_continuation_rejected() {
        assert!(parse_paragraphs("  stray continuation\n").is_err());
    }

    #[test]
    fn test_missing_colon_rejected() {
        assert!(parse_paragraphs("Package zlib\n").is_err());
    }

    #[test]
    fn test_parser_required_and_unexpected() {
        let mut pgh = Paragraph::new();
        pgh.push("CRTLinkage", "dynamic");
        pgh.push("Bogus", "1");

        let mut parser = ParagraphParser::new(pgh);
        assert_eq!(parser.required_field("CRTLinkage"), "dynamic");
        assert_eq!(parser.required_field("LibraryLinkage"), "");
        let err = parser.finish("BUILD_INFO").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("LibraryLinkage"));
        assert!(message.contains("Bogus"));
    }

    #[test]
    fn test_parse_comma_list() {
        assert_eq!(parse_comma_list("zlib, curl ,"), vec!["zlib", "curl"]);
        assert!(parse_comma_list("").is_empty());
    }
}
