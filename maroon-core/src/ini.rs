//! Section/key-value documents in the format of the AWS `credentials` and
//! `config` files.
//!
//! A [`Document`] keeps every input line. Setting a key rewrites only the
//! line holding that key (or inserts one), so comments, ordering and every
//! other section come back out byte for byte. Serialization never adds
//! headers or alignment, which makes repeated identical rewrites produce
//! identical bytes.
//!
//! # Example
//!
//! ```
//! use maroon_core::ini::Document;
//!
//! let mut doc = Document::parse("[other]\nkey = 1\n").unwrap();
//! doc.set("default", "region", "us-east-1").unwrap();
//! assert_eq!(doc.to_string(), "[other]\nkey = 1\n\n[default]\nregion = us-east-1\n");
//! ```

use std::fmt::{self, Write as _};
use std::str::FromStr;

use crate::error::{MaroonError, ParseError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// Blank line or comment.
    Verbatim,
    Section(String),
    Entry { key: String, value: String },
    /// Indented line without a key of its own, or a line nested under an
    /// entry whose value is empty.
    Continuation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    raw: String,
    /// `"\n"`, `"\r\n"`, or empty for a final line without a terminator.
    ending: &'static str,
    kind: Kind,
}

impl Line {
    fn entry(indent: &str, key: &str, value: &str, ending: &'static str) -> Self {
        Self {
            raw: format!("{indent}{key} = {value}"),
            ending,
            kind: Kind::Entry {
                key: key.to_string(),
                value: value.to_string(),
            },
        }
    }

    fn section(name: &str, ending: &'static str) -> Self {
        Self {
            raw: format!("[{name}]"),
            ending,
            kind: Kind::Section(name.to_string()),
        }
    }

    fn is_content(&self) -> bool {
        matches!(self.kind, Kind::Entry { .. } | Kind::Continuation)
    }

    fn indent(&self) -> &str {
        let trimmed = self.raw.trim_start_matches([' ', '\t']);
        &self.raw[..self.raw.len() - trimmed.len()]
    }
}

fn split_ending(piece: &str) -> (&str, &'static str) {
    if let Some(raw) = piece.strip_suffix("\r\n") {
        (raw, "\r\n")
    } else if let Some(raw) = piece.strip_suffix('\n') {
        (raw, "\n")
    } else {
        (piece, "")
    }
}

/// A parsed section/key-value document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    lines: Vec<Line>,
    /// Terminator for inserted lines, taken from the first terminated line.
    newline: &'static str,
    bom: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            newline: "\n",
            bom: false,
        }
    }
}

impl Document {
    /// Parse a document. Line numbers in errors are 1-based.
    ///
    /// Keys are separated from values by the first `=` or `:`. A leading
    /// byte order mark and each line's terminator are kept for output.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let (bom, text) = match text.strip_prefix('\u{feff}') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let mut lines: Vec<Line> = Vec::new();
        // Inside the indented block of an entry with an empty value.
        let mut nested = false;

        for (idx, piece) in text.split_inclusive('\n').enumerate() {
            let (raw, ending) = split_ending(piece);
            let error = |message: &str| ParseError::Document {
                line: idx + 1,
                message: message.to_string(),
            };
            let trimmed = raw.trim();
            let indented = raw.starts_with([' ', '\t']);

            let kind = if trimmed.is_empty() || trimmed.starts_with(['#', ';']) {
                Kind::Verbatim
            } else if let Some(header) = trimmed.strip_prefix('[') {
                let (name, rest) = header
                    .split_once(']')
                    .ok_or_else(|| error("unterminated section header"))?;
                let rest = rest.trim();
                if !rest.is_empty() && !rest.starts_with(['#', ';']) {
                    return Err(error("unexpected text after section header"));
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(error("empty section name"));
                }
                Kind::Section(name.to_string())
            } else if indented && nested {
                Kind::Continuation
            } else if let Some(at) = raw.find(['=', ':']) {
                let key = raw[..at].trim();
                if key.is_empty() {
                    return Err(error("missing key before delimiter"));
                }
                Kind::Entry {
                    key: key.to_string(),
                    value: raw[at + 1..].trim().to_string(),
                }
            } else if indented && lines.last().is_some_and(Line::is_content) {
                Kind::Continuation
            } else {
                return Err(error("expected 'key = value'"));
            };

            nested = match &kind {
                Kind::Entry { value, .. } => value.is_empty(),
                Kind::Section(_) => false,
                Kind::Verbatim | Kind::Continuation => nested,
            };
            lines.push(Line {
                raw: raw.to_string(),
                ending,
                kind,
            });
        }

        let newline = lines
            .iter()
            .map(|l| l.ending)
            .find(|e| !e.is_empty())
            .unwrap_or("\n");

        Ok(Self {
            lines,
            newline,
            bom,
        })
    }

    /// Look up `key` in the first occurrence of `section` that defines it.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.find_entry(section, key).and_then(|idx| match &self.lines[idx].kind {
            Kind::Entry { value, .. } => Some(value.as_str()),
            _ => None,
        })
    }

    /// Whether a section with this name exists.
    pub fn has_section(&self, section: &str) -> bool {
        self.section_header(section).is_some()
    }

    /// Set `key` to `value` inside `section`, creating either as needed.
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> Result<(), MaroonError> {
        validate_token("section name", section, &[']'])?;
        validate_token("key", key, &['=', ':', '[', '#', ';'])?;
        if value.contains(['\n', '\r']) {
            return Err(MaroonError::invalid(
                "value",
                value,
                "must not contain line breaks",
            ));
        }

        if let Some(idx) = self.find_entry(section, key) {
            let old = &self.lines[idx];
            let was_nested = matches!(&old.kind, Kind::Entry { value, .. } if value.is_empty());
            let line = Line::entry(old.indent(), key, value, old.ending);
            self.lines[idx] = line;
            // A nested block only belongs to a key with an empty value.
            if was_nested && !value.is_empty() {
                let end = self.lines[idx + 1..]
                    .iter()
                    .position(|l| l.kind != Kind::Continuation)
                    .map_or(self.lines.len(), |n| idx + 1 + n);
                self.lines.drain(idx + 1..end);
            }
            return Ok(());
        }

        let newline = self.newline;
        match self.section_header(section) {
            Some(header) => {
                let body = &self.lines[header + 1..];
                let body_len = body
                    .iter()
                    .position(|l| matches!(l.kind, Kind::Section(_)))
                    .unwrap_or(body.len());
                let last_content = body[..body_len]
                    .iter()
                    .rposition(Line::is_content)
                    .map_or(header, |n| header + 1 + n);
                self.lines
                    .insert(last_content + 1, Line::entry("", key, value, newline));
            }
            None => {
                if self.lines.last().is_some_and(|l| !l.raw.trim().is_empty()) {
                    self.lines.push(Line {
                        raw: String::new(),
                        ending: newline,
                        kind: Kind::Verbatim,
                    });
                }
                self.lines.push(Line::section(section, newline));
                self.lines.push(Line::entry("", key, value, newline));
            }
        }

        Ok(())
    }

    fn section_header(&self, section: &str) -> Option<usize> {
        self.lines
            .iter()
            .position(|l| matches!(&l.kind, Kind::Section(name) if name == section))
    }

    fn find_entry(&self, section: &str, key: &str) -> Option<usize> {
        let mut in_section = false;
        for (idx, line) in self.lines.iter().enumerate() {
            match &line.kind {
                Kind::Section(name) => in_section = name == section,
                Kind::Entry { key: k, .. } if in_section && k == key => return Some(idx),
                _ => {}
            }
        }
        None
    }
}

fn validate_token(field: &'static str, token: &str, forbidden: &[char]) -> Result<(), MaroonError> {
    if token.trim().is_empty()
        || token.trim() != token
        || token.contains(['\n', '\r'])
        || token.contains(forbidden)
    {
        return Err(MaroonError::invalid(field, token, "is not usable in a document"));
    }
    Ok(())
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bom {
            f.write_char('\u{feff}')?;
        }
        for line in &self.lines {
            f.write_str(&line.raw)?;
            f.write_str(if line.ending.is_empty() {
                self.newline
            } else {
                line.ending
            })?;
        }
        Ok(())
    }
}

impl FromStr for Document {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse `text`, set one key, and serialize the result.
pub fn set_section_key(
    text: &str,
    section: &str,
    key: &str,
    value: &str,
) -> Result<String, MaroonError> {
    let mut doc = Document::parse(text)?;
    doc.set(section, key, value)?;
    Ok(doc.to_string())
}
