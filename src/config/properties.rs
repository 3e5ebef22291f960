// src/config/properties.rs

//! Reader and writer for `.properties` text files
//!
//! Follows the classic properties line format: `#`/`!` comments, `=`, `:` or
//! whitespace separators, backslash continuation lines and `\uXXXX` escapes.
//! Input must be UTF-8.

use std::collections::BTreeMap;
use thiserror::Error;

/// Properties parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertiesError {
    #[error("line {line}: malformed \\uXXXX escape")]
    MalformedUnicodeEscape { line: usize },

    #[error("line {line}: \\u{code:04X} is not a valid character")]
    InvalidCodePoint { line: usize, code: u32 },

    #[error("content is not valid UTF-8 (byte offset {offset})")]
    Encoding { offset: usize },
}

/// Parse properties from raw bytes
pub fn parse_bytes(bytes: &[u8]) -> Result<BTreeMap<String, String>, PropertiesError> {
    let text = std::str::from_utf8(bytes).map_err(|e| PropertiesError::Encoding {
        offset: e.valid_up_to(),
    })?;
    parse(text)
}

/// Parse properties text; later keys replace earlier ones
pub fn parse(text: &str) -> Result<BTreeMap<String, String>, PropertiesError> {
    let mut props = BTreeMap::new();
    let physical: Vec<&str> = text.lines().collect();
    let mut idx = 0;

    while idx < physical.len() {
        let line_no = idx + 1;
        let first = trim_leading(physical[idx]);
        idx += 1;

        if first.is_empty() || first.starts_with('#') || first.starts_with('!') {
            continue;
        }

        let mut logical = first.to_string();
        while ends_with_continuation(&logical) {
            logical.pop();
            match physical.get(idx) {
                Some(next) => {
                    logical.push_str(trim_leading(next));
                    idx += 1;
                }
                None => break,
            }
        }

        let (raw_key, raw_value) = split_key_value(&logical);
        let key = unescape(raw_key, line_no)?;
        let value = unescape(raw_value, line_no)?;
        props.insert(key, value);
    }

    Ok(props)
}

/// Serialize properties, one `key=value` per line in map order
///
/// The optional comment becomes a `#` header line. No timestamp is written
/// so identical maps always produce identical files.
pub fn store(props: &BTreeMap<String, String>, comment: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(comment) = comment {
        for line in comment.lines() {
            out.push('#');
            out.push_str(line);
            out.push('\n');
        }
    }
    for (key, value) in props {
        out.push_str(&escape(key, true));
        out.push('=');
        out.push_str(&escape(value, false));
        out.push('\n');
    }
    out
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\x0c'
}

fn trim_leading(line: &str) -> &str {
    line.trim_start_matches(is_blank)
}

/// An odd number of trailing backslashes continues the line
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_key_value(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    let mut sep: Option<char> = None;

    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            continue;
        }
        if c == '=' || c == ':' || is_blank(c) {
            key_end = i;
            sep = Some(c);
            break;
        }
    }

    let key = &line[..key_end];
    let mut rest = &line[key_end..];
    match sep {
        None => return (key, ""),
        Some(c) if is_blank(c) => {
            rest = trim_leading(rest);
            if let Some(stripped) = rest.strip_prefix(['=', ':']) {
                rest = stripped;
            }
        }
        Some(_) => rest = &rest[1..],
    }

    (key, trim_leading(rest))
}

fn unescape(raw: &str, line: usize) -> Result<String, PropertiesError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return Err(PropertiesError::MalformedUnicodeEscape { line });
                }
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| PropertiesError::MalformedUnicodeEscape { line })?;
                let ch = char::from_u32(code)
                    .ok_or(PropertiesError::InvalidCodePoint { line, code })?;
                out.push(ch);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }

    Ok(out)
}

fn escape(raw: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, c) in raw.chars().enumerate() {
        match c {
            ' ' if i == 0 || is_key => out.push_str("\\ "),
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
