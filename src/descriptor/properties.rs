//! Line-preserving `.properties` documents.
//!
//! Parsing follows the `java.util.Properties` text format: `#`/`!` comment
//! lines, keys ending at the first unescaped `=`, `:` or whitespace, backslash
//! escapes (`\t`, `\n`, `\uXXXX`, ...) and lines continued with a trailing
//! backslash. Every logical line keeps its original text, so rendering a
//! document that was only read gives back the input unchanged. Setting a
//! key rewrites just the lines holding that key.

/// One logical line of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// Blank line or comment, kept verbatim
    Verbatim(String),
    /// Key/value entry with its original text
    Entry {
        raw: String,
        key: String,
        value: String,
    },
}

/// A parsed `.properties` document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertiesDocument {
    lines: Vec<Line>,
    newline: &'static str,
    trailing_newline: bool,
}

impl Default for PropertiesDocument {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            newline: "\n",
            trailing_newline: true,
        }
    }
}

impl PropertiesDocument {
    pub fn parse(text: &str) -> Self {
        let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
        let trailing_newline = text.is_empty() || text.ends_with('\n');

        let mut physical: Vec<&str> =
            if text.is_empty() { Vec::new() } else { text.split('\n').collect() };
        if text.ends_with('\n') {
            physical.pop();
        }

        let mut lines = Vec::new();
        let mut iter = physical.into_iter().map(|l| l.strip_suffix('\r').unwrap_or(l));
        while let Some(first) = iter.next() {
            let trimmed = first.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                lines.push(Line::Verbatim(first.to_string()));
                continue;
            }

            let mut raw_parts = vec![first];
            let mut logical = String::new();
            let mut current = first;
            loop {
                if ends_with_continuation(current) {
                    logical.push_str(&current[..current.len() - 1]);
                    match iter.next() {
                        Some(next) => {
                            raw_parts.push(next);
                            current = next.trim_start();
                        }
                        None => break,
                    }
                } else {
                    logical.push_str(current);
                    break;
                }
            }

            let (key, value) = split_entry(&logical);
            lines.push(Line::Entry {
                raw: raw_parts.join(newline),
                key,
                value,
            });
        }

        Self {
            lines,
            newline,
            trailing_newline,
        }
    }

    /// Value of `key`; the last occurrence wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Keys in document order, duplicates included.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry { key, .. } => Some(key.as_str()),
            Line::Verbatim(_) => None,
        })
    }

    /// Set `key` to `value`, rewriting existing lines in place or appending.
    pub fn set(&mut self, key: &str, value: &str) {
        let raw = format!("{}={}", escape(key, true), escape(value, false));
        let mut found = false;
        for line in &mut self.lines {
            if let Line::Entry { key: k, .. } = line
                && k == key
            {
                *line = Line::Entry {
                    raw: raw.clone(),
                    key: key.to_string(),
                    value: value.to_string(),
                };
                found = true;
            }
        }
        if !found {
            self.lines.push(Line::Entry {
                raw,
                key: key.to_string(),
                value: value.to_string(),
            });
        }
    }

    /// Render the document back to text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push_str(self.newline);
            }
            match line {
                Line::Verbatim(text) => out.push_str(text),
                Line::Entry { raw, .. } => out.push_str(raw),
            }
        }
        if self.trailing_newline && !self.lines.is_empty() {
            out.push_str(self.newline);
        }
        out
    }
}

fn ends_with_continuation(line: &str) -> bool {
    line.bytes().rev().take_while(|&b| b == b'\\').count() % 2 == 1
}

fn is_separator_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\u{c}')
}

/// Split a logical line into its unescaped key and value.
fn split_entry(logical: &str) -> (String, String) {
    let line = logical.trim_start_matches(is_separator_space);
    let mut key_end = line.len();
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = i;
                break;
            }
            c if is_separator_space(c) => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let mut rest = line[key_end..].trim_start_matches(is_separator_space);
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start_matches(is_separator_space);
    }
    (unescape(key), unescape(rest))
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Escape text the way `Properties.store` does, leaving non-ASCII as is.
fn escape(text: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        match c {
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{c}' => out.push_str("\\f"),
            '\\' | '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}
