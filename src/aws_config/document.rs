// Line-preserving edits of AWS INI files
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {reason}")]
pub struct DocumentError {
    pub line: usize,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// `[name]`, optionally followed by a `#`/`;` comment
    Header { name: String, raw: String },
    /// Unindented `key = value` or `key: value`
    Entry { key: String, raw: String },
    /// Indented line of a nested block such as `s3 =`
    Continuation(String),
    Comment(String),
    Blank(String),
}

impl Line {
    fn parse(raw: &str, number: usize) -> Result<Self, DocumentError> {
        let trimmed = raw.trim();
        let error = |reason| DocumentError {
            line: number,
            reason,
        };

        if trimmed.is_empty() {
            return Ok(Line::Blank(raw.to_string()));
        }
        if trimmed.starts_with('#') || trimmed.starts_with(';') {
            return Ok(Line::Comment(raw.to_string()));
        }
        if let Some(header) = trimmed.strip_prefix('[') {
            let end = header.find(']').ok_or_else(|| error("unterminated section header"))?;
            let rest = header[end + 1..].trim_start();
            if !(rest.is_empty() || rest.starts_with('#') || rest.starts_with(';')) {
                return Err(error("unexpected text after section header"));
            }
            return Ok(Line::Header {
                name: header[..end].trim().to_string(),
                raw: raw.to_string(),
            });
        }
        if raw.starts_with([' ', '\t']) {
            return Ok(Line::Continuation(raw.to_string()));
        }

        let split = raw
            .find(['=', ':'])
            .ok_or_else(|| error("expected `key = value`"))?;
        let key = raw[..split].trim();
        if key.is_empty() {
            return Err(error("missing key"));
        }

        Ok(Line::Entry {
            key: key.to_string(),
            raw: raw.to_string(),
        })
    }

    fn raw(&self) -> &str {
        match self {
            Line::Header { raw, .. } | Line::Entry { raw, .. } => raw,
            Line::Continuation(raw) | Line::Comment(raw) | Line::Blank(raw) => raw,
        }
    }
}

/// An AWS config or credentials file kept line by line.
///
/// Only the lines named by [`ProfileDocument::set`] change; comments,
/// nested blocks, spacing and line endings of everything else are written
/// back exactly as read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDocument {
    lines: Vec<Line>,
    newline: &'static str,
}

impl ProfileDocument {
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };

        let mut raw_lines: Vec<&str> = text.split('\n').collect();
        if text.is_empty() || text.ends_with('\n') {
            raw_lines.pop();
        }

        let lines = raw_lines
            .into_iter()
            .enumerate()
            .map(|(i, raw)| Line::parse(raw.strip_suffix('\r').unwrap_or(raw), i + 1))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { lines, newline })
    }

    /// Point `key` of every `[section]` at `value`, adding the key or the
    /// section when missing.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let entry = format!("{} = {}", key, value);

        let mut in_section = false;
        let mut replaced = false;
        for line in &mut self.lines {
            match line {
                Line::Header { name, .. } => in_section = name.as_str() == section,
                Line::Entry { key: k, raw } if in_section && k.as_str() == key => {
                    *raw = entry.clone();
                    replaced = true;
                }
                _ => {}
            }
        }
        if replaced {
            return;
        }

        let last_header = self
            .lines
            .iter()
            .rposition(|line| matches!(line, Line::Header { name, .. } if name == section));

        let new_line = Line::Entry {
            key: key.to_string(),
            raw: entry,
        };

        match last_header {
            Some(header) => {
                let at = self.end_of_section_body(header);
                self.lines.insert(at, new_line);
            }
            None => {
                if matches!(self.lines.last(), Some(line) if !matches!(line, Line::Blank(_))) {
                    self.lines.push(Line::Blank(String::new()));
                }
                self.lines.push(Line::Header {
                    name: section.to_string(),
                    raw: format!("[{}]", section),
                });
                self.lines.push(new_line);
            }
        }
    }

    /// Index just past the last entry (or nested line) of the section whose
    /// header is at `header`; trailing blanks and comments stay below.
    fn end_of_section_body(&self, header: usize) -> usize {
        let mut end = header + 1;
        for (i, line) in self.lines.iter().enumerate().skip(header + 1) {
            match line {
                Line::Header { .. } => break,
                Line::Entry { .. } | Line::Continuation(_) => end = i + 1,
                Line::Comment(_) | Line::Blank(_) => {}
            }
        }
        end
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line.raw());
            out.push_str(self.newline);
        }
        out
    }
}

/// Section headers without their trailing comments, for parsers that
/// reject `[name] # note`.
pub fn strip_header_comments(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let trimmed = line.trim_start();
            match trimmed.find(']') {
                Some(end) if trimmed.starts_with('[') => &trimmed[..=end],
                _ => line,
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
