//! File-backed git-config store.
//!
//! Lines are kept verbatim, terminators included, so that untouched parts
//! of the file survive a rewrite byte-for-byte. Writes follow git's protocol: content goes to
//! `<file>.lock`, created exclusively, which is then renamed over the file.

use super::{ConfigStore, Result, StoreError, canonical_key, split_key};
use regex::Regex;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
struct Line {
    raw: String,
    /// Terminator read with the line; `None` uses the file's convention
    eol: Option<&'static str>,
    kind: LineKind,
}

#[derive(Debug, Clone)]
enum LineKind {
    Header {
        section: String,
        subsection: Option<String>,
    },
    Entry {
        key: String,
        name: String,
        value: String,
        comment: Option<String>,
    },
    Other,
}

impl Line {
    fn header(section: &str, subsection: Option<&str>) -> Self {
        let raw = match subsection {
            Some(sub) => format!(
                "[{} \"{}\"]",
                section,
                sub.replace('\\', "\\\\").replace('"', "\\\"")
            ),
            None => format!("[{}]", section),
        };
        Self {
            raw,
            eol: None,
            kind: LineKind::Header {
                section: section.to_string(),
                subsection: subsection.map(str::to_string),
            },
        }
    }

    fn entry(key: String, name: &str, value: &str) -> Self {
        Self {
            raw: format!("\t{} = {}", name, render_value(value)),
            eol: None,
            kind: LineKind::Entry {
                key,
                name: name.to_string(),
                value: value.to_string(),
                comment: None,
            },
        }
    }
}

/// A git-config formatted file held in memory.
#[derive(Debug, Clone, Default)]
pub struct GitConfigFile {
    path: Option<PathBuf>,
    lines: Vec<Line>,
    /// File uses CRLF; decides the terminator of added lines
    crlf: bool,
}

impl GitConfigFile {
    /// Load the file at `path`; a missing file yields an empty store that
    /// will be created on [`save`](Self::save).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Configuration file {:?} does not exist yet", path);
                String::new()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let mut store = Self::parse(&text);
        store.path = Some(path);
        Ok(store)
    }

    /// Parse configuration text without a backing file.
    pub fn parse(text: &str) -> Self {
        let mut current: Option<(String, Option<String>)> = None;
        let mut lines = Vec::new();
        let crlf = text.lines().next().is_some_and(|first| {
            text[first.len()..].starts_with("\r\n")
        });

        for piece in text.split_inclusive('\n') {
            let (raw, eol) = if let Some(raw) = piece.strip_suffix("\r\n") {
                (raw, Some("\r\n"))
            } else if let Some(raw) = piece.strip_suffix('\n') {
                (raw, Some("\n"))
            } else {
                (piece, None)
            };
            let trimmed = raw.trim_start();
            let kind = if trimmed.starts_with('[') {
                match parse_header(trimmed) {
                    Some((section, subsection)) => {
                        current = Some((section.clone(), subsection.clone()));
                        LineKind::Header {
                            section,
                            subsection,
                        }
                    }
                    None => LineKind::Other,
                }
            } else if trimmed.is_empty() || trimmed.starts_with(['#', ';']) {
                LineKind::Other
            } else {
                match (&current, parse_entry(trimmed)) {
                    (Some((section, subsection)), Some((name, value, comment))) => {
                        LineKind::Entry {
                            key: canonical_key(section, subsection.as_deref(), &name),
                            name,
                            value,
                            comment,
                        }
                    }
                    _ => LineKind::Other,
                }
            };
            lines.push(Line {
                raw: raw.to_string(),
                eol,
                kind,
            });
        }

        Self {
            path: None,
            lines,
            crlf,
        }
    }

    /// Write the store back to its file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] when another writer holds the lock
    /// file, [`StoreError::Unbacked`] for stores built with
    /// [`parse`](Self::parse).
    pub fn save(&self) -> Result<()> {
        let path = self.path.as_ref().ok_or(StoreError::Unbacked)?;
        let lock_path = lock_path_for(path);

        let mut lock = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::Locked { path: path.clone() });
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: lock_path,
                    source,
                });
            }
        };

        let written = lock
            .write_all(self.to_string().as_bytes())
            .and_then(|_| lock.sync_all())
            .and_then(|_| fs::rename(&lock_path, path));
        if let Err(source) = written {
            let _ = fs::remove_file(&lock_path);
            return Err(StoreError::Io {
                path: path.clone(),
                source,
            });
        }

        debug!("Saved configuration file {:?}", path);
        Ok(())
    }

    fn entry_indices(&self, canonical: &str) -> Vec<usize> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| matches!(&line.kind, LineKind::Entry { key, .. } if key == canonical))
            .map(|(index, _)| index)
            .collect()
    }

    fn insert_entry(&mut self, section: &str, subsection: Option<&str>, entry: Line) {
        let header = self.lines.iter().rposition(|line| {
            matches!(&line.kind, LineKind::Header { section: s, subsection: sub }
                if s == section && sub.as_deref() == subsection)
        });

        match header {
            Some(header) => {
                let mut at = header + 1;
                for (offset, line) in self.lines[header + 1..].iter().enumerate() {
                    match &line.kind {
                        LineKind::Header { .. } => break,
                        LineKind::Entry { .. } => at = header + 2 + offset,
                        LineKind::Other => {}
                    }
                }
                self.lines.insert(at, entry);
            }
            None => {
                self.lines.push(Line::header(section, subsection));
                self.lines.push(entry);
            }
        }
    }
}

impl fmt::Display for GitConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let newline = if self.crlf { "\r\n" } else { "\n" };
        for line in &self.lines {
            write!(f, "{}{}", line.raw, line.eol.unwrap_or(newline))?;
        }
        Ok(())
    }
}

impl ConfigStore for GitConfigFile {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let (section, subsection, variable) = split_key(key)?;
        let canonical = canonical_key(&section, subsection.as_deref(), &variable);

        Ok(self
            .lines
            .iter()
            .rev()
            .find_map(|line| match &line.kind {
                LineKind::Entry { key, value, .. } if *key == canonical => Some(value.clone()),
                _ => None,
            }))
    }

    fn get_regexp(&self, pattern: &str) -> Result<Vec<(String, String)>> {
        let regex = Regex::new(pattern)?;

        Ok(self
            .lines
            .iter()
            .filter_map(|line| match &line.kind {
                LineKind::Entry { key, value, .. } if regex.is_match(key) => {
                    Some((key.clone(), value.clone()))
                }
                _ => None,
            })
            .collect())
    }

    fn replace_all(&mut self, key: &str, value: &str) -> Result<()> {
        let (section, subsection, variable) = split_key(key)?;
        let canonical = canonical_key(&section, subsection.as_deref(), &variable);
        let indices = self.entry_indices(&canonical);

        let Some((&first, rest)) = indices.split_first() else {
            // Keep the caller's spelling of the variable name
            let name = key.rsplit('.').next().unwrap_or(&variable);
            let entry = Line::entry(canonical, name, value);
            self.insert_entry(&section, subsection.as_deref(), entry);
            return Ok(());
        };

        // An entry already holding the value keeps its text and comment
        let eol = self.lines[first].eol;
        match &self.lines[first].kind {
            LineKind::Entry { value: current, .. } if current == value => {}
            LineKind::Entry { name, .. } => {
                let name = name.clone();
                self.lines[first] = Line {
                    eol,
                    ..Line::entry(canonical, &name, value)
                };
            }
            _ => {
                self.lines[first] = Line {
                    eol,
                    ..Line::entry(canonical, &variable, value)
                }
            }
        }
        for &index in rest.iter().rev() {
            self.lines.remove(index);
        }
        Ok(())
    }

    fn annotate(&mut self, key: &str, value: &str, marker: &str) -> Result<bool> {
        let (section, subsection, variable) = split_key(key)?;
        let canonical = canonical_key(&section, subsection.as_deref(), &variable);
        let tag = format!("# {}", marker);
        let mut changed = false;

        for line in &mut self.lines {
            if let LineKind::Entry {
                key,
                value: current,
                comment,
                ..
            } = &mut line.kind
            {
                let tagged = comment.as_deref().is_some_and(|c| c.contains(&tag));
                if *key != canonical || current.as_str() != value || tagged {
                    continue;
                }
                line.raw.push(' ');
                line.raw.push_str(&tag);
                *comment = Some(match comment.take() {
                    Some(existing) => format!("{} {}", existing, tag),
                    None => tag.clone(),
                });
                changed = true;
            }
        }

        Ok(changed)
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut lock = path.as_os_str().to_owned();
    lock.push(".lock");
    PathBuf::from(lock)
}

fn parse_header(line: &str) -> Option<(String, Option<String>)> {
    let rest = line.strip_prefix('[')?;

    let mut in_quote = false;
    let mut escaped = false;
    let mut end = None;
    for (index, c) in rest.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            ']' if !in_quote => {
                end = Some(index);
                break;
            }
            _ => {}
        }
    }
    let inner = rest[..end?].trim();

    if let Some(quote) = inner.find('"') {
        let section = inner[..quote].trim().to_ascii_lowercase();
        let quoted = inner[quote + 1..].strip_suffix('"')?;
        let mut subsection = String::with_capacity(quoted.len());
        let mut chars = quoted.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    subsection.push(next);
                }
            } else {
                subsection.push(c);
            }
        }
        Some((section, Some(subsection)))
    } else if let Some((section, subsection)) = inner.split_once('.') {
        Some((
            section.trim().to_ascii_lowercase(),
            Some(subsection.trim().to_ascii_lowercase()),
        ))
    } else if inner.is_empty() {
        None
    } else {
        Some((inner.to_ascii_lowercase(), None))
    }
}

fn parse_entry(line: &str) -> Option<(String, String, Option<String>)> {
    if !line.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    let name_len = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .unwrap_or(line.len());
    let name = line[..name_len].to_string();
    let rest = line[name_len..].trim_start();

    // Bare variable names are implicit booleans
    if rest.is_empty() || rest.starts_with(['#', ';']) {
        let comment = (!rest.is_empty()).then(|| rest.to_string());
        return Some((name, "true".to_string(), comment));
    }

    let (value, comment) = parse_value(rest.strip_prefix('=')?);
    Some((name, value, comment))
}

fn parse_value(raw: &str) -> (String, Option<String>) {
    let raw = raw.trim_start_matches([' ', '\t']);
    let mut value = String::with_capacity(raw.len());
    let mut trailing_ws = 0;
    let mut in_quote = false;
    let mut chars = raw.char_indices();

    while let Some((index, c)) = chars.next() {
        match c {
            '"' => {
                in_quote = !in_quote;
                trailing_ws = 0;
            }
            '\\' => {
                trailing_ws = 0;
                match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, 'b')) => {
                        value.pop();
                    }
                    Some((_, other)) => value.push(other),
                    None => {}
                }
            }
            '#' | ';' if !in_quote => {
                value.truncate(value.len() - trailing_ws);
                return (value, Some(raw[index..].to_string()));
            }
            ' ' | '\t' if !in_quote => {
                value.push(c);
                trailing_ws += 1;
            }
            _ => {
                value.push(c);
                trailing_ws = 0;
            }
        }
    }

    value.truncate(value.len() - trailing_ws);
    (value, None)
}

fn render_value(value: &str) -> String {
    let quoted = value.starts_with([' ', '\t'])
        || value.ends_with([' ', '\t'])
        || value.contains(['#', ';']);

    let mut out = String::with_capacity(value.len() + 2);
    if quoted {
        out.push('"');
    }
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    if quoted {
        out.push('"');
    }
    out
}
