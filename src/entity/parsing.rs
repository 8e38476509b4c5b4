/*!
This module parses the brat-like annotation files of the corpus: the gold annotations
(`ID<TAB>LABEL START END<TAB>TEXT`) and the vocabulary-linked annotations
(`ID<TAB>CODE | VOCAB_TEXT | SPANS<TAB>...`). Comments, blank lines and short lines are skipped.
Records that cannot be parsed are skipped too, but counted.
*/
use crate::entity::{Entities, Entity, Label};
use crate::linking::Candidate;
use serde::Serialize;
use std::{
    borrow::Cow,
    error::Error,
    fmt::Display,
    fs::read_to_string,
    path::Path,
};
use tracing::debug;

/// Counters collected while reading an annotation or prediction file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ParseStats {
    /// Records turned into entities or candidates.
    pub records: usize,
    /// Comments, blank lines, short lines and records removed by a filter.
    pub skipped_lines: usize,
    /// Records with unparseable offsets or missing fields.
    pub malformed: usize,
}

/// Which gold records to keep, and under which label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GoldFilter {
    /// Keep every record with its own label.
    #[default]
    All,
    /// Keep only the records with this label.
    Only(Label),
    /// Keep every record, but give all of them this label.
    Relabel(Label),
}

#[derive(Debug)]
pub enum ParseError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// The predicted spans file does not contain a list.
    NotAList,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(io_err) => std::fmt::Display::fmt(io_err, f),
            Self::Json(json_err) => std::fmt::Display::fmt(json_err, f),
            Self::NotAList => write!(f, "The predicted spans must be a list"),
        }
    }
}
impl Error for ParseError {}

impl From<std::io::Error> for ParseError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
impl From<serde_json::Error> for ParseError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Returns the tab separated fields of a line, or `None` if the line must be skipped.
fn fields(line: &str, min_fields: usize) -> Option<Vec<&str>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let parts: Vec<&str> = line.split('\t').collect();
    if parts.len() < min_fields {
        return None;
    }
    Some(parts)
}

/// Parses the `LABEL START END` field. A discontinuous end (`14;20 25`) keeps the first range.
fn parse_label_and_offsets(field: &str) -> Option<(&str, usize, usize)> {
    let mut parts = field.split(' ');
    let label = parts.next().filter(|l| !l.is_empty())?;
    let start = parts.next()?.parse::<usize>().ok()?;
    let end = parts.next()?.split(';').next()?.parse::<usize>().ok()?;
    Some((label, start, end))
}

/// Parses the content of a gold annotation file. The returned entities borrow from `content`.
///
/// * `content`: Content of the `.ann` file
/// * `filter`: Which records to keep
pub fn parse_gold(content: &str, filter: GoldFilter) -> (Entities<'_>, ParseStats) {
    let mut stats = ParseStats::default();
    let mut entities = Vec::new();
    for line in content.lines() {
        let Some(parts) = fields(line, 3) else {
            stats.skipped_lines += 1;
            continue;
        };
        let Some((label, start, end)) = parse_label_and_offsets(parts[1]) else {
            debug!(line, "skipping gold record with unparseable offsets");
            stats.malformed += 1;
            continue;
        };
        let label: Cow<'_, str> = match filter {
            GoldFilter::All => Cow::Borrowed(label),
            GoldFilter::Only(kept) if label.eq_ignore_ascii_case(kept.as_str()) => {
                Cow::Borrowed(label)
            }
            GoldFilter::Only(_) => {
                stats.skipped_lines += 1;
                continue;
            }
            GoldFilter::Relabel(new_label) => Cow::Borrowed(new_label.as_str()),
        };
        match Entity::new(label, start, end, parts[2].trim()) {
            Ok(entity) => {
                stats.records += 1;
                entities.push(entity);
            }
            Err(e) => {
                debug!(line, error = %e, "skipping gold record");
                stats.malformed += 1;
            }
        }
    }
    (Entities(entities), stats)
}

/// Reads and parses a gold annotation file.
pub fn read_gold<P: AsRef<Path>>(
    path: P,
    filter: GoldFilter,
) -> Result<(Entities<'static>, ParseStats), ParseError> {
    let content = read_to_string(path)?;
    let (entities, stats) = parse_gold(&content, filter);
    Ok((entities.into_owned(), stats))
}

/// Parses the content of a vocabulary-linked annotation file into candidates. Only the code and
/// the vocabulary text of the info field are used.
pub fn parse_vocabulary(content: &str) -> (Vec<Candidate>, ParseStats) {
    let mut stats = ParseStats::default();
    let mut candidates = Vec::new();
    for line in content.lines() {
        let Some(parts) = fields(line, 2) else {
            stats.skipped_lines += 1;
            continue;
        };
        let mut info = parts[1].split('|');
        match (info.next(), info.next()) {
            (Some(code), Some(vocabulary_text)) => {
                stats.records += 1;
                candidates.push(Candidate::new(code.trim(), vocabulary_text.trim()));
            }
            _ => {
                debug!(line, "skipping vocabulary record without a code and a text");
                stats.malformed += 1;
            }
        }
    }
    (candidates, stats)
}

/// Reads and parses a vocabulary-linked annotation file.
pub fn read_vocabulary<P: AsRef<Path>>(path: P) -> Result<(Vec<Candidate>, ParseStats), ParseError> {
    let content = read_to_string(path)?;
    Ok(parse_vocabulary(&content))
}
