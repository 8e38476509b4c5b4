/*!
Reading and writing of the predicted spans interchange file. The file holds a JSON list whose items
are either `[label, start, end, text]`, `[label, text]` or `{"label", "start", "end", "text"}`
objects. Items of any other shape are counted as malformed and skipped.
*/
use crate::entity::parsing::{ParseError, ParseStats};
use crate::entity::{Entities, Entity, EntityError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    fs::{read_to_string, File},
    io::{BufWriter, Write},
    path::Path,
};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpanRecord {
    Full(String, Option<usize>, Option<usize>, String),
    Bare(String, String),
    Object {
        #[serde(alias = "entity_group", alias = "entity")]
        label: String,
        #[serde(default)]
        start: Option<usize>,
        #[serde(default)]
        end: Option<usize>,
        #[serde(alias = "word")]
        text: String,
    },
}

impl SpanRecord {
    fn into_entity(self) -> Result<Entity<'static>, EntityError> {
        let (label, start, end, text) = match self {
            SpanRecord::Full(label, start, end, text) => (label, start, end, text),
            SpanRecord::Bare(label, text) => (label, None, None, text),
            SpanRecord::Object {
                label,
                start,
                end,
                text,
            } => (label, start, end, text),
        };
        match start.zip(end) {
            Some((start, end)) => Entity::new(label, start, end, text),
            None => Ok(Entity::without_offsets(label, text)),
        }
    }
}

/// Parses the content of a predicted spans file.
///
/// Returns an error if the content is not valid JSON or is not a list. Items that cannot be turned
/// into an entity are skipped and counted in `ParseStats::malformed`.
pub fn parse_predicted_spans(content: &str) -> Result<(Entities<'static>, ParseStats), ParseError> {
    let Value::Array(items) = serde_json::from_str::<Value>(content)? else {
        return Err(ParseError::NotAList);
    };
    let mut stats = ParseStats::default();
    let mut entities = Vec::with_capacity(items.len());
    for item in items {
        let entity = serde_json::from_value::<SpanRecord>(item)
            .map_err(|e| e.to_string())
            .and_then(|record| record.into_entity().map_err(|e| e.to_string()));
        match entity {
            Ok(entity) => {
                stats.records += 1;
                entities.push(entity);
            }
            Err(reason) => {
                debug!(%reason, "skipping malformed predicted span");
                stats.malformed += 1;
            }
        }
    }
    Ok((Entities(entities), stats))
}

/// Reads and parses a predicted spans file.
pub fn read_predicted_spans<P: AsRef<Path>>(
    path: P,
) -> Result<(Entities<'static>, ParseStats), ParseError> {
    let content = read_to_string(path)?;
    parse_predicted_spans(&content)
}

/// Writes the entities as a predicted spans file, one `[label, start, end, text]` list per entity.
/// Absent offsets are written as `null`.
pub fn write_predicted_spans<P: AsRef<Path>>(path: P, entities: &[Entity]) -> Result<(), ParseError> {
    let records: Vec<Value> = entities
        .iter()
        .map(|e| json!([e.label(), e.start(), e.end(), e.text()]))
        .collect();
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &records)?;
    writer.flush()?;
    Ok(())
}
