use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::ApiError;
use crate::model::{AnnotatedSentenceRow, ManifestoRecord};

#[derive(Debug, Deserialize)]
pub struct CoreVersionsResponse {
    #[serde(default)]
    pub datasets: Vec<CoreDatasetEntry>,
}

#[derive(Debug, Deserialize)]
pub struct CoreDatasetEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataVersionsResponse {
    #[serde(default)]
    pub versions: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataResponse {
    #[serde(default)]
    pub items: Vec<Map<String, Value>>,
    #[serde(default)]
    pub missing_items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct TextsResponse {
    #[serde(default)]
    pub items: Vec<TextDocument>,
    #[serde(default)]
    pub missing_items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct TextDocument {
    pub key: String,
    #[serde(default)]
    pub items: Vec<Map<String, Value>>,
}

/// Manifesto keys and party names selected from the core dataset.
#[derive(Debug, Default)]
pub struct CoreSelection {
    pub keys: Vec<String>,
    pub party_names: HashMap<u32, String>,
}

/// Renders a scalar JSON value the way it appears in a table cell.
///
/// Integral floats lose their fraction so `51320.0` keys as `51320`.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                Some(int.to_string())
            } else if let Some(uint) = number.as_u64() {
                Some(uint.to_string())
            } else {
                number.as_f64().map(|float| {
                    if float.fract() == 0.0 && float.abs() < 1e15 {
                        format!("{}", float as i64)
                    } else {
                        float.to_string()
                    }
                })
            }
        }
        other => Some(other.to_string()),
    }
}

pub fn value_u32(value: &Value) -> Option<u32> {
    value_text(value)?.trim().parse::<u32>().ok()
}

pub fn value_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_i64().map(|int| int != 0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Some(true),
            "false" | "f" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Picks the core dataset rows of the requested parties.
///
/// The table arrives as an array of arrays whose first row names the
/// columns. Keys are `<party>_<date>`, deduplicated in order of first
/// appearance.
pub fn select_core_rows(table: &[Vec<Value>], parties: &[u32]) -> Result<CoreSelection, ApiError> {
    let (header, rows) = table
        .split_first()
        .ok_or_else(|| ApiError::UnexpectedShape("core dataset is empty".into()))?;

    let column_index = |name: &str| {
        header
            .iter()
            .position(|cell| cell.as_str() == Some(name))
            .ok_or_else(|| ApiError::UnexpectedShape(format!("core dataset lacks `{name}` column")))
    };
    let party_col = column_index("party")?;
    let date_col = column_index("date")?;
    let name_col = header
        .iter()
        .position(|cell| cell.as_str() == Some("partyname"));

    let mut selection = CoreSelection::default();
    for row in rows {
        let Some(party) = row.get(party_col).and_then(value_u32) else {
            continue;
        };
        if !parties.contains(&party) {
            continue;
        }
        let Some(date) = row.get(date_col).and_then(value_u32) else {
            continue;
        };

        let key = format!("{party}_{date}");
        if !selection.keys.contains(&key) {
            selection.keys.push(key);
        }

        if let Some(name) = name_col.and_then(|col| row.get(col)).and_then(value_text) {
            selection.party_names.entry(party).or_insert(name);
        }
    }

    Ok(selection)
}

const KNOWN_METADATA_KEYS: [&str; 17] = [
    "manifesto_id",
    "party_id",
    "party",
    "election_date",
    "date",
    "url_original",
    "language",
    "source",
    "title",
    "annotations",
    "has_eu_code",
    "is_primary_doc",
    "may_contradict_core_dataset",
    "md5sum_text",
    "md5sum_original",
    "handbook",
    "is_copy_of",
];

/// Maps one metadata item onto a record. Fields that are missing or do not
/// parse stay `None`; the item is never rejected.
pub fn record_from_item(
    item: Map<String, Value>,
    party_names: &HashMap<u32, String>,
) -> ManifestoRecord {
    let field = |name: &str| item.get(name).filter(|value| !value.is_null());
    let text = |name: &str| field(name).and_then(value_text);
    let flag = |name: &str| field(name).and_then(value_bool);

    let party = field("party_id").or_else(|| field("party")).and_then(value_u32);
    let date = field("election_date")
        .or_else(|| field("date"))
        .and_then(value_u32);

    let mut record = ManifestoRecord {
        manifesto_id: text("manifesto_id"),
        party,
        date,
        partyname: party.and_then(|party| party_names.get(&party).cloned()),
        url_original: text("url_original"),
        language: text("language"),
        source: text("source"),
        title: text("title"),
        annotations: flag("annotations"),
        has_eu_code: flag("has_eu_code"),
        is_primary_doc: flag("is_primary_doc"),
        may_contradict_core_dataset: flag("may_contradict_core_dataset"),
        md5sum_text: text("md5sum_text"),
        md5sum_original: text("md5sum_original"),
        handbook: text("handbook"),
        is_copy_of: text("is_copy_of"),
        ..ManifestoRecord::default()
    };

    for (key, value) in item {
        if KNOWN_METADATA_KEYS.contains(&key.as_str()) {
            continue;
        }
        record.extra.insert(key, value);
    }

    record
}

/// Flattens one document of a texts response into positioned rows.
pub fn sentence_rows(document: TextDocument) -> Vec<AnnotatedSentenceRow> {
    document
        .items
        .into_iter()
        .enumerate()
        .map(|(index, item)| AnnotatedSentenceRow {
            manifesto_id: document.key.clone(),
            pos: index + 1,
            columns: item
                .into_iter()
                .map(|(column, value)| (column, value_text(&value).unwrap_or_default()))
                .collect(),
        })
        .collect()
}
