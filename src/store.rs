use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{Number, StoreSettings};
use crate::error::{PipelineError, Result};
use crate::record::{Dataset, Record};

/// Value of the coloring attribute on a stored point, before defaulting.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Missing,
    Number(f64),
    /// Present but not numeric; carries the kind that was found.
    NonNumeric(String),
}

/// A point as returned by a store, before integrity checks.
#[derive(Debug, Clone)]
pub struct StoredPoint {
    pub id: String,
    pub vector: Option<Vec<Number>>,
    pub attribute: AttributeValue,
}

#[derive(Debug, Clone)]
pub struct ScrollRequest {
    pub collection: String,
    pub limit: usize,
    pub attribute_key: String,
    pub vector_name: Option<String>,
}

impl ScrollRequest {
    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self {
            collection: settings.collection_name.clone(),
            limit: settings.fetch_limit,
            attribute_key: settings.attribute_key.clone(),
            vector_name: settings.vector_name.clone(),
        }
    }
}

/// A read-only source of points. One call returns one bounded page.
pub trait VectorStore {
    fn scroll(&mut self, request: &ScrollRequest) -> Result<Vec<StoredPoint>>;
}

/// Fetch one page from `store` and turn it into a [`Dataset`].
///
/// At most `request.limit` records are kept. A missing attribute becomes
/// `0.0`. Points without a vector, with a dimensionality that differs from
/// the first point, or with non-finite components abort the fetch.
pub fn fetch_dataset<S: VectorStore + ?Sized>(store: &mut S, request: &ScrollRequest) -> Result<Dataset> {
    if request.limit == 0 {
        debug!("Fetch limit is 0, skipping scroll");
        return Ok(Dataset::default());
    }

    let mut points = store.scroll(request)?;
    if points.len() > request.limit {
        warn!(
            "Store returned {} points for a limit of {}, truncating",
            points.len(),
            request.limit
        );
        points.truncate(request.limit);
    }

    let mut expected: Option<usize> = None;
    let records = points
        .into_iter()
        .map(|point| {
            let record = resolve_point(point, &request.attribute_key)?;
            let found = record.vector.len();
            let expected = *expected.get_or_insert(found);
            if found == 0 || found != expected {
                return Err(PipelineError::DimensionMismatch {
                    id: record.id,
                    expected: expected.max(1),
                    found,
                });
            }
            Ok(record)
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        "Fetched {} records of dimension {}",
        records.len(),
        expected.unwrap_or(0)
    );
    Ok(Dataset::new(records))
}

fn resolve_point(point: StoredPoint, attribute_key: &str) -> Result<Record> {
    let StoredPoint { id, vector, attribute } = point;

    let vector = match vector {
        Some(vector) => vector,
        None => return Err(PipelineError::MissingVector { id }),
    };
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(PipelineError::NonFiniteVector { id });
    }

    let scalar_attribute = match attribute {
        AttributeValue::Missing => 0.0,
        AttributeValue::Number(value) if value.is_finite() => value,
        AttributeValue::Number(value) => {
            return Err(PipelineError::NonNumericAttribute {
                id,
                key: attribute_key.to_string(),
                found: value.to_string(),
            })
        }
        AttributeValue::NonNumeric(found) => {
            return Err(PipelineError::NonNumericAttribute {
                id,
                key: attribute_key.to_string(),
                found,
            })
        }
    };

    Ok(Record {
        id,
        vector,
        scalar_attribute,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonlVector {
    Plain(Vec<Number>),
    Named(HashMap<String, Vec<Number>>),
}

#[derive(Deserialize)]
struct JsonlPoint {
    id: Option<serde_json::Value>,
    vector: Option<JsonlVector>,
    #[serde(default)]
    payload: serde_json::Map<String, serde_json::Value>,
}

/// Reads points from a JSON-lines file, one
/// `{"id": .., "vector": [..], "payload": {..}}` object per line. With a
/// `vector_name`, `vector` is an object of named vectors instead.
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn input_error(&self, source: std::io::Error) -> PipelineError {
        PipelineError::Input {
            path: self.path.clone(),
            source,
        }
    }
}

impl VectorStore for JsonlStore {
    fn scroll(&mut self, request: &ScrollRequest) -> Result<Vec<StoredPoint>> {
        let file = File::open(&self.path).map_err(|e| self.input_error(e))?;
        let reader = BufReader::new(file);
        let mut points = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            if points.len() >= request.limit {
                break;
            }
            let line = line.map_err(|e| self.input_error(e))?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: JsonlPoint =
                serde_json::from_str(&line).map_err(|source| PipelineError::MalformedInput {
                    path: self.path.clone(),
                    line: index + 1,
                    source,
                })?;

            let vector = match (parsed.vector, &request.vector_name) {
                (Some(JsonlVector::Plain(vector)), None) => Some(vector),
                (Some(JsonlVector::Named(mut named)), Some(name)) => named.remove(name),
                _ => None,
            };

            points.push(StoredPoint {
                id: parsed.id.map_or_else(|| (index + 1).to_string(), json_id),
                vector,
                attribute: json_attribute(parsed.payload.get(&request.attribute_key)),
            });
        }

        Ok(points)
    }
}

fn json_id(id: serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

fn json_attribute(value: Option<&serde_json::Value>) -> AttributeValue {
    use serde_json::Value;
    match value {
        None | Some(Value::Null) => AttributeValue::Missing,
        Some(Value::Number(n)) => n
            .as_f64()
            .map_or_else(|| AttributeValue::NonNumeric(n.to_string()), AttributeValue::Number),
        Some(Value::Bool(_)) => AttributeValue::NonNumeric("a boolean".to_string()),
        Some(Value::String(_)) => AttributeValue::NonNumeric("a string".to_string()),
        Some(Value::Array(_)) => AttributeValue::NonNumeric("a list".to_string()),
        Some(Value::Object(_)) => AttributeValue::NonNumeric("an object".to_string()),
    }
}
