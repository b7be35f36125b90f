//! Case-folded view of a log record.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// A log record as the matcher sees it: every attribute name lowercased,
/// every value a string.
///
/// Strings are taken verbatim, any other JSON value as its compact JSON text
/// (`4688`, `true`, `null`, `["a","b"]`). Nested objects are also reachable
/// through dotted keys (`process.name`); a literal top-level key always wins
/// over a flattened one.
#[derive(Debug, Clone, Default)]
pub struct NormalizedRecord {
    fields: HashMap<String, FieldText>,
}

#[derive(Debug, Clone)]
struct FieldText {
    original: String,
    folded: String,
}

impl FieldText {
    fn new(original: String) -> Self {
        let folded = original.to_lowercase();
        FieldText { original, folded }
    }
}

impl NormalizedRecord {
    /// Normalize any JSON value. Non-objects normalize to an empty record.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::from_map(map),
            _ => Self::default(),
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut fields = HashMap::with_capacity(map.len());
        for (key, value) in map {
            fields.insert(key.to_lowercase(), FieldText::new(value_text(value)));
        }

        let mut record = NormalizedRecord { fields };
        for (key, value) in map {
            if let Value::Object(child) = value {
                record.flatten(&key.to_lowercase(), child);
            }
        }
        record
    }

    fn flatten(&mut self, prefix: &str, map: &Map<String, Value>) {
        for (key, value) in map {
            let path = format!("{prefix}.{}", key.to_lowercase());
            if let Value::Object(child) = value {
                self.flatten(&path, child);
            }
            self.fields
                .entry(path)
                .or_insert_with(|| FieldText::new(value_text(value)));
        }
    }

    /// Lowercased value of `attribute`, or `""` when absent.
    pub fn get(&self, attribute: &str) -> &str {
        self.fields
            .get(attribute)
            .map(|f| f.folded.as_str())
            .unwrap_or("")
    }

    /// Value of `attribute` before case folding, or `""` when absent.
    pub fn get_original(&self, attribute: &str) -> &str {
        self.fields
            .get(attribute)
            .map(|f| f.original.as_str())
            .unwrap_or("")
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.fields.contains_key(attribute)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
