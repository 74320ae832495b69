//! Untyped records exchanged with repositories.
//!
//! A [`Record`] is a JSON object. Well-known keys (`id`, `status`, `locale`,
//! `translation_group_id`, `available_locales`) get typed accessors; every
//! other key is opaque to the framework. CMS-style records keep their content
//! under a nested `data` object, which field lookups consult after the top
//! level.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AdminError;

pub const ID: &str = "id";
pub const STATUS: &str = "status";
pub const LOCALE: &str = "locale";
pub const TRANSLATION_GROUP_ID: &str = "translation_group_id";
pub const AVAILABLE_LOCALES: &str = "available_locales";
pub const DATA: &str = "data";

/// Keyed map of JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Record id as a string. Numeric ids are stringified.
    pub fn id(&self) -> Option<String> {
        self.0.get(ID).and_then(value_to_string).filter(|s| !s.is_empty())
    }

    pub fn status(&self) -> Option<&str> {
        self.str_field(STATUS)
    }

    pub fn locale(&self) -> Option<&str> {
        self.str_field(LOCALE)
    }

    pub fn translation_group_id(&self) -> Option<&str> {
        self.str_field(TRANSLATION_GROUP_ID)
    }

    /// Translation group, falling back to the record's own id.
    pub fn group_or_id(&self) -> Option<String> {
        self.translation_group_id()
            .map(str::to_string)
            .or_else(|| self.id())
    }

    /// Raw `available_locales` entries (not normalized).
    pub fn available_locales(&self) -> Vec<String> {
        match self.0.get(AVAILABLE_LOCALES) {
            Some(Value::Array(items)) => items.iter().filter_map(value_to_string).collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Non-blank string value at a top-level key.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Nested `data` object, when the record carries one.
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.0.get(DATA).and_then(Value::as_object)
    }

    /// Resolve a dotted path against the top level only.
    pub fn lookup_path(&self, path: &str) -> Option<&Value> {
        lookup_in(&self.0, path)
    }

    /// Resolve a field: top level first, then inside `data`.
    pub fn field(&self, path: &str) -> Option<&Value> {
        self.lookup_path(path)
            .or_else(|| self.data().and_then(|data| lookup_in(data, path)))
    }

    /// Whether a field resolves to a present value (see [`is_present`]).
    pub fn has_present(&self, path: &str) -> bool {
        self.field(path).map(is_present).unwrap_or(false)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = AdminError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(AdminError::validation(format!(
                "record must be a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

/// Walk a dotted path through objects and array indexes.
pub fn lookup_in<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = map.get(first)?;
    for segment in segments {
        current = match current {
            Value::Object(obj) => obj.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Presence rule: strings when non-blank, collections when non-empty,
/// scalars always, null never.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Stringify scalar values; `None` for null and collections.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page() -> Record {
        Record::try_from(json!({
            "id": "page_1",
            "status": "draft",
            "locale": "en",
            "available_locales": ["en", "ES"],
            "title": "Home",
            "data": {"summary": "", "seo": {"title": "Home | Site"}, "tags": []}
        }))
        .unwrap()
    }

    #[test]
    fn test_well_known_accessors() {
        let record = page();
        assert_eq!(record.id().as_deref(), Some("page_1"));
        assert_eq!(record.status(), Some("draft"));
        assert_eq!(record.locale(), Some("en"));
        assert_eq!(record.translation_group_id(), None);
        assert_eq!(record.group_or_id().as_deref(), Some("page_1"));
        assert_eq!(record.available_locales(), vec!["en", "ES"]);
    }

    #[test]
    fn test_numeric_id_is_stringified() {
        let record = Record::new().with("id", 42);
        assert_eq!(record.id().as_deref(), Some("42"));
    }

    #[test]
    fn test_field_lookup_falls_back_to_data() {
        let record = page();
        assert_eq!(record.field("title"), Some(&json!("Home")));
        assert_eq!(record.field("seo.title"), Some(&json!("Home | Site")));
        assert!(record.has_present("seo.title"));
        assert!(!record.has_present("summary"));
        assert!(!record.has_present("tags"));
        assert!(!record.has_present("missing"));
    }

    #[test]
    fn test_non_object_is_rejected() {
        let err = Record::try_from(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("array"));
    }
}
