use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use super::template::{FieldType, FormTemplate};

/// Runtime value of one field. Serialized as the plain JSON shape the UI and
/// the backend exchange (string, number, boolean, string array, object).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
    StringList(Vec<String>),
    Signature(SignatureValue),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignatureValue {
    #[serde(default)]
    pub name: String,
    /// Data URL, filled in by the backend after the signature is attached.
    #[serde(default)]
    pub image: Option<String>,
}

impl FieldValue {
    pub fn default_for(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Text
            | FieldType::Email
            | FieldType::Number
            | FieldType::Select
            | FieldType::Textarea
            | FieldType::Other => Self::Text(String::new()),
            FieldType::Checkbox => Self::Bool(false),
            FieldType::Array => Self::StringList(Vec::new()),
            FieldType::Signature => Self::Signature(SignatureValue::default()),
        }
    }
}

/// Values keyed by `FieldDescriptor::key`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FormValues(BTreeMap<String, FieldValue>);

impl<'de> Deserialize<'de> for FormValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // `null` entries mean "not filled in yet".
        let raw = BTreeMap::<String, Option<FieldValue>>::deserialize(deserializer)?;
        Ok(Self(
            raw.into_iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .collect(),
        ))
    }
}

impl FormValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.0.insert(key.into(), value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    /// Fills every declared key that is missing with its type default.
    pub fn materialize(&mut self, template: &FormTemplate) {
        for field in template.fields() {
            self.0
                .entry(field.key.clone())
                .or_insert_with(|| FieldValue::default_for(field.field_type));
        }
    }

    pub fn from_json(value: &serde_json::Value) -> serde_json::Result<Self> {
        if value.is_null() {
            return Ok(Self::new());
        }
        Self::deserialize(value)
    }
}

impl FromIterator<(String, FieldValue)> for FormValues {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
