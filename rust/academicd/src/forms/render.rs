use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::schema::ValidationIssue;
use super::serialize::LIST_SEPARATOR;
use super::template::{FieldDescriptor, FieldType, FormTemplate, SelectOption};
use super::value::{FieldValue, FormValues, SignatureValue};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedForm {
    pub template_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sections: Vec<RenderedSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedSection {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub fields: Vec<RenderedField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedField {
    pub key: String,
    pub label: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(flatten)]
    pub control: Control,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Email,
    Number,
}

/// The input control the UI should draw for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "control", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Control {
    Input {
        input_type: InputType,
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        min_length: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    TextArea {
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
    },
    /// `selected: None` is "no selection".
    Select {
        options: Vec<SelectOption>,
        selected: Option<String>,
    },
    Checkbox {
        checked: bool,
    },
    List {
        items: Vec<String>,
        can_remove: bool,
    },
    /// Captures the signer's name only. The image arrives through the
    /// separate signing step.
    SignatureName {
        name: String,
        signed: bool,
    },
}

/// A change coming from a control. Applied with [`apply_edit`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FieldEdit {
    Set { value: FieldValue },
    Check { checked: bool },
    Select { value: Option<String> },
    ListSet { index: usize, value: String },
    ListAppend,
    ListRemove { index: usize },
    SignerName { name: String },
}

impl FieldEdit {
    fn name(&self) -> &'static str {
        match self {
            Self::Set { .. } => "set",
            Self::Check { .. } => "check",
            Self::Select { .. } => "select",
            Self::ListSet { .. } => "listSet",
            Self::ListAppend => "listAppend",
            Self::ListRemove { .. } => "listRemove",
            Self::SignerName { .. } => "signerName",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditError {
    #[error("edit `{op}` does not apply to {field_type} field `{key}`")]
    Mismatch {
        key: String,
        field_type: &'static str,
        op: &'static str,
    },
    #[error("index {index} out of range for `{key}` ({len} items)")]
    IndexOutOfRange {
        key: String,
        index: usize,
        len: usize,
    },
    #[error("`{value}` is not an option of `{key}`")]
    UnknownOption { key: String, value: String },
}

pub fn render_form(
    template: &FormTemplate,
    values: &FormValues,
    issues: &[ValidationIssue],
) -> RenderedForm {
    let sections = template
        .sections
        .iter()
        .map(|section| RenderedSection {
            id: section.id.clone(),
            title: section.title.clone(),
            fields: section
                .fields
                .iter()
                .map(|field| RenderedField {
                    key: field.key.clone(),
                    label: field.display_label().to_string(),
                    required: field.required,
                    row: field.row,
                    column: field.column,
                    placeholder: field.placeholder.clone(),
                    control: render_field(field, values.get(&field.key)),
                    error: issues
                        .iter()
                        .find(|i| i.key == field.key)
                        .map(|i| i.message.clone()),
                })
                .collect(),
        })
        .collect();
    RenderedForm {
        template_id: template.id.clone(),
        title: template.title.clone(),
        description: template.description.clone(),
        sections,
    }
}

pub fn render_field(field: &FieldDescriptor, value: Option<&FieldValue>) -> Control {
    match field.field_type {
        FieldType::Text | FieldType::Other => input(field, InputType::Text, value),
        FieldType::Email => input(field, InputType::Email, value),
        FieldType::Number => input(field, InputType::Number, value),
        FieldType::Textarea => Control::TextArea {
            value: scalar(value),
            max_length: field.max_length,
        },
        FieldType::Select => {
            let selected = scalar(value);
            Control::Select {
                options: field
                    .options
                    .iter()
                    .filter(|o| !o.value.is_empty())
                    .cloned()
                    .collect(),
                selected: (!selected.is_empty()).then_some(selected),
            }
        }
        FieldType::Checkbox => Control::Checkbox {
            checked: matches!(value, Some(FieldValue::Bool(true))),
        },
        FieldType::Array => {
            let items = list_items(value);
            Control::List {
                can_remove: !items.is_empty(),
                items,
            }
        }
        FieldType::Signature => {
            let sig = signature(value);
            Control::SignatureName {
                name: sig.name,
                signed: sig.image.is_some(),
            }
        }
    }
}

/// Returns the field's next value. `current` is never modified.
pub fn apply_edit(
    field: &FieldDescriptor,
    current: Option<&FieldValue>,
    edit: FieldEdit,
) -> Result<FieldValue, EditError> {
    let op = edit.name();
    let mismatch = || EditError::Mismatch {
        key: field.key.clone(),
        field_type: field.field_type.as_str(),
        op,
    };
    match (field.field_type, edit) {
        (
            FieldType::Text | FieldType::Email | FieldType::Textarea | FieldType::Other,
            FieldEdit::Set { value },
        ) => match value {
            FieldValue::Text(s) => Ok(FieldValue::Text(s)),
            FieldValue::Number(n) => Ok(FieldValue::Text(n.to_string())),
            _ => Err(mismatch()),
        },
        (FieldType::Number, FieldEdit::Set { value }) => match value {
            v @ (FieldValue::Text(_) | FieldValue::Number(_)) => Ok(v),
            _ => Err(mismatch()),
        },
        (FieldType::Checkbox, FieldEdit::Check { checked }) => Ok(FieldValue::Bool(checked)),
        (FieldType::Select, FieldEdit::Select { value: None }) => Ok(FieldValue::Text(String::new())),
        (FieldType::Select, FieldEdit::Select { value: Some(v) }) => {
            if v.is_empty() {
                return Ok(FieldValue::Text(String::new()));
            }
            if !field.options.is_empty() && !field.options.iter().any(|o| o.value == v) {
                return Err(EditError::UnknownOption {
                    key: field.key.clone(),
                    value: v,
                });
            }
            Ok(FieldValue::Text(v))
        }
        (FieldType::Array, FieldEdit::ListSet { index, value }) => {
            let mut items = list_items(current);
            let len = items.len();
            let slot = items.get_mut(index).ok_or_else(|| EditError::IndexOutOfRange {
                key: field.key.clone(),
                index,
                len,
            })?;
            *slot = value;
            Ok(FieldValue::StringList(items))
        }
        (FieldType::Array, FieldEdit::ListAppend) => {
            let mut items = list_items(current);
            items.push(String::new());
            Ok(FieldValue::StringList(items))
        }
        (FieldType::Array, FieldEdit::ListRemove { index }) => {
            let mut items = list_items(current);
            if index >= items.len() {
                return Err(EditError::IndexOutOfRange {
                    key: field.key.clone(),
                    index,
                    len: items.len(),
                });
            }
            items.remove(index);
            Ok(FieldValue::StringList(items))
        }
        (FieldType::Signature, FieldEdit::SignerName { name }) => {
            let mut sig = signature(current);
            sig.name = name;
            Ok(FieldValue::Signature(sig))
        }
        _ => Err(mismatch()),
    }
}

fn input(field: &FieldDescriptor, input_type: InputType, value: Option<&FieldValue>) -> Control {
    let numeric = input_type == InputType::Number;
    Control::Input {
        input_type,
        value: scalar(value),
        min_length: if numeric { None } else { field.min_length },
        max_length: if numeric { None } else { field.max_length },
        min: if numeric { field.min } else { None },
        max: if numeric { field.max } else { None },
    }
}

fn scalar(value: Option<&FieldValue>) -> String {
    match value {
        Some(FieldValue::Text(s)) => s.clone(),
        Some(FieldValue::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn list_items(value: Option<&FieldValue>) -> Vec<String> {
    match value {
        Some(FieldValue::StringList(items)) => items.clone(),
        Some(FieldValue::Text(s)) if !s.is_empty() => {
            s.split(LIST_SEPARATOR).map(str::to_string).collect()
        }
        _ => Vec::new(),
    }
}

fn signature(value: Option<&FieldValue>) -> SignatureValue {
    match value {
        Some(FieldValue::Signature(sig)) => sig.clone(),
        Some(FieldValue::Text(name)) => SignatureValue {
            name: name.clone(),
            image: None,
        },
        _ => SignatureValue::default(),
    }
}
