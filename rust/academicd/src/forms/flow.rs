//! Fill → sign → submit orchestration for one form.
//!
//! A flow owns every piece of in-memory state for one open form: the
//! values, the captured ink and the id of the instance once the backend has
//! it. Ink only ever exists while the flow is in `Signing`.

use serde::Serialize;
use thiserror::Error;

use super::render::{apply_edit, EditError, FieldEdit};
use super::schema::{compile, Schema, ValidationIssue};
use super::serialize::{serialize, LIST_SEPARATOR};
use super::template::{FieldType, FormTemplate};
use super::value::{FieldValue, FormValues};
use crate::api::{ApiError, FormInstance, FormsApi};

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowState {
    Editing,
    Signing,
    Submitting,
    Done,
    Cancelled,
}

impl FlowState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Editing => "editing",
            Self::Signing => "signing",
            Self::Submitting => "submitting",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FlowMode {
    Create,
    Update { instance_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeLevel {
    Loading,
    Success,
    Error,
}

/// A toast for the embedding UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// `P.term` + `P.subjects` shown on the signing step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebtSummary {
    pub group: String,
    pub term: String,
    pub subjects: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("{} field(s) failed validation", .0.len())]
    Validation(Vec<ValidationIssue>),
    #[error("signature required")]
    SignatureMissing,
    #[error("signature image must be a PNG")]
    InvalidSignatureImage,
    /// Create/update was refused; nothing was saved.
    #[error("{0}")]
    Remote(String),
    /// The instance exists on the backend but the signature is not attached.
    #[error("form saved, but attaching the signature failed: {message}")]
    SignatureAttach { instance_id: String, message: String },
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: FlowState,
    },
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("instance {instance_id} is {status} and can no longer be changed")]
    NotPending {
        instance_id: String,
        status: &'static str,
    },
    #[error(transparent)]
    Edit(#[from] EditError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub instance_id: String,
    pub signature_key: String,
}

#[derive(Debug)]
pub struct SubmissionFlow {
    id: String,
    template: FormTemplate,
    schema: Schema,
    mode: FlowMode,
    values: FormValues,
    state: FlowState,
    signature_key: String,
    signature_png: Option<Vec<u8>>,
    instance_id: Option<String>,
    /// The backend holds the current values; only the signature is missing.
    saved: bool,
    debt: Vec<DebtSummary>,
    notices: Vec<Notice>,
}

impl SubmissionFlow {
    /// New submission of `template`. `fallback_signature_key` is used as
    /// `keyInsert` when the template declares no signature field.
    pub fn create(template: FormTemplate, fallback_signature_key: &str) -> Self {
        let mut values = FormValues::new();
        values.materialize(&template);
        Self::build(template, FlowMode::Create, values, None, fallback_signature_key)
    }

    /// Edit-and-resign of an existing instance. Only pending instances qualify.
    pub fn update(
        template: FormTemplate,
        instance: &FormInstance,
        fallback_signature_key: &str,
    ) -> Result<Self, FlowError> {
        if !instance.is_pending() {
            return Err(FlowError::NotPending {
                instance_id: instance.id.clone(),
                status: instance.approve_status().as_str(),
            });
        }
        let values = hydrate(&template, &instance.responses);
        Ok(Self::build(
            template,
            FlowMode::Update {
                instance_id: instance.id.clone(),
            },
            values,
            Some(instance.id.clone()),
            fallback_signature_key,
        ))
    }

    fn build(
        template: FormTemplate,
        mode: FlowMode,
        values: FormValues,
        instance_id: Option<String>,
        fallback_signature_key: &str,
    ) -> Self {
        let signature_key = template
            .fields()
            .find(|f| f.field_type == FieldType::Signature)
            .map(|f| f.key.clone())
            .unwrap_or_else(|| fallback_signature_key.to_string());
        let schema = compile(&template);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            template,
            schema,
            mode,
            values,
            state: FlowState::Editing,
            signature_key,
            signature_png: None,
            instance_id,
            saved: false,
            debt: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn mode(&self) -> &FlowMode {
        &self.mode
    }

    pub fn template(&self) -> &FormTemplate {
        &self.template
    }

    pub fn values(&self) -> &FormValues {
        &self.values
    }

    pub fn signature_key(&self) -> &str {
        &self.signature_key
    }

    pub fn has_signature(&self) -> bool {
        self.signature_png.is_some()
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    pub fn debt_summaries(&self) -> &[DebtSummary] {
        &self.debt
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn require(&self, expected: FlowState, action: &'static str) -> Result<(), FlowError> {
        if self.state != expected {
            return Err(FlowError::InvalidState {
                action,
                state: self.state,
            });
        }
        Ok(())
    }

    fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.notices.push(Notice {
            level,
            message: message.into(),
        });
    }

    fn enter_editing(&mut self) {
        self.state = FlowState::Editing;
        self.signature_png = None;
        self.debt.clear();
    }

    pub fn edit(&mut self, key: &str, edit: FieldEdit) -> Result<&FieldValue, FlowError> {
        self.require(FlowState::Editing, "edit")?;
        let field = self
            .template
            .field(key)
            .ok_or_else(|| FlowError::UnknownField(key.to_string()))?;
        let next = apply_edit(field, self.values.get(key), edit)?;
        self.values.insert(key, next);
        self.saved = false;
        self.values
            .get(key)
            .ok_or_else(|| FlowError::UnknownField(key.to_string()))
    }

    /// Replaces the values wholesale. Undeclared keys are kept but never sent.
    pub fn set_values(&mut self, mut values: FormValues) -> Result<(), FlowError> {
        self.require(FlowState::Editing, "set values")?;
        values.materialize(&self.template);
        self.values = values;
        self.saved = false;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Vec<ValidationIssue>> {
        self.schema.validate(&self.values)
    }

    /// Editing → Signing once the values pass the schema.
    pub fn advance(&mut self) -> Result<(), FlowError> {
        self.require(FlowState::Editing, "advance")?;
        self.validate().map_err(FlowError::Validation)?;
        self.flatten_lists();
        self.debt = debt_summaries(&self.template, &self.values);
        self.state = FlowState::Signing;
        Ok(())
    }

    /// Signing → Editing. The ink is discarded.
    pub fn back(&mut self) -> Result<(), FlowError> {
        self.require(FlowState::Signing, "go back")?;
        self.enter_editing();
        Ok(())
    }

    pub fn capture_signature(&mut self, png: Vec<u8>) -> Result<(), FlowError> {
        self.require(FlowState::Signing, "capture a signature")?;
        if png.is_empty() {
            return Err(FlowError::SignatureMissing);
        }
        if !png.starts_with(&PNG_MAGIC) {
            return Err(FlowError::InvalidSignatureImage);
        }
        self.signature_png = Some(png);
        Ok(())
    }

    pub fn clear_signature(&mut self) -> Result<(), FlowError> {
        self.require(FlowState::Signing, "clear the signature")?;
        self.signature_png = None;
        Ok(())
    }

    /// Signing → Submitting → Done.
    ///
    /// Saves the responses (create, or update when the instance already
    /// exists), then attaches the ink. When a previous attempt saved the
    /// responses and only the attach failed, only the attach is retried.
    pub fn submit(&mut self, api: &dyn FormsApi) -> Result<SubmitOutcome, FlowError> {
        self.require(FlowState::Signing, "submit")?;
        let Some(png) = self.signature_png.take() else {
            self.notify(NoticeLevel::Error, "Signature required");
            return Err(FlowError::SignatureMissing);
        };
        self.state = FlowState::Submitting;
        self.notify(NoticeLevel::Loading, "Submitting form...");

        if !(self.saved && self.instance_id.is_some()) {
            let payload = serialize(&self.template, &self.values);
            let saved = match self.instance_id.as_deref() {
                Some(id) => api.update_instance(id, &self.template.id, &payload),
                None => api.create_instance(&self.template.id, &payload),
            };
            match saved {
                Ok(instance) => {
                    tracing::info!(flow = %self.id, instance = %instance.id, "form responses saved");
                    self.instance_id = Some(instance.id);
                    self.saved = true;
                }
                Err(e) => {
                    let message = remote_message(&e);
                    tracing::warn!(flow = %self.id, error = %e, "saving form responses failed");
                    self.enter_editing();
                    self.notify(NoticeLevel::Error, message.clone());
                    return Err(FlowError::Remote(message));
                }
            }
        }

        let instance_id = self.instance_id.clone().unwrap_or_default();
        match api.attach_signature(&instance_id, &self.signature_key, &png) {
            Ok(()) => {
                tracing::info!(flow = %self.id, instance = %instance_id, "signature attached");
                self.state = FlowState::Done;
                self.notify(NoticeLevel::Success, "Form submitted");
                Ok(SubmitOutcome {
                    instance_id,
                    signature_key: self.signature_key.clone(),
                })
            }
            Err(e) => {
                let message = remote_message(&e);
                tracing::warn!(flow = %self.id, instance = %instance_id, error = %e, "attaching signature failed");
                self.state = FlowState::Signing;
                self.notify(
                    NoticeLevel::Error,
                    format!(
                        "Form saved, but attaching the signature failed: {}. Please sign again.",
                        message
                    ),
                );
                Err(FlowError::SignatureAttach {
                    instance_id,
                    message,
                })
            }
        }
    }

    /// Drops all in-memory state. No network calls.
    pub fn cancel(&mut self) -> Result<(), FlowError> {
        match self.state {
            FlowState::Editing | FlowState::Signing => {
                self.signature_png = None;
                self.values = FormValues::new();
                self.debt.clear();
                self.state = FlowState::Cancelled;
                Ok(())
            }
            state => Err(FlowError::InvalidState {
                action: "cancel",
                state,
            }),
        }
    }

    fn flatten_lists(&mut self) {
        for field in self.template.fields() {
            if field.field_type != FieldType::Array {
                continue;
            }
            if let Some(FieldValue::StringList(items)) = self.values.get(&field.key) {
                let compact = items
                    .iter()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                self.values
                    .insert(field.key.clone(), FieldValue::StringList(compact));
            }
        }
    }
}

fn remote_message(e: &ApiError) -> String {
    match e {
        ApiError::Rejected { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// Stored responses carry arrays comma-joined; turn them back into lists
/// for editing.
fn hydrate(template: &FormTemplate, responses: &FormValues) -> FormValues {
    let mut values = responses.clone();
    for field in template.fields() {
        if field.field_type != FieldType::Array {
            continue;
        }
        if let Some(FieldValue::Text(joined)) = values.get(&field.key) {
            let items = if joined.is_empty() {
                Vec::new()
            } else {
                joined.split(LIST_SEPARATOR).map(str::to_string).collect()
            };
            values.insert(field.key.clone(), FieldValue::StringList(items));
        }
    }
    values.materialize(template);
    values
}

fn debt_summaries(template: &FormTemplate, values: &FormValues) -> Vec<DebtSummary> {
    let mut out = Vec::new();
    for field in template.fields() {
        if field.field_type != FieldType::Array {
            continue;
        }
        let Some(group) = field.key.strip_suffix(".subjects") else {
            continue;
        };
        let term_key = format!("{}.term", group);
        if template.field(&term_key).is_none() {
            continue;
        }
        let term = match values.get(&term_key) {
            Some(FieldValue::Text(s)) => s.trim().to_string(),
            Some(FieldValue::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let subjects = match values.get(&field.key) {
            Some(FieldValue::StringList(items)) => items.clone(),
            _ => Vec::new(),
        };
        out.push(DebtSummary {
            group: group.to_string(),
            summary: format!("{}: {}", term, subjects.join(", ")),
            term,
            subjects,
        });
    }
    out
}
