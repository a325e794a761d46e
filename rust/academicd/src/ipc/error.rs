use serde_json::{json, Value};

use crate::api::ApiError;
use crate::forms::flow::FlowError;

pub fn ok(id: &str, result: Value) -> Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Failure of one handler, rendered with [`err`].
#[derive(Debug)]
pub struct HandlerError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

pub type HandlerResult = Result<Value, HandlerError>;

impl HandlerError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    /// Adds `key` to the details object, creating it if needed.
    pub fn detail(mut self, key: &str, value: Value) -> Self {
        let mut details = self.details.take().unwrap_or_else(|| json!({}));
        if let Some(obj) = details.as_object_mut() {
            obj.insert(key.to_string(), value);
        }
        self.details = Some(details);
        self
    }
}

pub fn respond(id: &str, result: HandlerResult) -> Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => err(id, e.code, e.message, e.details),
    }
}

impl From<ApiError> for HandlerError {
    fn from(e: ApiError) -> Self {
        match &e {
            ApiError::Rejected { status, .. } => {
                let status = *status;
                Self::new("remote_rejected", e.to_string()).detail("status", json!(status))
            }
            ApiError::Transport(_) => Self::new("backend_unreachable", e.to_string()),
            ApiError::Decode(_) => Self::new("remote_bad_response", e.to_string()),
            ApiError::Config(_) => Self::new("bad_config", e.to_string()),
        }
    }
}

impl From<FlowError> for HandlerError {
    fn from(e: FlowError) -> Self {
        let message = e.to_string();
        match e {
            FlowError::Validation(issues) => {
                Self::new("validation_failed", message).detail("issues", json!(issues))
            }
            FlowError::SignatureMissing => Self::new("signature_missing", message),
            FlowError::InvalidSignatureImage => Self::new("bad_params", message),
            FlowError::Remote(_) => Self::new("remote_rejected", message),
            FlowError::SignatureAttach { instance_id, .. } => {
                Self::new("signature_attach_failed", message).detail("instanceId", json!(instance_id))
            }
            FlowError::InvalidState { state, .. } => {
                Self::new("invalid_state", message).detail("state", json!(state))
            }
            FlowError::UnknownField(key) => Self::new("not_found", message).detail("key", json!(key)),
            FlowError::NotPending { .. } => Self::new("not_pending", message),
            FlowError::Edit(_) => Self::new("bad_params", message),
        }
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(e: anyhow::Error) -> Self {
        Self::new("db_query_failed", format!("{e:#}"))
    }
}
