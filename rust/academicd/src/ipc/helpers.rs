use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

use super::error::HandlerError;
use super::types::{AppState, Request};
use crate::db;
use crate::forms::schema::compile;
use crate::forms::{FormTemplate, FormValues};

pub fn require_str(req: &Request, key: &str) -> Result<String, HandlerError> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(HandlerError::bad_params(format!("{} must not be empty", key))),
        None => Err(HandlerError::bad_params(format!("missing params.{}", key))),
    }
}

pub fn opt_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn require_db(state: &AppState) -> Result<&rusqlite::Connection, HandlerError> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerError::new("no_workspace", "select a workspace first"))
}

pub fn parse_values(req: &Request) -> Result<FormValues, HandlerError> {
    let raw = req.params.get("values").unwrap_or(&Value::Null);
    FormValues::from_json(raw)
        .map_err(|e| HandlerError::bad_params(format!("invalid params.values: {}", e)))
}

/// Template from `params.template` (inline) or `params.templateId` (cache,
/// then backend).
pub fn resolve_template(state: &mut AppState, req: &Request) -> Result<FormTemplate, HandlerError> {
    if let Some(raw) = req.params.get("template").filter(|v| !v.is_null()) {
        return serde_json::from_value::<FormTemplate>(raw.clone())
            .map_err(|e| HandlerError::bad_params(format!("invalid params.template: {}", e)));
    }
    let Some(template_id) = opt_str(req, "templateId") else {
        return Err(HandlerError::bad_params("missing params.template or params.templateId"));
    };
    template_by_id(state, &template_id)
}

/// Cached copy first, then the backend.
pub fn template_by_id(state: &mut AppState, template_id: &str) -> Result<FormTemplate, HandlerError> {
    if let Some(conn) = state.db.as_ref() {
        if let Some(t) = db::template_get(conn, template_id)? {
            return Ok(t);
        }
    }
    fetch_and_cache_template(state, template_id)
}

pub fn fetch_and_cache_template(
    state: &mut AppState,
    template_id: &str,
) -> Result<FormTemplate, HandlerError> {
    let template = state.ensure_api()?.fetch_template(template_id)?;
    if let Some(conn) = state.db.as_ref() {
        let fingerprint = compile(&template).fingerprint();
        if let Err(e) = db::template_put(conn, &template, &fingerprint) {
            tracing::warn!(template = %template.id, error = %e, "caching template failed");
        }
    }
    Ok(template)
}

/// Accepts `data:image/png;base64,...` or bare base64.
pub fn decode_signature_image(raw: &str) -> Result<Vec<u8>, HandlerError> {
    let raw = raw.trim();
    let payload = match raw.strip_prefix("data:") {
        Some(rest) => match rest.split_once(',') {
            Some((meta, data)) if meta.ends_with(";base64") => data,
            _ => return Err(HandlerError::bad_params("image must be a base64 data URL")),
        },
        None => raw,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| HandlerError::bad_params(format!("image is not valid base64: {}", e)))
}
