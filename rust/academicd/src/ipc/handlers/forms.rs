use crate::forms::render::{apply_edit, render_form, FieldEdit};
use crate::forms::schema::compile;
use crate::forms::serialize;
use crate::ipc::error::{respond, HandlerError, HandlerResult};
use crate::ipc::helpers::{parse_values, require_str, resolve_template};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_forms_compile(state: &mut AppState, req: &Request) -> HandlerResult {
    let template = resolve_template(state, req)?;
    let schema = compile(&template);
    Ok(json!({
        "fingerprint": schema.fingerprint(),
        "schema": schema,
    }))
}

fn handle_forms_validate(state: &mut AppState, req: &Request) -> HandlerResult {
    let template = resolve_template(state, req)?;
    let values = parse_values(req)?;
    let issues = match compile(&template).validate(&values) {
        Ok(()) => Vec::new(),
        Err(issues) => issues,
    };
    Ok(json!({
        "valid": issues.is_empty(),
        "issues": issues,
    }))
}

fn handle_forms_render(state: &mut AppState, req: &Request) -> HandlerResult {
    let template = resolve_template(state, req)?;
    let values = parse_values(req)?;
    let show_errors = req
        .params
        .get("showErrors")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let issues = if show_errors {
        compile(&template).validate(&values).err().unwrap_or_default()
    } else {
        Vec::new()
    };
    Ok(json!({ "form": render_form(&template, &values, &issues) }))
}

fn handle_forms_edit(state: &mut AppState, req: &Request) -> HandlerResult {
    let template = resolve_template(state, req)?;
    let mut values = parse_values(req)?;
    let key = require_str(req, "key")?;
    let edit: FieldEdit = req
        .params
        .get("edit")
        .cloned()
        .ok_or_else(|| HandlerError::bad_params("missing params.edit"))
        .and_then(|v| {
            serde_json::from_value(v)
                .map_err(|e| HandlerError::bad_params(format!("invalid params.edit: {}", e)))
        })?;
    let field = template
        .field(&key)
        .ok_or_else(|| HandlerError::new("not_found", format!("unknown field `{}`", key)))?;
    let next = apply_edit(field, values.get(&key), edit)
        .map_err(|e| HandlerError::bad_params(e.to_string()))?;
    let issue = compile(&template)
        .rule(&key)
        .and_then(|rule| rule.check(Some(&next)));
    values.insert(key.clone(), next.clone());
    Ok(json!({
        "key": key,
        "value": next,
        "values": values,
        "error": issue.map(|i| i.message),
    }))
}

fn handle_forms_serialize(state: &mut AppState, req: &Request) -> HandlerResult {
    let template = resolve_template(state, req)?;
    let values = parse_values(req)?;
    Ok(json!({ "responses": serialize(&template, &values) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "forms.compile" => handle_forms_compile(state, req),
        "forms.validate" => handle_forms_validate(state, req),
        "forms.render" => handle_forms_render(state, req),
        "forms.edit" => handle_forms_edit(state, req),
        "forms.serialize" => handle_forms_serialize(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
