use crate::db;
use crate::forms::schema::compile;
use crate::ipc::error::{respond, HandlerError, HandlerResult};
use crate::ipc::helpers::{fetch_and_cache_template, require_db, require_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_templates_fetch(state: &mut AppState, req: &Request) -> HandlerResult {
    let template_id = require_str(req, "templateId")?;
    let (template, stale) = match fetch_and_cache_template(state, &template_id) {
        Ok(t) => (t, false),
        // Offline: fall back to the cached copy if there is one.
        Err(e) if e.code == "backend_unreachable" => {
            let cached = match state.db.as_ref() {
                Some(conn) => db::template_get(conn, &template_id)?,
                None => None,
            };
            match cached {
                Some(t) => {
                    tracing::warn!(template = %template_id, "backend unreachable, serving cached template");
                    (t, true)
                }
                None => return Err(e),
            }
        }
        Err(e) => return Err(e),
    };
    let schema = compile(&template);
    Ok(json!({
        "template": template,
        "fingerprint": schema.fingerprint(),
        "duplicateKeys": template.duplicate_keys(),
        "stale": stale,
    }))
}

fn handle_templates_list(state: &mut AppState, _req: &Request) -> HandlerResult {
    let conn = require_db(state)?;
    let templates = db::templates_list(conn)?;
    Ok(json!({ "templates": templates }))
}

fn handle_templates_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let template_id = require_str(req, "templateId")?;
    let conn = require_db(state)?;
    let template = db::template_get(conn, &template_id)?
        .ok_or_else(|| HandlerError::new("not_found", "template not cached"))?;
    Ok(json!({ "template": template }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "templates.fetch" => handle_templates_fetch(state, req),
        "templates.list" => handle_templates_list(state, req),
        "templates.get" => handle_templates_get(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
