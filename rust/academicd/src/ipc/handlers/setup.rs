use crate::config::SETTINGS_KEY;
use crate::db;
use crate::ipc::error::{respond, HandlerError, HandlerResult};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_setup_get(state: &mut AppState, _req: &Request) -> HandlerResult {
    Ok(json!({
        "backend": state.config,
        "overrides": state.config.diff_from(&state.base_config),
        "persisted": state.db.is_some(),
    }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let Some(patch) = req.params.get("patch") else {
        return Err(HandlerError::bad_params("missing params.patch"));
    };
    let mut next = state.config.clone();
    next.apply_patch(patch).map_err(HandlerError::bad_params)?;

    if let Some(conn) = state.db.as_ref() {
        let overrides = next.diff_from(&state.base_config);
        db::settings_set_json(conn, SETTINGS_KEY, &overrides)
            .map_err(|e| HandlerError::new("db_update_failed", format!("{e:#}")))?;
    }
    state.set_config(next);
    tracing::info!(api = %state.config.api_base_url, "backend settings updated");
    handle_setup_get(state, req)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "setup.get" => handle_setup_get(state, req),
        "setup.update" => handle_setup_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
