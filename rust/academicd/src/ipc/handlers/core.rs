use crate::config::{BackendConfig, SETTINGS_KEY};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "apiBaseUrl": state.config.api_base_url,
            "openFlows": state.flows.len(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            // A broken override must not prevent the workspace from opening.
            let config = match workspace_config(&conn, &state.base_config) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring workspace backend settings");
                    state.base_config.clone()
                }
            };
            state.set_config(config);
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            tracing::info!(workspace = %path.to_string_lossy(), "workspace selected");
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "apiBaseUrl": state.config.api_base_url,
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn workspace_config(
    conn: &rusqlite::Connection,
    base: &BackendConfig,
) -> anyhow::Result<BackendConfig> {
    let mut cfg = base.clone();
    if let Some(patch) = db::settings_get_json(conn, SETTINGS_KEY)? {
        cfg.apply_patch(&patch).map_err(anyhow::Error::msg)?;
    }
    Ok(cfg)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
