use crate::api::FormInstance;
use crate::db;
use crate::export::export_instances_xlsx;
use crate::ipc::error::{respond, HandlerError, HandlerResult};
use crate::ipc::helpers::{opt_str, require_db, require_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn status_filter(req: &Request) -> Result<Option<String>, HandlerError> {
    match opt_str(req, "status") {
        None => Ok(None),
        Some(s) => match s.as_str() {
            "pending" | "approved" | "rejected" => Ok(Some(s)),
            _ => Err(HandlerError::bad_params(
                "status must be one of: pending, approved, rejected",
            )),
        },
    }
}

fn filter_status(instances: Vec<FormInstance>, status: Option<&str>) -> Vec<FormInstance> {
    match status {
        Some(s) => instances
            .into_iter()
            .filter(|i| i.approve_status().as_str() == s)
            .collect(),
        None => instances,
    }
}

fn handle_instances_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let status = status_filter(req)?;
    let listed = state.ensure_api().map_err(HandlerError::from).and_then(|api| {
        api.list_instances().map_err(HandlerError::from)
    });
    match listed {
        Ok(instances) => {
            if let Some(conn) = state.db.as_ref() {
                db::instances_replace(conn, &instances)?;
            }
            let instances = filter_status(instances, status.as_deref());
            Ok(json!({ "instances": instances, "stale": false }))
        }
        Err(e) if e.code == "backend_unreachable" && state.db.is_some() => {
            tracing::warn!(error = %e.message, "backend unreachable, serving cached instances");
            let conn = require_db(state)?;
            let instances = db::instances_list(conn, status.as_deref())?;
            Ok(json!({ "instances": instances, "stale": true }))
        }
        Err(e) => Err(e),
    }
}

fn handle_instances_cached(state: &mut AppState, req: &Request) -> HandlerResult {
    let status = status_filter(req)?;
    let conn = require_db(state)?;
    let instances = db::instances_list(conn, status.as_deref())?;
    Ok(json!({ "instances": instances }))
}

fn handle_instances_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let instance_id = require_str(req, "instanceId")?;
    let instance = state.ensure_api()?.fetch_instance(&instance_id)?;
    Ok(json!({ "instance": instance }))
}

fn handle_instances_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let instance_id = require_str(req, "instanceId")?;
    let api = state.ensure_api()?;
    let instance = api.fetch_instance(&instance_id)?;
    if !instance.is_pending() {
        return Err(HandlerError::new(
            "not_pending",
            format!(
                "instance {} is {} and can no longer be deleted",
                instance_id,
                instance.approve_status().as_str()
            ),
        ));
    }
    api.delete_instance(&instance_id)?;
    let uncached = match state.db.as_ref() {
        Some(conn) => db::instance_remove(conn, &instance_id)?,
        None => false,
    };
    tracing::info!(instance = %instance_id, "instance deleted");
    Ok(json!({ "ok": true, "instanceId": instance_id, "uncached": uncached }))
}

fn handle_instances_export_xlsx(state: &mut AppState, req: &Request) -> HandlerResult {
    let out_path = PathBuf::from(require_str(req, "outPath")?);
    let status = status_filter(req)?;
    let conn = require_db(state)?;
    let instances = db::instances_list(conn, status.as_deref())?;
    let summary = export_instances_xlsx(&instances, &out_path)
        .map_err(|e| HandlerError::new("export_failed", format!("{e:#}")))?;
    Ok(json!({
        "outPath": out_path.to_string_lossy(),
        "rows": summary.rows,
        "columns": summary.columns,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "instances.list" => handle_instances_list(state, req),
        "instances.cached" => handle_instances_cached(state, req),
        "instances.get" => handle_instances_get(state, req),
        "instances.delete" => handle_instances_delete(state, req),
        "instances.exportXlsx" => handle_instances_export_xlsx(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
