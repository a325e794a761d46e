use crate::db;
use crate::forms::flow::{FlowState, Notice};
use crate::forms::render::{render_form, FieldEdit};
use crate::forms::SubmissionFlow;
use crate::ipc::error::{respond, HandlerError, HandlerResult};
use crate::ipc::helpers::{
    decode_signature_image, opt_str, parse_values, require_str, resolve_template, template_by_id,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn flow_view(flow: &SubmissionFlow, notices: &[Notice]) -> Value {
    json!({
        "flowId": flow.id(),
        "state": flow.state(),
        "mode": flow.mode(),
        "templateId": flow.template().id,
        "values": flow.values(),
        "signatureKey": flow.signature_key(),
        "hasSignature": flow.has_signature(),
        "instanceId": flow.instance_id(),
        "debt": flow.debt_summaries(),
        "notices": notices,
    })
}

fn flow_mut<'a>(state: &'a mut AppState, req: &Request) -> Result<&'a mut SubmissionFlow, HandlerError> {
    let flow_id = require_str(req, "flowId")?;
    state
        .flows
        .get_mut(&flow_id)
        .ok_or_else(|| HandlerError::new("not_found", format!("no open flow {}", flow_id)))
}

/// Runs `op` on the flow. On failure the flow's current view and notices
/// travel in the error details.
fn with_flow<F>(state: &mut AppState, req: &Request, op: F) -> HandlerResult
where
    F: FnOnce(&mut SubmissionFlow) -> Result<(), crate::forms::FlowError>,
{
    let flow = flow_mut(state, req)?;
    match op(flow) {
        Ok(()) => {
            let notices = flow.take_notices();
            Ok(json!({ "flow": flow_view(flow, &notices) }))
        }
        Err(e) => {
            let notices = flow.take_notices();
            let view = flow_view(flow, &notices);
            Err(HandlerError::from(e).detail("flow", view))
        }
    }
}

fn handle_flow_start(state: &mut AppState, req: &Request) -> HandlerResult {
    let fallback_key = state.config.default_signature_key.clone();
    let flow = match opt_str(req, "instanceId") {
        Some(instance_id) => {
            let instance = state.ensure_api()?.fetch_instance(&instance_id)?;
            let template = match instance.template_snapshot.clone() {
                Some(t) => t,
                None => match instance.template_id.clone() {
                    Some(template_id) if req.params.get("template").is_none() => {
                        template_by_id(state, &template_id)?
                    }
                    _ => resolve_template(state, req)?,
                },
            };
            SubmissionFlow::update(template, &instance, &fallback_key)?
        }
        None => SubmissionFlow::create(resolve_template(state, req)?, &fallback_key),
    };
    let view = flow_view(&flow, &[]);
    tracing::info!(flow = %flow.id(), template = %flow.template().id, "flow started");
    state.flows.insert(flow.id().to_string(), flow);
    Ok(json!({ "flow": view }))
}

fn handle_flow_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let flow = flow_mut(state, req)?;
    let issues = flow.validate().err().unwrap_or_default();
    let form = render_form(flow.template(), flow.values(), &issues);
    Ok(json!({
        "flow": flow_view(flow, &[]),
        "form": form,
        "issues": issues,
    }))
}

fn handle_flow_edit(state: &mut AppState, req: &Request) -> HandlerResult {
    let key = require_str(req, "key")?;
    let edit: FieldEdit = match req.params.get("edit") {
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| HandlerError::bad_params(format!("invalid params.edit: {}", e)))?,
        None => return Err(HandlerError::bad_params("missing params.edit")),
    };
    with_flow(state, req, |flow| flow.edit(&key, edit).map(|_| ()))
}

fn handle_flow_set_values(state: &mut AppState, req: &Request) -> HandlerResult {
    let values = parse_values(req)?;
    with_flow(state, req, |flow| flow.set_values(values))
}

fn handle_flow_capture_signature(state: &mut AppState, req: &Request) -> HandlerResult {
    let raw = require_str(req, "image")?;
    let png = decode_signature_image(&raw)?;
    with_flow(state, req, |flow| flow.capture_signature(png))
}

fn handle_flow_submit(state: &mut AppState, req: &Request) -> HandlerResult {
    let flow_id = require_str(req, "flowId")?;
    if !state.flows.contains_key(&flow_id) {
        return Err(HandlerError::new("not_found", format!("no open flow {}", flow_id)));
    }
    state.ensure_api()?;
    let (Some(api), Some(flow)) = (state.api.as_deref(), state.flows.get_mut(&flow_id)) else {
        return Err(HandlerError::new("bad_config", "backend client unavailable"));
    };

    let outcome = flow.submit(api);
    let notices = flow.take_notices();
    let view = flow_view(flow, &notices);
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => return Err(HandlerError::from(e).detail("flow", view)),
    };

    // Done is terminal: the flow goes away and the cached list is refreshed.
    state.flows.remove(&flow_id);
    let refreshed = refresh_instances(state);
    Ok(json!({
        "flow": view,
        "instanceId": outcome.instance_id,
        "signatureKey": outcome.signature_key,
        "instancesRefreshed": refreshed,
    }))
}

fn refresh_instances(state: &mut AppState) -> bool {
    if state.db.is_none() {
        return false;
    }
    let listed = state.ensure_api().and_then(|api| api.list_instances());
    let instances = match listed {
        Ok(instances) => instances,
        Err(e) => {
            tracing::warn!(error = %e, "refreshing instance list failed");
            return false;
        }
    };
    let Some(conn) = state.db.as_ref() else {
        return false;
    };
    match db::instances_replace(conn, &instances) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "caching instance list failed");
            false
        }
    }
}

fn handle_flow_cancel(state: &mut AppState, req: &Request) -> HandlerResult {
    let flow = flow_mut(state, req)?;
    if let Err(e) = flow.cancel() {
        let view = flow_view(flow, &[]);
        return Err(HandlerError::from(e).detail("flow", view));
    }
    let flow_id = flow.id().to_string();
    state.flows.remove(&flow_id);
    tracing::info!(flow = %flow_id, "flow cancelled");
    Ok(json!({ "flowId": flow_id, "state": FlowState::Cancelled }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "flow.start" => handle_flow_start(state, req),
        "flow.get" => handle_flow_get(state, req),
        "flow.edit" => handle_flow_edit(state, req),
        "flow.setValues" => handle_flow_set_values(state, req),
        "flow.advance" => with_flow(state, req, |flow| flow.advance()),
        "flow.back" => with_flow(state, req, |flow| flow.back()),
        "flow.captureSignature" => handle_flow_capture_signature(state, req),
        "flow.clearSignature" => with_flow(state, req, |flow| flow.clear_signature()),
        "flow.submit" => handle_flow_submit(state, req),
        "flow.cancel" => handle_flow_cancel(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
