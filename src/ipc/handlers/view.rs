use serde_json::json;

use crate::ipc::error::ok;
use crate::ipc::helpers::{optional_bool, optional_str, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};

fn handle_view_state(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let view_id = required_str(req, "viewId")?;
    let view = state.views.get(&view_id).cloned().unwrap_or_default();
    Ok(json!({ "viewId": view_id, "state": view }))
}

fn handle_view_is_open(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let view_id = required_str(req, "viewId")?;
    let key = required_str(req, "key")?;
    let default_open = optional_bool(req, "defaultOpen")?.unwrap_or(false);
    let open = state
        .views
        .get(&view_id)
        .map(|v| v.is_open(&key, default_open))
        .unwrap_or(default_open);
    Ok(json!({ "key": key, "open": open }))
}

fn handle_view_toggle(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let view_id = required_str(req, "viewId")?;
    let key = required_str(req, "key")?;
    let default_open = optional_bool(req, "defaultOpen")?.unwrap_or(false);
    let open = state
        .views
        .entry(view_id)
        .or_default()
        .toggle(&key, default_open);
    Ok(json!({ "key": key, "open": open }))
}

fn handle_view_set_global(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let view_id = required_str(req, "viewId")?;
    let Some(open) = optional_bool(req, "open")? else {
        return Err(HandlerErr::bad_params("missing open"));
    };
    let view = state.views.entry(view_id.clone()).or_default();
    view.set_global(open);
    Ok(json!({ "viewId": view_id, "state": view }))
}

/// With `key`, drops that one entry; without, forgets the whole view.
fn handle_view_reset(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let view_id = required_str(req, "viewId")?;
    match optional_str(req, "key")? {
        Some(key) => {
            if let Some(view) = state.views.get_mut(&view_id) {
                view.clear(&key);
            }
        }
        None => {
            if let Some(view) = state.views.get_mut(&view_id) {
                view.reset();
            }
        }
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "view.state" => handle_view_state(state, req),
        "view.isOpen" => handle_view_is_open(state, req),
        "view.toggle" => handle_view_toggle(state, req),
        "view.setGlobal" => handle_view_set_global(state, req),
        "view.reset" => handle_view_reset(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
