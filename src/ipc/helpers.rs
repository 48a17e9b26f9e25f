use rusqlite::Connection;
use serde_json::json;

use crate::db;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::model::Snapshot;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn db(code: &'static str, e: anyhow::Error) -> Self {
        Self {
            code,
            message: e.to_string(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, HandlerErr> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!(
                    "{} must be string or null",
                    key
                )));
            };
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
    }
}

pub fn optional_bool(req: &Request, key: &str) -> Result<Option<bool>, HandlerErr> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be boolean", key))),
    }
}

pub fn db_conn<'a>(state: &'a AppState) -> Result<&'a Connection, HandlerErr> {
    state.db.as_ref().ok_or_else(|| HandlerErr {
        code: "no_workspace",
        message: "select a workspace first".to_string(),
        details: None,
    })
}

/// Inline `params.snapshot` wins; otherwise the classroom is read from the
/// workspace mirror. Inline rows without a classroom are taken to belong to
/// the requested one.
pub fn resolve_snapshot(
    state: &AppState,
    req: &Request,
    classroom_id: Option<&str>,
) -> Result<Snapshot, HandlerErr> {
    if let Some(raw) = req.params.get("snapshot").filter(|v| !v.is_null()) {
        let mut snapshot: Snapshot = serde_json::from_value(raw.clone()).map_err(|e| HandlerErr {
            code: "bad_params",
            message: format!("invalid snapshot: {}", e),
            details: None,
        })?;
        if let Some(classroom_id) = classroom_id {
            assume_classroom(&mut snapshot, classroom_id);
        }
        return Ok(snapshot);
    }

    let Some(classroom_id) = classroom_id else {
        return Err(HandlerErr::bad_params("missing classroomId or snapshot"));
    };
    let conn = db_conn(state)?;
    db::load_snapshot(conn, classroom_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr {
            code: "not_found",
            message: "classroom not found".to_string(),
            details: Some(json!({ "classroomId": classroom_id })),
        })
}

fn assume_classroom(snapshot: &mut Snapshot, classroom_id: &str) {
    for r in &mut snapshot.score_records {
        if r.classroom_id.is_empty() {
            r.classroom_id = classroom_id.to_string();
        }
    }
    for s in &mut snapshot.students {
        if s.classroom_id.is_empty() {
            s.classroom_id = classroom_id.to_string();
        }
    }
    for a in &mut snapshot.activity_records {
        if a.classroom_id.as_deref().map(str::trim).unwrap_or("").is_empty() {
            a.classroom_id = Some(classroom_id.to_string());
        }
    }
}
