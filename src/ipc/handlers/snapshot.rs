use serde_json::json;

use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Classroom, Snapshot};

fn handle_snapshot_import(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = required_str(req, "classroomId")?;
    let Some(raw) = req.params.get("snapshot") else {
        return Err(HandlerErr::bad_params("missing snapshot"));
    };
    let mut snapshot: Snapshot = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid snapshot: {}", e)))?;
    if !snapshot.classrooms.iter().any(|c| c.id == classroom_id) {
        snapshot.classrooms.push(Classroom {
            id: classroom_id.clone(),
            name: classroom_id.clone(),
        });
    }

    let conn = db_conn(state)?;
    let counts = db::import_snapshot(conn, &classroom_id, &snapshot)
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    Ok(json!({
        "classroomId": classroom_id,
        "students": counts.students,
        "scoreRecords": counts.score_records,
        "activityRecords": counts.activity_records,
        "skipped": counts.skipped,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "snapshot.import" => handle_snapshot_import(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
