use chrono::Utc;
use serde_json::json;

use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, optional_str, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{RawScore, ScoreRecord};
use crate::normalize::{display_value, parse_score, recognize_status, sanitize_for_storage, StatusCode};

fn raw_score_param(req: &Request, key: &str) -> Result<RawScore, HandlerErr> {
    match req.params.get(key) {
        None => Ok(RawScore::Blank),
        Some(v) => serde_json::from_value(v.clone()).map_err(|_| HandlerErr {
            code: "bad_params",
            message: format!("{} must be string, number or null", key),
            details: Some(json!({ "field": key, "value": v })),
        }),
    }
}

fn score_json(raw: &RawScore) -> serde_json::Value {
    let parsed = parse_score(raw);
    json!({
        "kind": parsed.kind(),
        "value": parsed.value(),
        "stored": sanitize_for_storage(raw),
        "display": display_value(raw),
    })
}

fn handle_scores_normalize(req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let raw = raw_score_param(req, "raw")?;
    Ok(score_json(&raw))
}

fn handle_scores_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let rec = ScoreRecord {
        id: String::new(),
        classroom_id: required_str(req, "classroomId")?,
        student_id: required_str(req, "studentId")?,
        assessment_id: required_str(req, "assessmentId")?,
        skill_id: required_str(req, "skillId")?,
        template_id: optional_str(req, "templateId")?,
        raw_score: raw_score_param(req, "rawScore")?,
        comment: optional_str(req, "comment")?,
        created_at: Some(Utc::now()),
    };
    let id = db::insert_score_record(conn, &rec).map_err(|e| HandlerErr::db("db_update_failed", e))?;
    let mut out = score_json(&rec.raw_score);
    out["id"] = json!(id);
    Ok(out)
}

fn handle_status_normalize(req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let raw = match req.params.get("raw") {
        None => String::new(),
        Some(v) if v.is_null() => String::new(),
        Some(v) => v
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| HandlerErr::bad_params("raw must be string or null"))?,
    };
    let recognized = recognize_status(&raw);
    Ok(json!({
        "status": recognized.unwrap_or(StatusCode::P),
        "recognized": recognized.is_some(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "scores.normalize" => handle_scores_normalize(req),
        "scores.set" => handle_scores_set(state, req),
        "status.normalize" => handle_status_normalize(req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
