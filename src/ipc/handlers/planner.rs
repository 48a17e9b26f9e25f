use serde_json::json;

use crate::grouping::{build_tree, normalize_activity, GroupLevel};
use crate::ipc::error::ok;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{optional_bool, optional_str, resolve_snapshot, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{ActivityRecord, LookupContext};

fn preset_levels(preset: &str) -> Option<Vec<GroupLevel>> {
    match preset {
        "class" => Some(GroupLevel::CLASS_BOARD.to_vec()),
        "student" => Some(GroupLevel::STUDENT_BOARD.to_vec()),
        _ => None,
    }
}

fn parse_levels(state: &AppState, req: &Request) -> Result<Vec<GroupLevel>, HandlerErr> {
    if let Some(raw) = req.params.get("levels").filter(|v| !v.is_null()) {
        let levels: Vec<GroupLevel> = serde_json::from_value(raw.clone()).map_err(|_| HandlerErr {
            code: "bad_params",
            message: "levels must be an array of: classroom, area, category, activity, subActivity, student, status".to_string(),
            details: Some(json!({ "levels": raw })),
        })?;
        if levels.is_empty() {
            return Err(HandlerErr::bad_params("levels must not be empty"));
        }
        return Ok(levels);
    }

    let preset = optional_str(req, "preset")?.unwrap_or_else(|| setup::default_preset(state));
    preset_levels(&preset).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "preset must be one of: class, student".to_string(),
        details: Some(json!({ "preset": preset })),
    })
}

fn handle_planner_tree(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let classroom_id = optional_str(req, "classroomId")?;
    let student_id = optional_str(req, "studentId")?;
    let levels = parse_levels(state, req)?;
    let mut options = setup::group_options(state);
    if let Some(collapse) = optional_bool(req, "collapseSingleClassroom")? {
        options.collapse_single_classroom = collapse;
    }

    let snapshot = resolve_snapshot(state, req, classroom_id.as_deref())?;
    let ctx = LookupContext::from_snapshot(&snapshot);
    let records: Vec<ActivityRecord> = snapshot
        .activity_records
        .iter()
        .map(|raw| normalize_activity(raw, &ctx))
        .filter(|r| {
            classroom_id
                .as_ref()
                .map(|c| r.classroom_id.as_ref() == Some(c))
                .unwrap_or(true)
        })
        .filter(|r| {
            student_id
                .as_ref()
                .map(|s| r.student_id.as_ref() == Some(s))
                .unwrap_or(true)
        })
        .collect();

    let nodes = build_tree(&records, &levels, &ctx, options);
    Ok(json!({
        "levels": levels,
        "recordCount": records.len(),
        "nodes": nodes,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "planner.tree" => handle_planner_tree(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
