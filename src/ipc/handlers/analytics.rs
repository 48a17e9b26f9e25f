use serde_json::json;

use crate::gaps::classify;
use crate::ipc::error::ok;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{optional_str, required_str, resolve_snapshot, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{LookupContext, Student};
use crate::rollup::{compute_rollup, scoped_records, RollupFilters};

fn parse_student_ids(req: &Request) -> Result<Option<Vec<String>>, HandlerErr> {
    let Some(raw) = req.params.get("studentIds").filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let Some(arr) = raw.as_array() else {
        return Err(HandlerErr::bad_params("studentIds must be an array"));
    };
    let mut out = Vec::with_capacity(arr.len());
    for v in arr {
        let Some(id) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return Err(HandlerErr {
                code: "bad_params",
                message: "studentIds must contain only non-empty strings".to_string(),
                details: Some(json!({ "value": v })),
            });
        };
        out.push(id.to_string());
    }
    Ok(Some(out))
}

/// Active students of the classroom in roster order.
fn roster(students: &[Student], classroom_id: &str) -> Vec<String> {
    let mut rows: Vec<&Student> = students
        .iter()
        .filter(|s| s.active && s.classroom_id == classroom_id)
        .collect();
    rows.sort_by(|a, b| {
        a.sort_order
            .cmp(&b.sort_order)
            .then_with(|| a.display_name().cmp(&b.display_name()))
    });
    rows.into_iter().map(|s| s.id.clone()).collect()
}

fn handle_analytics_rollup(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let filters = RollupFilters {
        classroom_id: required_str(req, "classroomId")?,
        template_id: optional_str(req, "templateId")?,
    };
    let snapshot = resolve_snapshot(state, req, Some(&filters.classroom_id))?;
    let ctx = LookupContext::from_snapshot(&snapshot);
    let result = compute_rollup(
        &snapshot.score_records,
        &ctx,
        &filters,
        setup::rollup_options(state),
    );
    serde_json::to_value(result).map_err(|e| HandlerErr {
        code: "internal",
        message: e.to_string(),
        details: None,
    })
}

fn handle_analytics_gaps(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let filters = RollupFilters {
        classroom_id: required_str(req, "classroomId")?,
        template_id: optional_str(req, "templateId")?,
    };
    let explicit_ids = parse_student_ids(req)?;
    let snapshot = resolve_snapshot(state, req, Some(&filters.classroom_id))?;
    let ctx = LookupContext::from_snapshot(&snapshot);

    let student_ids =
        explicit_ids.unwrap_or_else(|| roster(&snapshot.students, &filters.classroom_id));
    let records = scoped_records(&snapshot.score_records, &ctx, &filters);

    let gaps = classify(&student_ids, records);
    Ok(json!({
        "classroomId": filters.classroom_id,
        "studentCount": student_ids.len(),
        "ungraded": gaps.ungraded,
        "notPerformed": gaps.not_performed,
        "graded": gaps.graded,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "analytics.rollup" => handle_analytics_rollup(state, req),
        "analytics.gaps" => handle_analytics_gaps(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
