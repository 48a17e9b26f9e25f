use crate::db;
use crate::grouping::GroupOptions;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::rollup::RollupOptions;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Analytics,
    Planner,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "analytics" => Some(Self::Analytics),
            "planner" => Some(Self::Planner),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Analytics => "setup.analytics",
            Self::Planner => "setup.planner",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Analytics => json!({
            "needsFocusLimit": 5,
            "weakSkillLimit": 2
        }),
        SetupSection::Planner => json!({
            "collapseSingleClassroom": true,
            "defaultPreset": "class"
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Analytics => match k.as_str() {
                "needsFocusLimit" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 20)?));
                }
                "weakSkillLimit" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 10)?));
                }
                _ => return Err(format!("unknown analytics field: {}", k)),
            },
            SetupSection::Planner => match k.as_str() {
                "collapseSingleClassroom" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "defaultPreset" => {
                    let p = v
                        .as_str()
                        .ok_or_else(|| format!("{} must be string", k))?
                        .trim()
                        .to_ascii_lowercase();
                    if p != "class" && p != "student" {
                        return Err("defaultPreset must be one of: class, student".into());
                    }
                    obj.insert(k.clone(), Value::String(p));
                }
                _ => return Err(format!("unknown planner field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults instead of failing the caller.
            if let Err(msg) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.key(), %msg, "stored setup ignored");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

/// Without a workspace, or with an unreadable one, the defaults apply.
fn section_or_default(state: &AppState, section: SetupSection) -> Value {
    state
        .db
        .as_ref()
        .and_then(|conn| load_section(conn, section).ok())
        .unwrap_or_else(|| default_section(section))
}

pub fn rollup_options(state: &AppState) -> RollupOptions {
    let v = section_or_default(state, SetupSection::Analytics);
    let defaults = RollupOptions::default();
    RollupOptions {
        needs_focus_limit: v
            .get("needsFocusLimit")
            .and_then(|n| n.as_u64())
            .map(|n| n as usize)
            .unwrap_or(defaults.needs_focus_limit),
        weak_skill_limit: v
            .get("weakSkillLimit")
            .and_then(|n| n.as_u64())
            .map(|n| n as usize)
            .unwrap_or(defaults.weak_skill_limit),
    }
}

pub fn group_options(state: &AppState) -> GroupOptions {
    let v = section_or_default(state, SetupSection::Planner);
    GroupOptions {
        collapse_single_classroom: v
            .get("collapseSingleClassroom")
            .and_then(|b| b.as_bool())
            .unwrap_or(true),
    }
}

pub fn default_preset(state: &AppState) -> String {
    section_or_default(state, SetupSection::Planner)
        .get("defaultPreset")
        .and_then(|p| p.as_str())
        .unwrap_or("class")
        .to_string()
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let analytics = match load_section(conn, SetupSection::Analytics) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let planner = match load_section(conn, SetupSection::Planner) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "analytics": analytics,
            "planner": planner
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({ "ok": true, "section": section_raw, "values": current }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
