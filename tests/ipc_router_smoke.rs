mod test_support;

use std::io::{BufRead, Write};

use serde_json::json;
use test_support::{request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_answers_health_unknown_methods_and_bad_lines() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health
        .get("workspacePath")
        .map(|v| v.is_null())
        .unwrap_or(false));

    let unknown = request(&mut stdin, &mut reader, "2", "grades.explode", json!({}));
    assert_eq!(unknown["ok"], json!(false));
    assert_eq!(unknown["error"]["code"], json!("not_implemented"));

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json response");
    let bad: serde_json::Value = serde_json::from_str(line.trim()).expect("bad_json is json");
    assert_eq!(bad["ok"], json!(false));
    assert_eq!(bad["error"]["code"], json!("bad_json"));

    // The loop keeps serving after a bad line.
    let _ = request_ok(&mut stdin, &mut reader, "3", "health", json!({}));

    let no_ws = request(&mut stdin, &mut reader, "4", "setup.get", json!({}));
    assert_eq!(no_ws["error"]["code"], json!("no_workspace"));

    let missing_path = request(&mut stdin, &mut reader, "5", "workspace.select", json!({}));
    assert_eq!(missing_path["error"]["code"], json!("bad_params"));

    let workspace = temp_dir("progressd-router-smoke");
    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(
        selected["workspacePath"].as_str(),
        Some(workspace.to_string_lossy().as_ref())
    );
    let setup = request_ok(&mut stdin, &mut reader, "7", "setup.get", json!({}));
    assert_eq!(setup["analytics"]["needsFocusLimit"], json!(5));
    assert_eq!(setup["analytics"]["weakSkillLimit"], json!(2));
    assert_eq!(setup["planner"]["collapseSingleClassroom"], json!(true));

    let bad_patch = request(
        &mut stdin,
        &mut reader,
        "8",
        "setup.update",
        json!({ "section": "analytics", "patch": { "needsFocusLimit": 99 } }),
    );
    assert_eq!(bad_patch["error"]["code"], json!("bad_params"));

    drop(stdin);
    let _ = child.wait();
}
