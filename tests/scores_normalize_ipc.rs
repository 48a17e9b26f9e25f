mod test_support;

use serde_json::json;
use test_support::{request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn scores_normalize_reports_all_three_outcomes() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let numeric = request_ok(&mut stdin, &mut reader, "1", "scores.normalize", json!({ "raw": " 85% " }));
    assert_eq!(numeric["kind"], json!("numeric"));
    assert_eq!(numeric["value"], json!(85.0));
    assert_eq!(numeric["stored"], json!("85"));
    assert_eq!(numeric["display"], json!("85"));

    let absent = request_ok(&mut stdin, &mut reader, "2", "scores.normalize", json!({ "raw": "ABSENT" }));
    assert_eq!(absent["kind"], json!("not_performed"));
    assert!(absent["value"].is_null());
    assert_eq!(absent["stored"], json!("X"));
    assert_eq!(absent["display"], json!("X"));

    let blank = request_ok(&mut stdin, &mut reader, "3", "scores.normalize", json!({ "raw": null }));
    assert_eq!(blank["kind"], json!("blank"));
    assert!(blank["stored"].is_null());
    assert_eq!(blank["display"], json!(""));

    let over = request_ok(&mut stdin, &mut reader, "4", "scores.normalize", json!({ "raw": 140 }));
    assert_eq!(over["stored"], json!("100"));

    let junk = request_ok(&mut stdin, &mut reader, "5", "scores.normalize", json!({ "raw": "seven" }));
    assert_eq!(junk["kind"], json!("blank"));

    let bad = request(&mut stdin, &mut reader, "6", "scores.normalize", json!({ "raw": { "v": 1 } }));
    assert_eq!(bad["error"]["code"], json!("bad_params"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn status_normalize_flags_fallbacks() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let w = request_ok(&mut stdin, &mut reader, "1", "status.normalize", json!({ "raw": "In Progress" }));
    assert_eq!(w["status"], json!("W"));
    assert_eq!(w["recognized"], json!(true));

    let a = request_ok(&mut stdin, &mut reader, "2", "status.normalize", json!({ "raw": "next month aim" }));
    assert_eq!(a["status"], json!("A"));

    let unknown = request_ok(&mut stdin, &mut reader, "3", "status.normalize", json!({ "raw": "archived" }));
    assert_eq!(unknown["status"], json!("P"));
    assert_eq!(unknown["recognized"], json!(false));

    let empty = request_ok(&mut stdin, &mut reader, "4", "status.normalize", json!({}));
    assert_eq!(empty["status"], json!("P"));
    assert_eq!(empty["recognized"], json!(false));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn scores_set_writes_sanitized_rows_and_latest_wins() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let no_ws = request(
        &mut stdin,
        &mut reader,
        "1",
        "scores.set",
        json!({ "classroomId": "c1", "studentId": "s1", "assessmentId": "a1", "skillId": "k1", "rawScore": "40" }),
    );
    assert_eq!(no_ws["error"]["code"], json!("no_workspace"));

    let workspace = temp_dir("progressd-scores-set");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "snapshot.import",
        json!({
            "classroomId": "c1",
            "snapshot": {
                "classrooms": [{ "id": "c1", "name": "Birch" }],
                "students": [{ "id": "s1", "firstName": "Ada", "lastName": "Lovelace" }],
                "areas": [{ "id": "math", "name": "Math" }],
                "skills": [{ "id": "k1", "name": "Counting", "areaId": "math" }]
            }
        }),
    );

    let missing = request(
        &mut stdin,
        &mut reader,
        "4",
        "scores.set",
        json!({ "classroomId": "c1", "assessmentId": "a1", "skillId": "k1", "rawScore": "40" }),
    );
    assert_eq!(missing["error"]["code"], json!("bad_params"));

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "scores.set",
        json!({ "classroomId": "c1", "studentId": "s1", "assessmentId": "a1", "skillId": "k1", "rawScore": "40" }),
    );
    assert_eq!(first["stored"], json!("40"));
    assert!(first["id"].as_str().map(|s| !s.is_empty()).unwrap_or(false));

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "scores.set",
        json!({ "classroomId": "c1", "studentId": "s1", "assessmentId": "a1", "skillId": "k1", "rawScore": "190%" }),
    );
    assert_eq!(second["stored"], json!("100"));

    let rollup = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "analytics.rollup",
        json!({ "classroomId": "c1" }),
    );
    assert_eq!(rollup["masteryRate"], json!(100));
    assert_eq!(rollup["observationCount"], json!(1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "scores.set",
        json!({ "classroomId": "c1", "studentId": "s1", "assessmentId": "a1", "skillId": "k1", "rawScore": "x" }),
    );
    let gaps = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "analytics.gaps",
        json!({ "classroomId": "c1" }),
    );
    assert_eq!(gaps["notPerformed"], json!(["s1"]));

    drop(stdin);
    let _ = child.wait();
}
