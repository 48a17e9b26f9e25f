mod test_support;

use serde_json::json;
use test_support::{request, request_ok, spawn_sidecar, temp_dir};

fn planner_snapshot() -> serde_json::Value {
    json!({
        "classrooms": [{ "id": "c1", "name": "Birch" }],
        "students": [
            { "id": "s1", "firstName": "Ada", "lastName": "Lovelace", "classroomId": "c1" },
            { "id": "s2", "firstName": "Alan", "lastName": "Turing", "classroomId": "c1" }
        ],
        "activityRecords": [
            {
                "id": "p1", "studentId": "s1", "classroomId": "c1",
                "areaName": "Math", "categoryName": "Numbers",
                "activity": "Bead Chains", "subActivityLabel": "Counting Beads",
                "status": "working"
            },
            {
                "id": "p2", "studentId": "s2", "classroomId": "c1",
                "areaName": "Math", "categoryName": "Numbers",
                "curriculumActivityName": "Bead Chains", "subActivity": "counting  beads",
                "status": "M"
            },
            {
                "id": "p3", "studentId": "s1", "classroomId": "c1",
                "areaName": "Language", "status": "mystery"
            }
        ]
    })
}

fn labels(nodes: &serde_json::Value) -> Vec<String> {
    nodes
        .as_array()
        .expect("nodes array")
        .iter()
        .map(|n| n["label"].as_str().unwrap_or("").to_string())
        .collect()
}

#[test]
fn class_board_merges_label_variants_and_skips_single_classroom() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let tree = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "planner.tree",
        json!({ "snapshot": planner_snapshot(), "preset": "class" }),
    );
    assert_eq!(tree["recordCount"], json!(3));
    let nodes = &tree["nodes"];
    assert_eq!(labels(nodes), vec!["Language", "Math"]);
    assert_eq!(nodes[0]["level"], json!("area"));

    let language = &nodes[0];
    assert_eq!(language["count"], json!(1));
    assert_eq!(language["statusCounts"]["P"], json!(1));
    assert_eq!(labels(&language["children"]), vec!["Uncategorized"]);

    let math = &nodes[1];
    assert_eq!(math["count"], json!(2));
    let sub = &math["children"][0]["children"][0]["children"][0];
    assert_eq!(sub["level"], json!("subActivity"));
    assert_eq!(sub["label"], json!("Counting Beads"));
    assert_eq!(sub["count"], json!(2));
    assert_eq!(
        sub["statusCounts"],
        json!({ "P": 0, "W": 1, "M": 1, "A": 0 })
    );
    assert_eq!(labels(&sub["children"]), vec!["Lovelace, Ada", "Turing, Alan"]);

    let kept = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "planner.tree",
        json!({
            "snapshot": planner_snapshot(),
            "preset": "class",
            "collapseSingleClassroom": false
        }),
    );
    assert_eq!(kept["nodes"][0]["level"], json!("classroom"));
    assert_eq!(labels(&kept["nodes"]), vec!["Birch"]);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn student_board_and_custom_levels() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "planner.tree",
        json!({ "snapshot": planner_snapshot(), "preset": "student", "studentId": "s1" }),
    );
    assert_eq!(student["recordCount"], json!(2));
    assert_eq!(student["levels"], json!(["area", "category", "subActivity"]));
    assert_eq!(labels(&student["nodes"]), vec!["Language", "Math"]);

    let by_status = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "planner.tree",
        json!({ "snapshot": planner_snapshot(), "levels": ["status"] }),
    );
    assert_eq!(labels(&by_status["nodes"]), vec!["M", "P", "W"]);
    let leaf_records = by_status["nodes"][0]["records"].as_array().expect("records");
    assert_eq!(leaf_records.len(), 1);
    assert_eq!(leaf_records[0]["activityName"], json!("Bead Chains"));

    let bad_levels = request(
        &mut stdin,
        &mut reader,
        "3",
        "planner.tree",
        json!({ "snapshot": planner_snapshot(), "levels": ["bogus"] }),
    );
    assert_eq!(bad_levels["error"]["code"], json!("bad_params"));

    let bad_preset = request(
        &mut stdin,
        &mut reader,
        "4",
        "planner.tree",
        json!({ "snapshot": planner_snapshot(), "preset": "weekly" }),
    );
    assert_eq!(bad_preset["error"]["code"], json!("bad_params"));

    let nothing = request(&mut stdin, &mut reader, "5", "planner.tree", json!({}));
    assert_eq!(nothing["error"]["code"], json!("bad_params"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn tree_reads_imported_classroom_and_planner_settings() {
    let workspace = temp_dir("progressd-planner-tree");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "snapshot.import",
        json!({ "classroomId": "c1", "snapshot": planner_snapshot() }),
    );
    assert_eq!(imported["activityRecords"], json!(3));

    let tree = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "planner.tree",
        json!({ "classroomId": "c1" }),
    );
    assert_eq!(tree["recordCount"], json!(3));
    assert_eq!(tree["nodes"][0]["level"], json!("area"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({ "section": "planner", "patch": { "collapseSingleClassroom": false } }),
    );
    let kept = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "planner.tree",
        json!({ "classroomId": "c1" }),
    );
    assert_eq!(kept["nodes"][0]["level"], json!("classroom"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "6",
        "planner.tree",
        json!({ "classroomId": "nope" }),
    );
    assert_eq!(missing["error"]["code"], json!("not_found"));

    drop(stdin);
    let _ = child.wait();
}
