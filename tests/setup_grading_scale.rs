mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::{ChildStdin, ChildStdout};
use test_support::{error_code, fixture_path, request, request_ok, spawn_sidecar, temp_dir};

fn open_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> PathBuf {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "import",
        "course.import",
        json!({ "path": fixture_path("fixtures/courses/infantry_tactics.json").to_string_lossy() }),
    );
    workspace
}

#[test]
fn setup_defaults_are_reported() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, "gradebook-setup-defaults");

    let setup = request_ok(&mut stdin, &mut reader, "1", "setup.get", json!({}));
    let grading = setup.get("grading").cloned().unwrap_or_default();
    assert_eq!(grading.get("maxGrade").and_then(|v| v.as_f64()), Some(100.0));
    assert_eq!(grading.get("displayDecimals").and_then(|v| v.as_i64()), Some(2));
    let auth = setup.get("auth").cloned().unwrap_or_default();
    assert_eq!(auth.get("accessTtlSeconds").and_then(|v| v.as_i64()), Some(900));
}

#[test]
fn max_grade_bounds_every_edit_path() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, "gradebook-setup-scale");
    let _ = request_ok(&mut stdin, &mut reader, "auth", "auth.issue", json!({}));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "setup.update",
        json!({ "section": "grading", "patch": { "maxGrade": 10 } }),
    );

    let proposed = request(
        &mut stdin,
        &mut reader,
        "2",
        "grades.propose",
        json!({ "studentId": 1001, "category": "Quiz1", "raw": "55.5" }),
    );
    assert_eq!(error_code(&proposed), Some("out_of_range"));

    let committed = request(
        &mut stdin,
        &mut reader,
        "3",
        "grades.commit",
        json!({ "courseId": 101, "studentId": 1001, "category": "Quiz1", "raw": "10.5" }),
    );
    assert_eq!(error_code(&committed), Some("out_of_range"));

    let bulk = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.bulkCommit",
        json!({
            "courseId": 101,
            "edits": [{ "studentId": 1001, "category": "Quiz1", "raw": "11" }]
        }),
    );
    assert_eq!(bulk.get("updated").and_then(|v| v.as_u64()), Some(0));

    let accepted = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "grades.propose",
        json!({ "studentId": 1001, "category": "Quiz1", "raw": "10" }),
    );
    assert_eq!(accepted.get("value").and_then(|v| v.as_f64()), Some(10.0));
}

#[test]
fn display_decimals_change_final_grade_text() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, "gradebook-setup-decimals");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "setup.update",
        json!({ "section": "grading", "patch": { "displayDecimals": 1 } }),
    );
    let fg = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.finalGrade",
        json!({ "courseId": 101, "studentId": 1001 }),
    );
    assert_eq!(fg.get("finalGradeText").and_then(|v| v.as_str()), Some("5.7"));
}

#[test]
fn invalid_patches_are_rejected_without_saving() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, "gradebook-setup-invalid");

    for (i, patch) in [
        json!({ "maxGrade": 0 }),
        json!({ "maxGrade": "ten" }),
        json!({ "displayDecimals": 9 }),
        json!({ "passMark": 5 }),
    ]
    .into_iter()
    .enumerate()
    {
        let r = request(
            &mut stdin,
            &mut reader,
            &format!("bad-{}", i),
            "setup.update",
            json!({ "section": "grading", "patch": patch.clone() }),
        );
        assert_eq!(error_code(&r), Some("bad_params"), "{}", patch);
    }

    let r = request(
        &mut stdin,
        &mut reader,
        "section",
        "setup.update",
        json!({ "section": "printing", "patch": {} }),
    );
    assert_eq!(error_code(&r), Some("bad_params"));

    let setup = request_ok(&mut stdin, &mut reader, "get", "setup.get", json!({}));
    assert_eq!(
        setup
            .get("grading")
            .and_then(|g| g.get("maxGrade"))
            .and_then(|v| v.as_f64()),
        Some(100.0)
    );
}

#[test]
fn malformed_stored_key_does_not_discard_valid_ones() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = open_workspace(&mut stdin, &mut reader, "gradebook-setup-stored");

    // Written behind the daemon's back: displayDecimals sorts first and is
    // out of range, maxGrade after it is valid.
    let conn = rusqlite::Connection::open(workspace.join("gradebook.sqlite3")).expect("open db");
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES('setup.grading', ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        [json!({ "displayDecimals": 9, "maxGrade": 10 }).to_string()],
    )
    .expect("write settings");
    drop(conn);

    let setup = request_ok(&mut stdin, &mut reader, "1", "setup.get", json!({}));
    let grading = setup.get("grading").cloned().unwrap_or_default();
    assert_eq!(grading.get("maxGrade").and_then(|v| v.as_f64()), Some(10.0));
    assert_eq!(grading.get("displayDecimals").and_then(|v| v.as_i64()), Some(2));

    let proposed = request(
        &mut stdin,
        &mut reader,
        "2",
        "grades.propose",
        json!({ "studentId": 1001, "category": "Quiz1", "raw": "55.5" }),
    );
    assert_eq!(error_code(&proposed), Some("out_of_range"));
}
