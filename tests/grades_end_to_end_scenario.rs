mod test_support;

use serde_json::json;
use test_support::{fixture_path, request_ok, spawn_sidecar, temp_dir};

fn student_row(table: &serde_json::Value, student_id: i64) -> serde_json::Value {
    table
        .get("students")
        .and_then(|v| v.as_array())
        .and_then(|rows| {
            rows.iter()
                .find(|r| r.get("studentId").and_then(|v| v.as_i64()) == Some(student_id))
        })
        .cloned()
        .expect("student row")
}

fn final_grade_of(table: &serde_json::Value, student_id: i64) -> f64 {
    student_row(table, student_id)
        .get("finalGrade")
        .and_then(|v| v.as_f64())
        .expect("finalGrade")
}

#[test]
fn bulk_edit_commit_then_refetch_updates_final_grade() {
    let workspace = temp_dir("gradebook-e2e");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let import = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "course.import",
        json!({ "path": fixture_path("fixtures/courses/infantry_tactics.json").to_string_lossy() }),
    );
    let course_id = import.get("courseId").and_then(|v| v.as_i64()).expect("courseId");
    assert_eq!(course_id, 101);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "course.open",
        json!({ "courseId": course_id }),
    );

    let before = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.table",
        json!({ "courseId": course_id }),
    );
    // conditional = (7 + 0*2)/3, final = conditional*0.4 + 8*0.6
    let expected_before = (7.0 / 3.0) * 0.4 + 8.0 * 0.6;
    assert!((final_grade_of(&before, 1001) - expected_before).abs() < 1e-9);
    assert_eq!(
        student_row(&before, 1001)
            .get("finalGradeText")
            .and_then(|v| v.as_str()),
        Some("5.73")
    );
    assert_eq!(
        student_row(&before, 1001)
            .get("classification")
            .and_then(|v| v.as_str()),
        Some("TB")
    );

    let session = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "bulkEdit.editAll",
        json!({ "courseId": course_id }),
    );
    assert_eq!(session.get("mode").and_then(|v| v.as_str()), Some("all-grades"));

    let _ = request_ok(&mut stdin, &mut reader, "6", "auth.issue", json!({}));

    let proposed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "grades.propose",
        json!({ "studentId": 1001, "category": "Quiz1", "raw": "9" }),
    );
    assert_eq!(proposed.get("value").and_then(|v| v.as_f64()), Some(9.0));

    let committed = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "grades.commit",
        json!({ "courseId": course_id, "studentId": 1001, "category": "Quiz1", "raw": "9" }),
    );
    let submission = committed.get("submission").cloned().expect("submission");
    assert_eq!(submission.get("moduleId").and_then(|v| v.as_i64()), Some(11));
    assert_eq!(submission.get("component").and_then(|v| v.as_str()), Some("mod_quiz"));
    assert_eq!(submission.get("source").and_then(|v| v.as_str()), Some("mod/quiz"));
    assert!((committed.get("finalGrade").and_then(|v| v.as_f64()).unwrap_or(0.0) - 6.0).abs() < 1e-9);

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "grades.table",
        json!({ "courseId": course_id }),
    );
    let row = student_row(&after, 1001);
    assert_eq!(
        row.get("grades")
            .and_then(|g| g.get("Quiz1"))
            .and_then(|e| e.get("grade"))
            .and_then(|v| v.as_f64()),
        Some(9.0)
    );
    assert!((final_grade_of(&after, 1001) - 6.0).abs() < 1e-9);
    assert!((row.get("conditionalGrade").and_then(|v| v.as_f64()).unwrap_or(0.0) - 3.0).abs() < 1e-9);

    // Other students are untouched and the bulk session survives the refetch.
    assert!((final_grade_of(&after, 1002) - expected_before).abs() < 1e-9);
    let highlighted = after
        .get("categories")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(highlighted.len(), 2);
    assert!(highlighted
        .iter()
        .all(|c| c.get("highlighted").and_then(|v| v.as_bool()) == Some(true)));
}
