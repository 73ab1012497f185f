use crate::calc;
use crate::dispatch::{self, CommitError, ValidationError};
use crate::gradebook;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::grading_settings;
use crate::ipc::helpers::{raw_input, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::sink::SqliteGradeSink;
use serde_json::json;

const GRADES_BULK_COMMIT_MAX_EDITS: usize = 5000;

fn validation_response(id: &str, e: &ValidationError) -> serde_json::Value {
    let details = match e {
        ValidationError::NotANumber { input } => json!({ "input": input }),
        ValidationError::OutOfRange { value, min, max } => {
            json!({ "value": value, "min": min, "max": max })
        }
    };
    err(id, e.code(), e.to_string(), Some(details))
}

fn commit_response(id: &str, e: &CommitError) -> serde_json::Value {
    err(
        id,
        e.code(),
        e.user_message(),
        Some(json!({ "retryable": e.retryable(), "cause": e.to_string() })),
    )
}

fn handle_grades_table(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let settings = match grading_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let session = state.session_for(course_id);
    match gradebook::course_grade_table(conn, course_id, session, settings.display_decimals) {
        Ok(Some(table)) => match serde_json::to_value(&table) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
        },
        Ok(None) => err(&req.id, "not_found", "course not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_grades_final_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match required_i64(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let settings = match grading_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let set = match gradebook::student_grade_set(conn, course_id, student_id) {
        Ok(Some(s)) => s,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "student not enrolled in course",
                Some(json!({ "courseId": course_id, "studentId": student_id })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let final_grade = calc::final_grade(&set);
    ok(
        &req.id,
        json!({
            "courseId": course_id,
            "studentId": student_id,
            "conditionalGrade": calc::conditional_grade(&set),
            "finalGrade": final_grade,
            "finalGradeText": calc::format_grade(final_grade, settings.display_decimals),
            "classification": calc::classify(final_grade)
        }),
    )
}

fn handle_grades_propose(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_i64(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let category = match required_str(req, "category") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(raw) = raw_input(req.params.get("raw")) else {
        return err(&req.id, "bad_params", "missing raw", None);
    };
    let settings = match grading_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    match dispatch::propose_edit(student_id, category, &raw, settings.scale) {
        Ok(value) => ok(&req.id, json!({ "value": value })),
        Err(e) => validation_response(&req.id, &e),
    }
}

fn handle_grades_commit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match required_i64(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let category = match required_str(req, "category") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(raw) = raw_input(req.params.get("raw")) else {
        return err(&req.id, "bad_params", "missing raw", None);
    };
    let settings = match grading_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let value = match dispatch::propose_edit(student_id, category, &raw, settings.scale) {
        Ok(v) => v,
        Err(e) => return validation_response(&req.id, &e),
    };
    let categories = match gradebook::load_categories(conn, course_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut sink = SqliteGradeSink::new(conn);
    let outcome = match dispatch::commit_edit(
        &mut sink,
        &mut state.auth,
        course_id,
        &categories,
        student_id,
        category,
        value,
    ) {
        Ok(v) => v,
        Err(e) => return commit_response(&req.id, &e),
    };

    // The store is the source of truth: report the refetched aggregate.
    let refreshed = match gradebook::student_grade_set(conn, course_id, student_id) {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let final_grade = calc::final_grade(&refreshed);

    ok(
        &req.id,
        json!({
            "value": value,
            "submission": outcome.submission,
            "reauthenticated": outcome.reauthenticated,
            "finalGrade": final_grade,
            "finalGradeText": calc::format_grade(final_grade, settings.display_decimals),
            "classification": calc::classify(final_grade)
        }),
    )
}

fn handle_grades_bulk_commit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(edits_arr) = req.params.get("edits").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing edits[]", None);
    };

    if edits_arr.len() > GRADES_BULK_COMMIT_MAX_EDITS {
        let rejected = edits_arr.len();
        return ok(
            &req.id,
            json!({
                "ok": true,
                "updated": 0,
                "rejected": rejected,
                "limitExceeded": true,
                "errors": [{
                    "index": -1,
                    "code": "too_many_edits",
                    "message": format!(
                        "bulk payload exceeds max edits: {} > {}",
                        rejected, GRADES_BULK_COMMIT_MAX_EDITS
                    )
                }]
            }),
        );
    }

    let settings = match grading_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let categories = match gradebook::load_categories(conn, course_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut sink = SqliteGradeSink::new(conn);
    let mut updated: usize = 0;
    let mut errors: Vec<serde_json::Value> = Vec::new();

    for (i, edit) in edits_arr.iter().enumerate() {
        let Some(obj) = edit.as_object() else {
            errors.push(json!({
                "index": i,
                "code": "bad_params",
                "message": format!("edit at index {} must be an object", i),
            }));
            continue;
        };
        let Some(student_id) = obj.get("studentId").and_then(|v| v.as_i64()) else {
            errors.push(json!({
                "index": i,
                "code": "bad_params",
                "message": format!("edit at index {} missing/invalid studentId", i),
            }));
            continue;
        };
        let Some(category) = obj.get("category").and_then(|v| v.as_str()) else {
            errors.push(json!({
                "index": i,
                "studentId": student_id,
                "code": "bad_params",
                "message": format!("edit at index {} missing/invalid category", i),
            }));
            continue;
        };
        let Some(raw) = raw_input(obj.get("raw")) else {
            errors.push(json!({
                "index": i,
                "studentId": student_id,
                "category": category,
                "code": "bad_params",
                "message": format!("edit at index {} missing raw", i),
            }));
            continue;
        };

        let value = match dispatch::propose_edit(student_id, category, &raw, settings.scale) {
            Ok(v) => v,
            Err(e) => {
                errors.push(json!({
                    "index": i,
                    "studentId": student_id,
                    "category": category,
                    "code": e.code(),
                    "message": e.to_string(),
                }));
                continue;
            }
        };

        match dispatch::commit_edit(
            &mut sink,
            &mut state.auth,
            course_id,
            &categories,
            student_id,
            category,
            value,
        ) {
            Ok(_) => updated += 1,
            Err(e) => errors.push(json!({
                "index": i,
                "studentId": student_id,
                "category": category,
                "code": e.code(),
                "message": e.user_message(),
                "retryable": e.retryable(),
            })),
        }
    }

    let rejected = errors.len();
    let mut result = json!({ "ok": true, "updated": updated });
    if rejected > 0 {
        if let Some(obj) = result.as_object_mut() {
            obj.insert("rejected".into(), json!(rejected));
            obj.insert("errors".into(), json!(errors));
        }
    }

    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.table" => Some(handle_grades_table(state, req)),
        "grades.finalGrade" => Some(handle_grades_final_grade(state, req)),
        "grades.propose" => Some(handle_grades_propose(state, req)),
        "grades.commit" => Some(handle_grades_commit(state, req)),
        "grades.bulkCommit" => Some(handle_grades_bulk_commit(state, req)),
        _ => None,
    }
}
