use crate::gradebook;
use crate::import::{self, CoursePayload};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::grading_settings;
use crate::ipc::helpers::required_i64;
use crate::ipc::types::{AppState, CourseView, Request};
use crate::session::BulkEditSession;
use serde_json::json;
use std::path::PathBuf;

fn handle_course_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let payload: CoursePayload = if let Some(path) = req.params.get("path").and_then(|v| v.as_str())
    {
        match import::read_payload(&PathBuf::from(path)) {
            Ok(p) => p,
            Err(e) => {
                return err(
                    &req.id,
                    e.code(),
                    e.to_string(),
                    Some(json!({ "path": path })),
                )
            }
        }
    } else if let Some(raw) = req.params.get("payload") {
        match serde_json::from_value(raw.clone()) {
            Ok(p) => p,
            Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
        }
    } else {
        return err(&req.id, "bad_params", "missing path or payload", None);
    };

    let summary = match import::import_course(conn, &payload) {
        Ok(s) => s,
        Err(e) => return err(&req.id, e.code(), e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "courseId": summary.course_id,
            "categoryCount": summary.category_count,
            "studentCount": summary.student_count,
            "gradeCount": summary.grade_count
        }),
    )
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "courses": [] }));
    };

    // Correlated subqueries avoid double-counting from joins.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.fullname,
           c.shortname,
           (SELECT COUNT(*) FROM enrolments e WHERE e.course_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM grade_categories g WHERE g.course_id = c.id) AS category_count
         FROM courses c
         ORDER BY c.fullname",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let fullname: String = row.get(1)?;
            let shortname: Option<String> = row.get(2)?;
            let student_count: i64 = row.get(3)?;
            let category_count: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "fullname": fullname,
                "shortname": shortname,
                "studentCount": student_count,
                "categoryCount": category_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_course_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_i64(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let course = match gradebook::load_course(conn, course_id) {
        Ok(Some(c)) => c,
        Ok(None) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Navigating always starts a fresh session, even for the same course.
    let view = CourseView {
        course_id,
        bulk_edit: BulkEditSession::new(),
    };
    let session = view.bulk_edit.to_json();
    state.view = Some(view);

    ok(&req.id, json!({ "course": course, "bulkEdit": session }))
}

fn handle_course_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    let closed = state.view.take().map(|v| v.course_id);
    ok(&req.id, json!({ "closedCourseId": closed }))
}

fn handle_student_courses(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_i64(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let settings = match grading_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    match gradebook::student_courses(conn, student_id, settings.display_decimals) {
        Ok(courses) => ok(
            &req.id,
            json!({ "studentId": student_id, "courses": courses }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "course.import" => Some(handle_course_import(state, req)),
        "courses.list" => Some(handle_courses_list(state, req)),
        "course.open" => Some(handle_course_open(state, req)),
        "course.close" => Some(handle_course_close(state, req)),
        "student.courses" => Some(handle_student_courses(state, req)),
        _ => None,
    }
}
