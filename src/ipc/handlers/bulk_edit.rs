use crate::gradebook;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::session::{BulkEditSession, TransitionError};
use serde_json::json;

enum Transition<'a> {
    EditCategory,
    EditAll,
    Select(&'a str),
    Exit,
}

fn session_response(
    id: &str,
    course_id: i64,
    session: &BulkEditSession,
    categories: &[String],
) -> serde_json::Value {
    let highlighted: Vec<&String> = categories
        .iter()
        .filter(|c| session.is_highlighted(c))
        .collect();
    let mut body = session.to_json();
    if let Some(obj) = body.as_object_mut() {
        obj.insert("courseId".into(), json!(course_id));
        obj.insert("highlighted".into(), json!(highlighted));
    }
    ok(id, body)
}

fn transition_response(id: &str, e: &TransitionError) -> serde_json::Value {
    let details = match e {
        TransitionError::UnknownCategory(c) => Some(json!({ "category": c })),
        _ => None,
    };
    err(id, "bad_transition", e.to_string(), details)
}

fn apply(state: &mut AppState, req: &Request, transition: Transition<'_>) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(view) = state.view.as_mut() else {
        return err(&req.id, "no_course_open", "open a course first", None);
    };
    if let Some(requested) = req.params.get("courseId").and_then(|v| v.as_i64()) {
        if requested != view.course_id {
            return err(
                &req.id,
                "no_course_open",
                "course is not the open view",
                Some(json!({ "openCourseId": view.course_id, "courseId": requested })),
            );
        }
    }

    let categories = match gradebook::load_categories(conn, view.course_id) {
        Ok(v) => gradebook::category_names(&v),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let result = match transition {
        Transition::EditCategory => view.bulk_edit.edit_category(&categories),
        Transition::EditAll => view.bulk_edit.edit_all(),
        Transition::Select(c) => view.bulk_edit.select_category(c, &categories),
        Transition::Exit => {
            view.bulk_edit.exit();
            Ok(())
        }
    };
    if let Err(e) = result {
        log::debug!("bulk edit transition rejected: {}", e);
        return transition_response(&req.id, &e);
    }

    session_response(&req.id, view.course_id, &view.bulk_edit, &categories)
}

fn handle_bulk_edit_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(view) = state.view.as_ref() else {
        return err(&req.id, "no_course_open", "open a course first", None);
    };
    match gradebook::load_categories(conn, view.course_id) {
        Ok(v) => session_response(
            &req.id,
            view.course_id,
            &view.bulk_edit,
            &gradebook::category_names(&v),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "bulkEdit.get" => Some(handle_bulk_edit_get(state, req)),
        "bulkEdit.editCategory" => Some(apply(state, req, Transition::EditCategory)),
        "bulkEdit.editAll" => Some(apply(state, req, Transition::EditAll)),
        "bulkEdit.selectCategory" => Some(match required_str(req, "category") {
            Ok(c) => apply(state, req, Transition::Select(c)),
            Err(resp) => resp,
        }),
        "bulkEdit.exit" => Some(apply(state, req, Transition::Exit)),
        _ => None,
    }
}
