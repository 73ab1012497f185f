use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::auth::AuthContext;
use crate::session::BulkEditSession;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The course currently shown by the presentation layer. Opening another
/// course (or closing) drops it, along with its bulk-edit session.
#[derive(Debug)]
pub struct CourseView {
    pub course_id: i64,
    pub bulk_edit: BulkEditSession,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub view: Option<CourseView>,
    pub auth: AuthContext,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            view: None,
            auth: AuthContext::new(),
        }
    }

    /// Bulk-edit session for `course_id` if that course is the open view.
    pub fn session_for(&self, course_id: i64) -> Option<&BulkEditSession> {
        self.view
            .as_ref()
            .filter(|v| v.course_id == course_id)
            .map(|v| &v.bulk_edit)
    }
}
