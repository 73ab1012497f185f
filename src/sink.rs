use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::AuthContext;

#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("submission rejected: not authenticated")]
    Unauthorized,
    #[error("submission failed: {0}")]
    Transport(String),
}

/// Payload accepted by the grade submission collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSubmission {
    pub course_id: i64,
    pub module_id: i64,
    pub item_number: i64,
    pub student_id: i64,
    pub new_score: f64,
    pub component: &'static str,
    pub source: &'static str,
}

pub trait GradeSink {
    fn submit(&mut self, auth: &AuthContext, submission: &GradeSubmission) -> Result<(), SinkError>;
}

/// Writes submissions straight into the workspace grade record store.
pub struct SqliteGradeSink<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteGradeSink<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn transport(e: rusqlite::Error) -> SinkError {
    SinkError::Transport(e.to_string())
}

impl GradeSink for SqliteGradeSink<'_> {
    fn submit(&mut self, auth: &AuthContext, sub: &GradeSubmission) -> Result<(), SinkError> {
        let now = Utc::now();
        if !auth.is_valid_at(now) {
            return Err(SinkError::Unauthorized);
        }

        let enrolled: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM enrolments WHERE course_id = ? AND student_id = ?",
                (sub.course_id, sub.student_id),
                |r| r.get(0),
            )
            .optional()
            .map_err(transport)?;
        if enrolled.is_none() {
            return Err(SinkError::Transport(format!(
                "student {} is not enrolled in course {}",
                sub.student_id, sub.course_id
            )));
        }

        let module: Option<(String, Option<String>, String)> = self
            .conn
            .query_row(
                "SELECT name, exam_type, kind FROM grade_categories
                 WHERE course_id = ? AND module_id = ?",
                (sub.course_id, sub.module_id),
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()
            .map_err(transport)?;
        let Some((module_name, exam_type, kind)) = module else {
            return Err(SinkError::Transport(format!(
                "module {} not found in course {}",
                sub.module_id, sub.course_id
            )));
        };

        let stamp = now.to_rfc3339();
        let tx = self.conn.unchecked_transaction().map_err(transport)?;
        tx.execute(
            "INSERT INTO grades(course_id, module_id, student_id, module_name, exam_type,
                                kind, item_number, grade, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(course_id, module_id, student_id) DO UPDATE SET
               grade = excluded.grade,
               updated_at = excluded.updated_at",
            (
                sub.course_id,
                sub.module_id,
                sub.student_id,
                &module_name,
                exam_type.as_deref().unwrap_or(""),
                &kind,
                sub.item_number,
                sub.new_score,
                &stamp,
            ),
        )
        .map_err(transport)?;
        tx.execute(
            "INSERT INTO grade_submissions(id, course_id, module_id, student_id, new_score,
                                           component, source, submitted_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                sub.course_id,
                sub.module_id,
                sub.student_id,
                sub.new_score,
                sub.component,
                sub.source,
                &stamp,
            ),
        )
        .map_err(transport)?;
        tx.commit().map_err(transport)?;
        Ok(())
    }
}
