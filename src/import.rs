//! Loads a course snapshot reported by the grade source into the
//! workspace store. A re-import replaces the course wholesale.

use chrono::Utc;
use rusqlite::Connection;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::calc::{AssessmentKind, ExamType};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read course file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed course payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("course fullname must not be empty")]
    EmptyCourseName,
    #[error("duplicate module id {0}")]
    DuplicateModule(i64),
    #[error("duplicate module name {0:?}")]
    DuplicateModuleName(String),
    #[error("module {module_id} has unsupported type {kind:?}")]
    UnsupportedKind { module_id: i64, kind: String },
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io_failed",
            Self::Db(_) => "db_insert_failed",
            _ => "bad_params",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoursePayload {
    pub course: CourseInfo,
    #[serde(default)]
    pub modules: Vec<ModuleInfo>,
    #[serde(default)]
    pub students: Vec<StudentInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourseInfo {
    pub id: i64,
    pub fullname: String,
    #[serde(default)]
    pub shortname: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleInfo {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub examtype: Option<ExamType>,
    #[serde(default)]
    pub itemnumber: Option<i64>,
    #[serde(default)]
    pub grademin: Option<f64>,
    #[serde(default)]
    pub grademax: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudentInfo {
    pub id: i64,
    pub fullname: String,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub grades: Vec<GradeInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GradeInfo {
    pub moduleid: i64,
    pub modulename: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    pub grade: f64,
    #[serde(default)]
    pub examtype: Option<ExamType>,
    #[serde(default)]
    pub itemnumber: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub course_id: i64,
    pub category_count: usize,
    pub student_count: usize,
    pub grade_count: usize,
}

pub fn read_payload(path: &Path) -> Result<CoursePayload, ImportError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

struct ResolvedModule {
    kind: AssessmentKind,
    exam_type: Option<ExamType>,
    item_number: i64,
}

fn resolve_modules(payload: &CoursePayload) -> Result<HashMap<i64, ResolvedModule>, ImportError> {
    let mut out = HashMap::new();
    // Categories are addressed by name when editing and when building grade sets.
    let mut names: HashSet<&str> = HashSet::new();
    for m in &payload.modules {
        let Some(kind) = AssessmentKind::parse(&m.kind) else {
            return Err(ImportError::UnsupportedKind {
                module_id: m.id,
                kind: m.kind.clone(),
            });
        };
        let resolved = ResolvedModule {
            kind,
            exam_type: m.examtype.clone(),
            item_number: m.itemnumber.unwrap_or(0),
        };
        if out.insert(m.id, resolved).is_some() {
            return Err(ImportError::DuplicateModule(m.id));
        }
        if !names.insert(m.name.trim()) {
            return Err(ImportError::DuplicateModuleName(m.name.trim().to_string()));
        }
    }
    Ok(out)
}

pub fn import_course(conn: &Connection, payload: &CoursePayload) -> Result<ImportSummary, ImportError> {
    let fullname = payload.course.fullname.trim();
    if fullname.is_empty() {
        return Err(ImportError::EmptyCourseName);
    }
    let modules = resolve_modules(payload)?;
    let course_id = payload.course.id;

    let tx = conn.unchecked_transaction()?;

    // Replace wholesale; no ON DELETE CASCADE.
    tx.execute("DELETE FROM grades WHERE course_id = ?", [course_id])?;
    tx.execute("DELETE FROM enrolments WHERE course_id = ?", [course_id])?;
    tx.execute("DELETE FROM grade_categories WHERE course_id = ?", [course_id])?;
    tx.execute(
        "INSERT INTO courses(id, fullname, shortname, summary, imported_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           fullname = excluded.fullname,
           shortname = excluded.shortname,
           summary = excluded.summary,
           imported_at = excluded.imported_at",
        (
            course_id,
            fullname,
            &payload.course.shortname,
            &payload.course.summary,
            Utc::now().to_rfc3339(),
        ),
    )?;

    for (i, m) in payload.modules.iter().enumerate() {
        let Some(resolved) = modules.get(&m.id) else {
            continue;
        };
        tx.execute(
            "INSERT INTO grade_categories(course_id, module_id, name, kind, exam_type,
                                          item_number, grade_min, grade_max, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                course_id,
                m.id,
                m.name.trim(),
                resolved.kind.as_str(),
                resolved.exam_type.as_ref().map(|t| t.label().to_string()),
                resolved.item_number,
                m.grademin,
                m.grademax,
                i as i64,
            ),
        )?;
    }

    let mut grade_count = 0usize;
    let mut seen_students: HashSet<i64> = HashSet::new();
    for (i, s) in payload.students.iter().enumerate() {
        if !seen_students.insert(s.id) {
            log::warn!("student {} listed twice in course {}; keeping first", s.id, course_id);
            continue;
        }
        tx.execute(
            "INSERT INTO students(id, fullname, firstname, lastname, email, username)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               fullname = excluded.fullname,
               firstname = excluded.firstname,
               lastname = excluded.lastname,
               email = excluded.email,
               username = excluded.username",
            (
                s.id,
                s.fullname.trim(),
                &s.firstname,
                &s.lastname,
                &s.email,
                &s.username,
            ),
        )?;
        tx.execute(
            "INSERT INTO enrolments(course_id, student_id, sort_order) VALUES(?, ?, ?)",
            (course_id, s.id, i as i64),
        )?;

        for g in &s.grades {
            let module = modules.get(&g.moduleid);
            let kind = g
                .kind
                .as_deref()
                .and_then(AssessmentKind::parse)
                .or(module.map(|m| m.kind))
                .unwrap_or(AssessmentKind::Quiz);
            let exam_type = g
                .examtype
                .clone()
                .or_else(|| module.and_then(|m| m.exam_type.clone()));
            let item_number = g
                .itemnumber
                .or(module.map(|m| m.item_number))
                .unwrap_or(0);

            // Later reports for the same module replace earlier ones.
            tx.execute(
                "INSERT INTO grades(course_id, module_id, student_id, module_name, exam_type,
                                    kind, item_number, grade, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, NULL)
                 ON CONFLICT(course_id, module_id, student_id) DO UPDATE SET
                   module_name = excluded.module_name,
                   exam_type = excluded.exam_type,
                   kind = excluded.kind,
                   item_number = excluded.item_number,
                   grade = excluded.grade",
                (
                    course_id,
                    g.moduleid,
                    s.id,
                    g.modulename.trim(),
                    exam_type.as_ref().map(|t| t.label()).unwrap_or(""),
                    kind.as_str(),
                    item_number,
                    g.grade,
                ),
            )?;
            grade_count += 1;
        }
    }

    tx.commit()?;

    let summary = ImportSummary {
        course_id,
        category_count: payload.modules.len(),
        student_count: seen_students.len(),
        grade_count,
    };
    log::info!(
        "imported course {} ({} categories, {} students, {} grades)",
        course_id,
        summary.category_count,
        summary.student_count,
        summary.grade_count
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(v: serde_json::Value) -> CoursePayload {
        serde_json::from_value(v).expect("payload")
    }

    #[test]
    fn parses_source_exam_type_codes() {
        let p = payload(json!({
            "course": { "id": 3, "fullname": "Tactics" },
            "modules": [
                { "id": 1, "name": "Quiz1", "type": "quiz", "examtype": "15P" },
                { "id": 2, "name": "Final", "type": "assign", "examtype": "Thi" }
            ],
            "students": []
        }));
        assert_eq!(p.modules[0].examtype, Some(ExamType::Quiz15));
        assert_eq!(p.modules[1].examtype, Some(ExamType::FinalExam));
        assert_eq!(AssessmentKind::parse(&p.modules[1].kind), Some(AssessmentKind::Assignment));
    }

    #[test]
    fn duplicate_module_ids_are_rejected() {
        let p = payload(json!({
            "course": { "id": 3, "fullname": "Tactics" },
            "modules": [
                { "id": 1, "name": "A", "type": "quiz" },
                { "id": 1, "name": "B", "type": "quiz" }
            ]
        }));
        assert!(matches!(resolve_modules(&p), Err(ImportError::DuplicateModule(1))));
    }

    #[test]
    fn duplicate_module_names_are_rejected() {
        let p = payload(json!({
            "course": { "id": 3, "fullname": "Tactics" },
            "modules": [
                { "id": 11, "name": "Quiz1", "type": "quiz", "examtype": "15P" },
                { "id": 12, "name": " Quiz1 ", "type": "quiz", "examtype": "1T" },
                { "id": 13, "name": "Final", "type": "assign", "examtype": "Thi" }
            ]
        }));
        let e = resolve_modules(&p).err().expect("error");
        assert!(matches!(&e, ImportError::DuplicateModuleName(n) if n == "Quiz1"));
        assert_eq!(e.code(), "bad_params");
    }

    #[test]
    fn unsupported_module_type_is_rejected() {
        let p = payload(json!({
            "course": { "id": 3, "fullname": "Tactics" },
            "modules": [{ "id": 9, "name": "Forum", "type": "forum" }]
        }));
        let e = resolve_modules(&p).err().expect("error");
        assert_eq!(e.code(), "bad_params");
    }
}
