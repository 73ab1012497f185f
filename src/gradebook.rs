use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

use crate::calc::{self, AssessmentKind, Classification, ExamType, GradeEntry, StudentGradeSet};
use crate::dispatch::GradingCategory;
use crate::session::BulkEditSession;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRef {
    pub id: i64,
    pub fullname: String,
    pub shortname: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EnrolledStudent {
    pub id: i64,
    pub fullname: String,
    pub grades: StudentGradeSet,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryColumn {
    pub module_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AssessmentKind,
    pub exam_type: Option<ExamType>,
    pub highlighted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub student_id: i64,
    pub name: String,
    /// Raw value per configured category, in column order; 0 when missing.
    pub values: Vec<f64>,
    pub grades: StudentGradeSet,
    pub conditional_grade: f64,
    pub final_grade: f64,
    pub final_grade_text: String,
    pub classification: Classification,
    pub category_average: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseGradeTable {
    pub course: CourseRef,
    pub categories: Vec<CategoryColumn>,
    pub students: Vec<StudentRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentCourseGrade {
    pub course_id: i64,
    pub fullname: String,
    pub shortname: Option<String>,
    pub final_grade: f64,
    pub final_grade_text: String,
    pub classification: Classification,
    pub category_average: f64,
}

pub fn load_course(conn: &Connection, course_id: i64) -> anyhow::Result<Option<CourseRef>> {
    let course = conn
        .query_row(
            "SELECT id, fullname, shortname, summary FROM courses WHERE id = ?",
            [course_id],
            |r| {
                Ok(CourseRef {
                    id: r.get(0)?,
                    fullname: r.get(1)?,
                    shortname: r.get(2)?,
                    summary: r.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(course)
}

pub fn load_categories(conn: &Connection, course_id: i64) -> anyhow::Result<Vec<GradingCategory>> {
    let mut stmt = conn.prepare(
        "SELECT module_id, name, kind, exam_type, item_number
         FROM grade_categories
         WHERE course_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([course_id], |r| {
            let kind: String = r.get(2)?;
            let exam_type: Option<String> = r.get(3)?;
            Ok(GradingCategory {
                module_id: r.get(0)?,
                name: r.get(1)?,
                kind: AssessmentKind::parse(&kind).unwrap_or(AssessmentKind::Quiz),
                exam_type: exam_type.as_deref().map(ExamType::parse),
                item_number: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn category_names(categories: &[GradingCategory]) -> Vec<String> {
    categories.iter().map(|c| c.name.clone()).collect()
}

/// Maps columns 1..=6 of a grade query (module_id .. grade).
fn grade_entry(r: &rusqlite::Row<'_>) -> rusqlite::Result<GradeEntry> {
    let exam_type: String = r.get(3)?;
    let kind: String = r.get(4)?;
    Ok(GradeEntry {
        module_id: r.get(1)?,
        module_name: r.get(2)?,
        exam_type: ExamType::parse(&exam_type),
        kind: AssessmentKind::parse(&kind).unwrap_or(AssessmentKind::Quiz),
        item_number: r.get(5)?,
        grade: r.get(6)?,
    })
}

/// Enrolled students with a fresh snapshot of their grade sets.
pub fn load_grade_sets(conn: &Connection, course_id: i64) -> anyhow::Result<Vec<EnrolledStudent>> {
    let mut stud_stmt = conn.prepare(
        "SELECT s.id, s.fullname
         FROM enrolments e
         JOIN students s ON s.id = e.student_id
         WHERE e.course_id = ?
         ORDER BY e.sort_order",
    )?;
    let mut students: Vec<EnrolledStudent> = stud_stmt
        .query_map([course_id], |r| {
            Ok(EnrolledStudent {
                id: r.get(0)?,
                fullname: r.get(1)?,
                grades: StudentGradeSet::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let index: HashMap<i64, usize> = students
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id, i))
        .collect();

    // rowid order keeps "later report wins" for duplicate module names.
    let mut grade_stmt = conn.prepare(
        "SELECT student_id, module_id, module_name, exam_type, kind, item_number, grade
         FROM grades
         WHERE course_id = ?
         ORDER BY rowid",
    )?;
    let rows = grade_stmt.query_map([course_id], |r| Ok((r.get::<_, i64>(0)?, grade_entry(r)?)))?;
    for row in rows {
        let (student_id, entry) = row?;
        let Some(&i) = index.get(&student_id) else {
            continue;
        };
        students[i].grades.insert(entry);
    }

    Ok(students)
}

pub fn student_grade_set(
    conn: &Connection,
    course_id: i64,
    student_id: i64,
) -> anyhow::Result<Option<StudentGradeSet>> {
    let enrolled = conn
        .query_row(
            "SELECT 1 FROM enrolments WHERE course_id = ? AND student_id = ?",
            (course_id, student_id),
            |_| Ok(()),
        )
        .optional()?;
    if enrolled.is_none() {
        return Ok(None);
    }

    let mut stmt = conn.prepare(
        "SELECT student_id, module_id, module_name, exam_type, kind, item_number, grade
         FROM grades
         WHERE course_id = ? AND student_id = ?
         ORDER BY rowid",
    )?;
    let grades = stmt
        .query_map((course_id, student_id), grade_entry)?
        .collect::<Result<StudentGradeSet, _>>()?;
    Ok(Some(grades))
}

pub fn course_grade_table(
    conn: &Connection,
    course_id: i64,
    session: Option<&BulkEditSession>,
    decimals: u32,
) -> anyhow::Result<Option<CourseGradeTable>> {
    let Some(course) = load_course(conn, course_id)? else {
        return Ok(None);
    };
    let categories = load_categories(conn, course_id)?;
    let students = load_grade_sets(conn, course_id)?;

    let columns: Vec<CategoryColumn> = categories
        .iter()
        .map(|c| CategoryColumn {
            module_id: c.module_id,
            name: c.name.clone(),
            kind: c.kind,
            exam_type: c.exam_type.clone(),
            highlighted: session.map(|s| s.is_highlighted(&c.name)).unwrap_or(false),
        })
        .collect();

    let rows = students
        .into_iter()
        .map(|s| {
            let values: Vec<f64> = categories
                .iter()
                .map(|c| s.grades.get(&c.name).map(|e| e.grade).unwrap_or(0.0))
                .collect();
            let raw: Vec<f64> = s.grades.entries().map(|e| e.grade).collect();
            let final_grade = calc::final_grade(&s.grades);
            StudentRow {
                student_id: s.id,
                name: s.fullname,
                values,
                conditional_grade: calc::conditional_grade(&s.grades),
                final_grade,
                final_grade_text: calc::format_grade(final_grade, decimals),
                classification: calc::classify(final_grade),
                category_average: calc::category_average(&raw),
                grades: s.grades,
            }
        })
        .collect();

    Ok(Some(CourseGradeTable {
        course,
        categories: columns,
        students: rows,
    }))
}

pub fn student_courses(
    conn: &Connection,
    student_id: i64,
    decimals: u32,
) -> anyhow::Result<Vec<StudentCourseGrade>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.fullname, c.shortname
         FROM enrolments e
         JOIN courses c ON c.id = e.course_id
         WHERE e.student_id = ?
         ORDER BY c.fullname",
    )?;
    let courses: Vec<(i64, String, Option<String>)> = stmt
        .query_map([student_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(courses.len());
    for (course_id, fullname, shortname) in courses {
        let grades = student_grade_set(conn, course_id, student_id)?.unwrap_or_default();
        let raw: Vec<f64> = grades.entries().map(|e| e.grade).collect();
        let final_grade = calc::final_grade(&grades);
        out.push(StudentCourseGrade {
            course_id,
            fullname,
            shortname,
            final_grade,
            final_grade_text: calc::format_grade(final_grade, decimals),
            classification: calc::classify(final_grade),
            category_average: calc::category_average(&raw),
        });
    }
    Ok(out)
}
