use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id INTEGER PRIMARY KEY,
            fullname TEXT NOT NULL,
            shortname TEXT,
            summary TEXT,
            imported_at TEXT NOT NULL
        )",
        [],
    )?;

    // Configured grading categories of a course, in display order.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_categories(
            course_id INTEGER NOT NULL,
            module_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            exam_type TEXT,
            item_number INTEGER NOT NULL DEFAULT 0,
            grade_min REAL,
            grade_max REAL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(course_id, module_id),
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_categories_course_sort
         ON grade_categories(course_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY,
            fullname TEXT NOT NULL,
            firstname TEXT,
            lastname TEXT,
            email TEXT,
            username TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrolments(
            course_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(course_id, student_id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrolments_student ON enrolments(student_id)",
        [],
    )?;

    // Grade rows carry their own module name and exam type: the source may
    // report grades for modules that are not configured categories.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            course_id INTEGER NOT NULL,
            module_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            module_name TEXT NOT NULL,
            exam_type TEXT NOT NULL,
            kind TEXT NOT NULL,
            item_number INTEGER NOT NULL DEFAULT 0,
            grade REAL NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(course_id, module_id, student_id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_course_student ON grades(course_id, student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_submissions(
            id TEXT PRIMARY KEY,
            course_id INTEGER NOT NULL,
            module_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            new_score REAL NOT NULL,
            component TEXT NOT NULL,
            source TEXT NOT NULL,
            submitted_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_submissions_course ON grade_submissions(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    log::info!("workspace database ready at {}", db_path.display());
    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
