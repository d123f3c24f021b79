use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "coursebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            password_hash TEXT NOT NULL,
            is_superuser INTEGER NOT NULL DEFAULT 0,
            date_joined TEXT NOT NULL
        )",
        [],
    )?;

    // One row per user; a user without a row has no role.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS profiles(
            user_id TEXT PRIMARY KEY,
            role TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_profiles_role ON profiles(role)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            course_code TEXT NOT NULL UNIQUE,
            course_name TEXT NOT NULL
        )",
        [],
    )?;
    // Workspaces created before syllabus support lack the column.
    ensure_courses_syllabus(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_instructors(
            course_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            PRIMARY KEY(course_id, user_id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_instructors_user ON course_instructors(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_students(
            course_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            PRIMARY KEY(course_id, user_id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_students_user ON course_students(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluation_components(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            name TEXT NOT NULL,
            percentage INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            UNIQUE(course_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_evaluation_components_course ON evaluation_components(course_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS learning_outcomes(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            description TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_learning_outcomes_course ON learning_outcomes(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS program_outcomes(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL
        )",
        [],
    )?;

    // score is stored in hundredths; NULL means not graded yet.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            component_id TEXT NOT NULL,
            score INTEGER,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES users(id),
            FOREIGN KEY(component_id) REFERENCES evaluation_components(id),
            UNIQUE(student_id, component_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_component ON grades(component_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_courses_syllabus(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "courses", "syllabus")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE courses ADD COLUMN syllabus TEXT", [])?;
    Ok(())
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// True when `err` is SQLite rejecting a UNIQUE or PRIMARY KEY constraint.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
