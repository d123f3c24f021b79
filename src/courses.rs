use crate::accounts::{self, Identity};
use crate::db::is_unique_violation;
use crate::error::{AppError, AppResult};
use crate::policy::Role;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

const COURSE_CODE_MAX_LEN: usize = 10;
const COURSE_NAME_MAX_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub course_code: String,
    pub course_name: String,
    pub syllabus: Option<String>,
}

impl Course {
    pub fn label(&self) -> String {
        format!("{} - {}", self.course_code, self.course_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCounts {
    pub courses: i64,
    pub instructors: i64,
    pub students: i64,
}

fn course_from_row(r: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: r.get(0)?,
        course_code: r.get(1)?,
        course_name: r.get(2)?,
        syllabus: r.get(3)?,
    })
}

pub fn create_course(conn: &Connection, code: &str, name: &str) -> AppResult<Course> {
    let code = code.trim();
    let name = name.trim();
    if code.is_empty() {
        return Err(AppError::validation("bad_params", "course code is required"));
    }
    if code.chars().count() > COURSE_CODE_MAX_LEN {
        return Err(AppError::validation(
            "bad_params",
            format!("course code must be at most {} characters", COURSE_CODE_MAX_LEN),
        ));
    }
    if name.is_empty() {
        return Err(AppError::validation("bad_params", "course name is required"));
    }
    if name.chars().count() > COURSE_NAME_MAX_LEN {
        return Err(AppError::validation(
            "bad_params",
            format!("course name must be at most {} characters", COURSE_NAME_MAX_LEN),
        ));
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(id, course_code, course_name) VALUES(?, ?, ?)",
        (&id, code, name),
    ) {
        if is_unique_violation(&e) {
            return Err(AppError::validation(
                "duplicate_course_code",
                format!("a course with code {} already exists", code),
            ));
        }
        return Err(e.into());
    }

    tracing::info!(course = %code, "created course");
    Ok(Course {
        id,
        course_code: code.to_string(),
        course_name: name.to_string(),
        syllabus: None,
    })
}

pub fn get_course(conn: &Connection, course_id: &str) -> rusqlite::Result<Option<Course>> {
    conn.query_row(
        "SELECT id, course_code, course_name, syllabus FROM courses WHERE id = ?",
        [course_id],
        course_from_row,
    )
    .optional()
}

/// The course, but only if `instructor_id` teaches it.
pub fn get_course_taught_by(
    conn: &Connection,
    course_id: &str,
    instructor_id: &str,
) -> rusqlite::Result<Option<Course>> {
    conn.query_row(
        "SELECT c.id, c.course_code, c.course_name, c.syllabus
         FROM courses c
         JOIN course_instructors ci ON ci.course_id = c.id
         WHERE c.id = ? AND ci.user_id = ?",
        (course_id, instructor_id),
        course_from_row,
    )
    .optional()
}

pub fn list_courses(conn: &Connection) -> rusqlite::Result<Vec<Course>> {
    let mut stmt = conn.prepare(
        "SELECT id, course_code, course_name, syllabus FROM courses ORDER BY course_code",
    )?;
    let rows = stmt
        .query_map([], course_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn courses_taught_by(conn: &Connection, instructor_id: &str) -> rusqlite::Result<Vec<Course>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.course_code, c.course_name, c.syllabus
         FROM courses c
         JOIN course_instructors ci ON ci.course_id = c.id
         WHERE ci.user_id = ?
         ORDER BY c.course_code",
    )?;
    let rows = stmt
        .query_map([instructor_id], course_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn courses_enrolled_by(conn: &Connection, student_id: &str) -> rusqlite::Result<Vec<Course>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.course_code, c.course_name, c.syllabus
         FROM courses c
         JOIN course_students cs ON cs.course_id = c.id
         WHERE cs.user_id = ?
         ORDER BY c.course_code",
    )?;
    let rows = stmt
        .query_map([student_id], course_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Enrolled students ordered by last name, first name.
pub fn students_of(conn: &Connection, course_id: &str) -> rusqlite::Result<Vec<Identity>> {
    let mut stmt = conn.prepare(
        "SELECT u.id
         FROM users u
         JOIN course_students cs ON cs.user_id = u.id
         WHERE cs.course_id = ?
         ORDER BY u.last_name, u.first_name, u.username",
    )?;
    let ids = stmt
        .query_map([course_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(identity) = accounts::find_identity(conn, &id)? {
            out.push(identity);
        }
    }
    Ok(out)
}

pub fn instructors_of(conn: &Connection, course_id: &str) -> rusqlite::Result<Vec<Identity>> {
    let mut stmt = conn.prepare(
        "SELECT u.id
         FROM users u
         JOIN course_instructors ci ON ci.user_id = u.id
         WHERE ci.course_id = ?
         ORDER BY u.last_name, u.first_name, u.username",
    )?;
    let ids = stmt
        .query_map([course_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(identity) = accounts::find_identity(conn, &id)? {
            out.push(identity);
        }
    }
    Ok(out)
}

pub fn is_enrolled(conn: &Connection, course_id: &str, student_id: &str) -> rusqlite::Result<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM course_students WHERE course_id = ? AND user_id = ?",
            (course_id, student_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Instructor,
    Student,
}

impl Membership {
    fn table(self) -> &'static str {
        match self {
            Membership::Instructor => "course_instructors",
            Membership::Student => "course_students",
        }
    }

    fn role(self) -> Role {
        match self {
            Membership::Instructor => Role::Instructor,
            Membership::Student => Role::Student,
        }
    }
}

/// Outcome of adding a member to a course.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub course: Course,
    pub member: Identity,
    /// False when the member was already linked; re-adding is a no-op.
    pub inserted: bool,
}

pub fn assign_instructor(conn: &Connection, course_id: &str, user_id: &str) -> AppResult<Assignment> {
    add_member(conn, course_id, user_id, Membership::Instructor)
}

pub fn assign_student(conn: &Connection, course_id: &str, user_id: &str) -> AppResult<Assignment> {
    add_member(conn, course_id, user_id, Membership::Student)
}

fn add_member(
    conn: &Connection,
    course_id: &str,
    user_id: &str,
    kind: Membership,
) -> AppResult<Assignment> {
    let Some(course) = get_course(conn, course_id)? else {
        return Err(AppError::validation("bad_params", "select a valid course"));
    };
    let member = accounts::find_identity(conn, user_id)?;
    let Some(member) = member.filter(|m| m.role == Some(kind.role())) else {
        return Err(AppError::validation(
            "bad_params",
            format!("select a valid {}", kind.role().label().to_ascii_lowercase()),
        ));
    };

    let sql = format!(
        "INSERT OR IGNORE INTO {}(course_id, user_id) VALUES(?, ?)",
        kind.table()
    );
    let inserted = conn.execute(&sql, (&course.id, &member.id))? > 0;
    tracing::info!(
        course = %course.course_code,
        user = %member.username,
        role = %kind.role(),
        inserted,
        "course membership"
    );
    Ok(Assignment {
        course,
        member,
        inserted,
    })
}

/// `None` clears the syllabus.
pub fn set_syllabus(conn: &Connection, course_id: &str, syllabus: Option<&str>) -> AppResult<()> {
    let syllabus = syllabus.map(str::trim).filter(|s| !s.is_empty());
    let changed = conn.execute(
        "UPDATE courses SET syllabus = ? WHERE id = ?",
        (syllabus, course_id),
    )?;
    if changed == 0 {
        return Err(AppError::NotFound("course"));
    }
    Ok(())
}

pub fn registry_counts(conn: &Connection) -> rusqlite::Result<RegistryCounts> {
    let courses: i64 = conn.query_row("SELECT COUNT(*) FROM courses", [], |r| r.get(0))?;
    Ok(RegistryCounts {
        courses,
        instructors: accounts::count_with_role(conn, Role::Instructor)?,
        students: accounts::count_with_role(conn, Role::Student)?,
    })
}
