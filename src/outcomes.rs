use crate::db::is_unique_violation;
use crate::error::{AppError, AppResult};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

const PROGRAM_OUTCOME_CODE_MAX_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningOutcome {
    pub id: String,
    pub course_id: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramOutcome {
    pub id: String,
    pub code: String,
    pub description: String,
}

pub fn create_learning_outcome(
    conn: &Connection,
    course_id: &str,
    description: &str,
) -> AppResult<LearningOutcome> {
    let description = description.trim();
    if description.is_empty() {
        return Err(AppError::validation("bad_params", "outcome description is required"));
    }
    let next_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM learning_outcomes WHERE course_id = ?",
        [course_id],
        |r| r.get(0),
    )?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO learning_outcomes(id, course_id, description, sort_order) VALUES(?, ?, ?, ?)",
        (&id, course_id, description, next_order),
    )?;
    tracing::info!(course_id, "created learning outcome");
    Ok(LearningOutcome {
        id,
        course_id: course_id.to_string(),
        description: description.to_string(),
    })
}

pub fn list_learning_outcomes(conn: &Connection, course_id: &str) -> rusqlite::Result<Vec<LearningOutcome>> {
    let mut stmt = conn.prepare(
        "SELECT id, course_id, description
         FROM learning_outcomes
         WHERE course_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([course_id], |r| {
            Ok(LearningOutcome {
                id: r.get(0)?,
                course_id: r.get(1)?,
                description: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn create_program_outcome(conn: &Connection, code: &str, description: &str) -> AppResult<ProgramOutcome> {
    let code = code.trim();
    let description = description.trim();
    if code.is_empty() {
        return Err(AppError::validation("bad_params", "outcome code is required"));
    }
    if code.chars().count() > PROGRAM_OUTCOME_CODE_MAX_LEN {
        return Err(AppError::validation(
            "bad_params",
            format!("outcome code must be at most {} characters", PROGRAM_OUTCOME_CODE_MAX_LEN),
        ));
    }
    if description.is_empty() {
        return Err(AppError::validation("bad_params", "outcome description is required"));
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO program_outcomes(id, code, description) VALUES(?, ?, ?)",
        (&id, code, description),
    ) {
        if is_unique_violation(&e) {
            return Err(AppError::validation(
                "duplicate_program_outcome",
                format!("a program outcome with code {} already exists", code),
            ));
        }
        return Err(e.into());
    }
    tracing::info!(code, "created program outcome");
    Ok(ProgramOutcome {
        id,
        code: code.to_string(),
        description: description.to_string(),
    })
}

pub fn list_program_outcomes(conn: &Connection) -> rusqlite::Result<Vec<ProgramOutcome>> {
    let mut stmt = conn.prepare("SELECT id, code, description FROM program_outcomes ORDER BY code")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ProgramOutcome {
                id: r.get(0)?,
                code: r.get(1)?,
                description: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
