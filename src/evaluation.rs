//! Per-course weighted evaluation components.
//!
//! Weights are plain integers. Nothing requires a course's weights to add up
//! to 100; partially defined schemes are accepted as they are.

use crate::db::is_unique_violation;
use crate::error::{AppError, AppResult};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

const COMPONENT_NAME_MAX_LEN: usize = 100;
pub const WEIGHT_MAX: i64 = 32767;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationComponent {
    pub id: String,
    pub course_id: String,
    pub name: String,
    pub percentage: i64,
}

pub fn parse_weight(raw: &str) -> AppResult<i64> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(AppError::validation("bad_params", "percentage is required"));
    }
    let Ok(v) = t.parse::<i64>() else {
        return Err(AppError::validation("bad_params", "percentage must be a whole number"));
    };
    if !(0..=WEIGHT_MAX).contains(&v) {
        return Err(AppError::validation(
            "bad_params",
            format!("percentage must be between 0 and {}", WEIGHT_MAX),
        ));
    }
    Ok(v)
}

pub fn create_component(
    conn: &Connection,
    course_id: &str,
    name: &str,
    percentage: i64,
) -> AppResult<EvaluationComponent> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("bad_params", "component name is required"));
    }
    if name.chars().count() > COMPONENT_NAME_MAX_LEN {
        return Err(AppError::validation(
            "bad_params",
            format!("component name must be at most {} characters", COMPONENT_NAME_MAX_LEN),
        ));
    }
    if !(0..=WEIGHT_MAX).contains(&percentage) {
        return Err(AppError::validation(
            "bad_params",
            format!("percentage must be between 0 and {}", WEIGHT_MAX),
        ));
    }

    let next_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM evaluation_components WHERE course_id = ?",
        [course_id],
        |r| r.get(0),
    )?;
    let id = Uuid::new_v4().to_string();
    // (course_id, name) uniqueness is left to the table constraint.
    if let Err(e) = conn.execute(
        "INSERT INTO evaluation_components(id, course_id, name, percentage, sort_order)
         VALUES(?, ?, ?, ?, ?)",
        (&id, course_id, name, percentage, next_order),
    ) {
        if is_unique_violation(&e) {
            return Err(AppError::validation(
                "duplicate_component",
                format!("this course already has a component named {}", name),
            ));
        }
        return Err(e.into());
    }

    tracing::info!(course_id, component = %name, percentage, "created evaluation component");
    Ok(EvaluationComponent {
        id,
        course_id: course_id.to_string(),
        name: name.to_string(),
        percentage,
    })
}

/// Components in creation order.
pub fn list_components(conn: &Connection, course_id: &str) -> rusqlite::Result<Vec<EvaluationComponent>> {
    let mut stmt = conn.prepare(
        "SELECT id, course_id, name, percentage
         FROM evaluation_components
         WHERE course_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([course_id], |r| {
            Ok(EvaluationComponent {
                id: r.get(0)?,
                course_id: r.get(1)?,
                name: r.get(2)?,
                percentage: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn component_course(conn: &Connection, component_id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT course_id FROM evaluation_components WHERE id = ?",
        [component_id],
        |r| r.get(0),
    )
    .optional()
}

pub fn total_weight(components: &[EvaluationComponent]) -> i64 {
    components.iter().map(|c| c.percentage).sum()
}
