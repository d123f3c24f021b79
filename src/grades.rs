//! Grade ledger: one optional score per (student, component).

use crate::accounts::Identity;
use crate::courses;
use crate::db::now_rfc3339;
use crate::evaluation::{self, EvaluationComponent};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Largest storable score, 999.99.
pub const SCORE_MAX_HUNDREDTHS: i64 = 99_999;

pub const GRADE_FIELD_PREFIX: &str = "grade_";

/// A score held exactly as hundredths of a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score(i64);

impl Score {
    pub fn from_hundredths(v: i64) -> Score {
        Score(v)
    }

    pub fn hundredths(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellError {
    NotANumber,
    OutOfRange,
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellError::NotANumber => f.write_str("not a decimal number"),
            CellError::OutOfRange => f.write_str("score outside -999.99..=999.99"),
        }
    }
}

/// Splits `<mantissa>[eE][+-]<digits>`; a missing exponent is zero.
fn split_exponent(t: &str) -> Result<(&str, i64), CellError> {
    let Some(i) = t.find(['e', 'E']) else {
        return Ok((t, 0));
    };
    let exp = &t[i + 1..];
    let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CellError::NotANumber);
    }
    let exp: i64 = exp.parse().map_err(|_| CellError::NotANumber)?;
    Ok((&t[..i], exp))
}

/// Parses one grade cell. Blank means "not graded". Accepts an optional
/// sign and exponent (`8e1` is 80). Digits beyond hundredths are rounded
/// half away from zero.
pub fn parse_score(raw: &str) -> Result<Option<Score>, CellError> {
    let t = raw.trim();
    if t.is_empty() {
        return Ok(None);
    }
    let (negative, t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let (mantissa, exp) = split_exponent(t)?;

    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(CellError::NotANumber);
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CellError::NotANumber);
    }

    // value = digits × 10^-scale, and hundredths = digits × 10^shift.
    let digits = format!("{}{}", int_part, frac_part);
    let digits = digits.trim_start_matches('0');
    let shift = exp.saturating_add(2).saturating_sub(frac_part.len() as i64);
    let max_digits = SCORE_MAX_HUNDREDTHS.to_string().len();

    let magnitude = if digits.is_empty() {
        0
    } else if shift >= 0 {
        if shift.saturating_add(digits.len() as i64) > max_digits as i64 {
            return Err(CellError::OutOfRange);
        }
        let v: i64 = digits.parse().map_err(|_| CellError::NotANumber)?;
        v * 10_i64.pow(shift as u32)
    } else {
        let drop = shift.unsigned_abs();
        if drop > digits.len() as u64 {
            0
        } else {
            let keep = digits.len() - drop as usize;
            let kept = &digits[..keep];
            if kept.len() > max_digits {
                return Err(CellError::OutOfRange);
            }
            let v: i64 = if kept.is_empty() {
                0
            } else {
                kept.parse().map_err(|_| CellError::NotANumber)?
            };
            if digits.as_bytes()[keep] >= b'5' {
                v + 1
            } else {
                v
            }
        }
    };

    if magnitude > SCORE_MAX_HUNDREDTHS {
        return Err(CellError::OutOfRange);
    }
    Ok(Some(Score(if negative { -magnitude } else { magnitude })))
}

/// Create-or-update keyed by (student, component); the last write wins.
pub fn upsert_grade(
    conn: &Connection,
    student_id: &str,
    component_id: &str,
    score: Option<Score>,
) -> rusqlite::Result<()> {
    let grade_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO grades(id, student_id, component_id, score, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(student_id, component_id) DO UPDATE SET
           score = excluded.score,
           updated_at = excluded.updated_at",
        (
            &grade_id,
            student_id,
            component_id,
            score.map(Score::hundredths),
            now_rfc3339(),
        ),
    )?;
    Ok(())
}

/// `None` when no row exists; `Some(None)` when the row exists ungraded.
pub fn get_grade(
    conn: &Connection,
    student_id: &str,
    component_id: &str,
) -> rusqlite::Result<Option<Option<Score>>> {
    conn.query_row(
        "SELECT score FROM grades WHERE student_id = ? AND component_id = ?",
        (student_id, component_id),
        |r| Ok(r.get::<_, Option<i64>>(0)?.map(Score)),
    )
    .optional()
}

/// Scores for the given students and components, keyed by (student, component).
/// Ungraded rows are omitted.
pub fn scores_for(
    conn: &Connection,
    student_ids: &[String],
    component_ids: &[String],
) -> rusqlite::Result<HashMap<(String, String), Score>> {
    let mut out = HashMap::new();
    if student_ids.is_empty() || component_ids.is_empty() {
        return Ok(out);
    }

    let stud_placeholders = std::iter::repeat("?")
        .take(student_ids.len())
        .collect::<Vec<_>>()
        .join(",");
    let comp_placeholders = std::iter::repeat("?")
        .take(component_ids.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT student_id, component_id, score
         FROM grades
         WHERE student_id IN ({}) AND component_id IN ({}) AND score IS NOT NULL",
        stud_placeholders, comp_placeholders
    );
    let bind: Vec<Value> = student_ids
        .iter()
        .chain(component_ids.iter())
        .map(|s| Value::Text(s.clone()))
        .collect();

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind))?;
    while let Some(row) = rows.next()? {
        let student_id: String = row.get(0)?;
        let component_id: String = row.get(1)?;
        let score: i64 = row.get(2)?;
        out.insert((student_id, component_id), Score(score));
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MalformedKey,
    StudentNotEnrolled,
    ComponentNotInCourse,
    BadScore(CellError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MalformedKey => f.write_str("malformed grade field name"),
            SkipReason::StudentNotEnrolled => f.write_str("student is not enrolled in the course"),
            SkipReason::ComponentNotInCourse => f.write_str("component does not belong to the course"),
            SkipReason::BadScore(e) => write!(f, "bad score: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCell {
    pub field: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub updated: usize,
    pub skipped: Vec<SkippedCell>,
}

/// Splits `grade_<studentId>_<componentId>`.
pub fn parse_grade_field(field: &str) -> Option<(&str, &str)> {
    let rest = field.strip_prefix(GRADE_FIELD_PREFIX)?;
    let (student_id, component_id) = rest.split_once('_')?;
    if student_id.is_empty() || component_id.is_empty() || component_id.contains('_') {
        return None;
    }
    Some((student_id, component_id))
}

/// Applies every `grade_*` field of a submitted form to one course. Each
/// cell is written independently; a bad cell is recorded and skipped.
pub fn apply_grade_batch<'a, I>(conn: &Connection, course_id: &str, fields: I) -> rusqlite::Result<BatchOutcome>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut outcome = BatchOutcome::default();
    for (field, value) in fields {
        if !field.starts_with(GRADE_FIELD_PREFIX) {
            continue;
        }
        let skip = |reason| SkippedCell {
            field: field.to_string(),
            reason,
        };

        let Some((student_id, component_id)) = parse_grade_field(field) else {
            outcome.skipped.push(skip(SkipReason::MalformedKey));
            continue;
        };
        if evaluation::component_course(conn, component_id)?.as_deref() != Some(course_id) {
            outcome.skipped.push(skip(SkipReason::ComponentNotInCourse));
            continue;
        }
        if !courses::is_enrolled(conn, course_id, student_id)? {
            outcome.skipped.push(skip(SkipReason::StudentNotEnrolled));
            continue;
        }
        let score = match parse_score(value) {
            Ok(v) => v,
            Err(e) => {
                outcome.skipped.push(skip(SkipReason::BadScore(e)));
                continue;
            }
        };

        upsert_grade(conn, student_id, component_id, score)?;
        outcome.updated += 1;
    }

    for s in &outcome.skipped {
        tracing::debug!(course_id, field = %s.field, reason = %s.reason, "skipped grade cell");
    }
    tracing::info!(
        course_id,
        updated = outcome.updated,
        skipped = outcome.skipped.len(),
        "applied grade batch"
    );
    Ok(outcome)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeCell {
    pub component_id: String,
    pub score: Option<Score>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGradeRow {
    pub student_id: String,
    pub username: String,
    pub display_name: String,
    pub grades: Vec<GradeCell>,
}

/// One row per student, one cell per component, in the given orders.
pub fn grade_matrix(
    conn: &Connection,
    students: &[Identity],
    components: &[EvaluationComponent],
) -> rusqlite::Result<Vec<StudentGradeRow>> {
    let student_ids: Vec<String> = students.iter().map(|s| s.id.clone()).collect();
    let component_ids: Vec<String> = components.iter().map(|c| c.id.clone()).collect();
    let scores = scores_for(conn, &student_ids, &component_ids)?;

    Ok(students
        .iter()
        .map(|student| StudentGradeRow {
            student_id: student.id.clone(),
            username: student.username.clone(),
            display_name: student.display_name(),
            grades: components
                .iter()
                .map(|c| GradeCell {
                    component_id: c.id.clone(),
                    score: scores.get(&(student.id.clone(), c.id.clone())).copied(),
                })
                .collect(),
        })
        .collect())
}
