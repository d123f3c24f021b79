//! Weighted final grades.
//!
//! `final = Σ score_i × weight_i / 100` over the components that have a
//! score. Ungraded components add nothing and the sum is never rescaled to
//! the graded weight, so a course with 40% of its weight graded reports at
//! most 40. All arithmetic is on integer hundredths and the result is
//! rounded half-up to two decimals.

use crate::courses::{self, Course};
use crate::evaluation::{self, EvaluationComponent};
use crate::grades::{self, Score};
use rusqlite::Connection;
use serde::Serialize;

/// `n / d` rounded half away from zero. `d` must be positive.
pub fn div_round_half_up(n: i64, d: i64) -> i64 {
    debug_assert!(d > 0);
    let q = n / d;
    let r = n % d;
    if r.abs() * 2 >= d {
        q + n.signum()
    } else {
        q
    }
}

/// Weighted sum over `(weight, score)` pairs; `None` scores contribute zero.
pub fn weighted_final<I>(items: I) -> Score
where
    I: IntoIterator<Item = (i64, Option<Score>)>,
{
    // score (1e-2) × weight (percent, 1e-2) accumulates in units of 1e-4.
    let sum: i64 = items
        .into_iter()
        .filter_map(|(weight, score)| score.map(|s| s.hundredths() * weight))
        .sum();
    Score::from_hundredths(div_round_half_up(sum, 100))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentGrade {
    pub component_id: String,
    pub name: String,
    pub percentage: i64,
    pub score: Option<Score>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseReport {
    pub course: Course,
    pub components: Vec<ComponentGrade>,
    pub graded_weight: i64,
    pub total_weight: i64,
    pub final_grade: Score,
}

pub fn course_report(
    conn: &Connection,
    course: Course,
    student_id: &str,
) -> rusqlite::Result<CourseReport> {
    let components: Vec<EvaluationComponent> = evaluation::list_components(conn, &course.id)?;
    let component_ids: Vec<String> = components.iter().map(|c| c.id.clone()).collect();
    let scores = grades::scores_for(conn, &[student_id.to_string()], &component_ids)?;

    let graded: Vec<ComponentGrade> = components
        .iter()
        .map(|c| ComponentGrade {
            component_id: c.id.clone(),
            name: c.name.clone(),
            percentage: c.percentage,
            score: scores.get(&(student_id.to_string(), c.id.clone())).copied(),
        })
        .collect();

    let final_grade = weighted_final(graded.iter().map(|g| (g.percentage, g.score)));
    let graded_weight = graded
        .iter()
        .filter(|g| g.score.is_some())
        .map(|g| g.percentage)
        .sum();

    Ok(CourseReport {
        course,
        total_weight: evaluation::total_weight(&components),
        graded_weight,
        components: graded,
        final_grade,
    })
}

/// Reports for every course the student is enrolled in, ordered by course code.
pub fn student_report(conn: &Connection, student_id: &str) -> rusqlite::Result<Vec<CourseReport>> {
    courses::courses_enrolled_by(conn, student_id)?
        .into_iter()
        .map(|course| course_report(conn, course, student_id))
        .collect()
}
