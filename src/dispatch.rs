use serde::Serialize;
use thiserror::Error;

use crate::auth::{with_reauth, AuthContext};
use crate::calc::{AssessmentKind, ExamType};
use crate::sink::{GradeSink, GradeSubmission, SinkError};

pub const GRADE_MIN: f64 = 0.0;

/// Bounds every proposed edit is validated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeScale {
    pub min: f64,
    pub max: f64,
}

impl Default for GradeScale {
    fn default() -> Self {
        Self {
            min: GRADE_MIN,
            max: 100.0,
        }
    }
}

/// A configured grading category of a course.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingCategory {
    pub module_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AssessmentKind,
    pub exam_type: Option<ExamType>,
    pub item_number: i64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("grade must be a number: {input:?}")]
    NotANumber { input: String },
    #[error("grade {value} is outside {min}..={max}")]
    OutOfRange { value: f64, min: f64, max: f64 },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotANumber { .. } => "not_a_number",
            Self::OutOfRange { .. } => "out_of_range",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CommitError {
    #[error("grading category not configured for course: {category}")]
    CategoryNotFound { category: String },
    #[error("grade submission failed: {0}")]
    TransportFailure(String),
    #[error("grade submission not authorized")]
    Unauthorized,
}

impl CommitError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CategoryNotFound { .. } => "system_error",
            Self::TransportFailure(_) => "transport_failure",
            Self::Unauthorized => "unauthorized",
        }
    }

    /// Message shown to the user; configuration problems are not
    /// something they can fix themselves.
    pub fn user_message(&self) -> String {
        match self {
            Self::CategoryNotFound { .. } => {
                "system error, contact the administrator".to_string()
            }
            Self::TransportFailure(_) => "could not save grade, please try again".to_string(),
            Self::Unauthorized => "session expired, please sign in again".to_string(),
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(self, Self::TransportFailure(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    pub submission: GradeSubmission,
    pub reauthenticated: bool,
}

/// Validates a raw cell input. Nothing is committed.
pub fn propose_edit(
    student_id: i64,
    category: &str,
    raw_input: &str,
    scale: GradeScale,
) -> Result<f64, ValidationError> {
    let trimmed = raw_input.trim();
    let value = match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            log::debug!(
                "rejecting non-numeric grade for student {} / {}: {:?}",
                student_id,
                category,
                raw_input
            );
            return Err(ValidationError::NotANumber {
                input: raw_input.to_string(),
            });
        }
    };
    if value < scale.min || value > scale.max {
        return Err(ValidationError::OutOfRange {
            value,
            min: scale.min,
            max: scale.max,
        });
    }
    Ok(value)
}

/// Submits one validated edit. The category is resolved before any
/// submission. Cached grade sets are never touched here; the caller
/// refetches from the store.
pub fn commit_edit<S: GradeSink>(
    sink: &mut S,
    auth: &mut AuthContext,
    course_id: i64,
    categories: &[GradingCategory],
    student_id: i64,
    category: &str,
    value: f64,
) -> Result<CommitOutcome, CommitError> {
    let Some(cat) = categories.iter().find(|c| c.name == category) else {
        log::warn!(
            "commit rejected: category {:?} not configured for course {}",
            category,
            course_id
        );
        return Err(CommitError::CategoryNotFound {
            category: category.to_string(),
        });
    };

    let submission = GradeSubmission {
        course_id,
        module_id: cat.module_id,
        item_number: cat.item_number,
        student_id,
        new_score: value,
        component: cat.kind.component(),
        source: cat.kind.source(),
    };

    match with_reauth(auth, |a| sink.submit(a, &submission)) {
        Ok(done) => {
            log::info!(
                "committed grade {} for student {} in course {} module {}",
                value,
                student_id,
                course_id,
                cat.module_id
            );
            Ok(CommitOutcome {
                submission,
                reauthenticated: done.refreshed,
            })
        }
        Err(SinkError::Unauthorized) => {
            log::warn!("commit for student {} not authorized", student_id);
            Err(CommitError::Unauthorized)
        }
        Err(SinkError::Transport(msg)) => {
            log::warn!("commit for student {} failed: {}", student_id, msg);
            Err(CommitError::TransportFailure(msg))
        }
    }
}
