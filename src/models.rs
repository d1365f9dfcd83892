use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GradeComponents {
    pub coursework: f64,
    pub midterm: f64,
    pub final_exam: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
}

impl LetterGrade {
    pub fn gpa_points(self) -> f64 {
        match self {
            LetterGrade::A => 4.0,
            LetterGrade::B => 3.0,
            LetterGrade::C => 2.0,
            LetterGrade::D => 1.0,
            LetterGrade::F => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LetterGrade::A => "A",
            LetterGrade::B => "B",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "A" => Some(LetterGrade::A),
            "B" => Some(LetterGrade::B),
            "C" => Some(LetterGrade::C),
            "D" => Some(LetterGrade::D),
            "F" => Some(LetterGrade::F),
            _ => None,
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeResult {
    pub total: f64,
    pub letter: LetterGrade,
    pub gpa_points: f64,
}

/// Identity of one persisted grade record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GradeKey {
    pub student_id: Uuid,
    pub course_code: String,
    pub academic_year: String,
    pub semester: String,
}

#[derive(Debug, Clone)]
pub struct GradeRecord {
    pub key: GradeKey,
    pub components: GradeComponents,
    pub result: GradeResult,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthAttemptState {
    pub attempt_count: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RememberedIdentity {
    pub email: String,
    pub college: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
}
