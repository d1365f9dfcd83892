use crate::models::{GradeComponents, GradeRecord, GradeResult, LetterGrade};

pub const COURSEWORK_MAX: f64 = 30.0;
pub const MIDTERM_MAX: f64 = 30.0;
pub const FINAL_MAX: f64 = 40.0;

/// Parses a user-entered subscore. Anything that is not a finite number
/// counts as zero.
pub fn parse_subscore(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

fn clamp_subscore(value: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        0.0
    }
}

pub fn letter_for_total(total: f64) -> LetterGrade {
    match total {
        t if t >= 90.0 => LetterGrade::A,
        t if t >= 80.0 => LetterGrade::B,
        t if t >= 70.0 => LetterGrade::C,
        t if t >= 60.0 => LetterGrade::D,
        _ => LetterGrade::F,
    }
}

pub fn compute_grade(coursework: f64, midterm: f64, final_exam: f64) -> GradeResult {
    compute_components(&normalize(coursework, midterm, final_exam))
}

/// Components are expected to be clamped already; see [`normalize`].
pub fn compute_components(components: &GradeComponents) -> GradeResult {
    let total = components.coursework + components.midterm + components.final_exam;
    let letter = letter_for_total(total);
    GradeResult {
        total,
        letter,
        gpa_points: letter.gpa_points(),
    }
}

pub fn normalize(coursework: f64, midterm: f64, final_exam: f64) -> GradeComponents {
    GradeComponents {
        coursework: clamp_subscore(coursework, COURSEWORK_MAX),
        midterm: clamp_subscore(midterm, MIDTERM_MAX),
        final_exam: clamp_subscore(final_exam, FINAL_MAX),
    }
}

pub fn compute_from_input(
    coursework: &str,
    midterm: &str,
    final_exam: &str,
) -> (GradeComponents, GradeResult) {
    let components = normalize(
        parse_subscore(coursework),
        parse_subscore(midterm),
        parse_subscore(final_exam),
    );
    (components, compute_components(&components))
}

pub fn cumulative_gpa(records: &[GradeRecord]) -> Option<f64> {
    if records.is_empty() {
        return None;
    }
    let sum: f64 = records.iter().map(|record| record.result.gpa_points).sum();
    Some(sum / records.len() as f64)
}
