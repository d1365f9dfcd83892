use std::fmt::Write;

use uuid::Uuid;

use crate::grades;
use crate::models::GradeRecord;

pub fn build_transcript(student_id: Uuid, records: &[GradeRecord]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Transcript");
    let _ = writeln!(output, "Student {}", student_id);
    let _ = writeln!(output);

    if records.is_empty() {
        let _ = writeln!(output, "No grades recorded.");
        return output;
    }

    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| {
        (&a.key.academic_year, &a.key.semester, &a.key.course_code).cmp(&(
            &b.key.academic_year,
            &b.key.semester,
            &b.key.course_code,
        ))
    });

    let mut current_term: Option<(String, String)> = None;
    for record in sorted.iter() {
        let term = (record.key.academic_year.clone(), record.key.semester.clone());
        if current_term.as_ref() != Some(&term) {
            let _ = writeln!(output, "## {} {}", term.0, term.1);
            let _ = writeln!(
                output,
                "| Course | Coursework | Midterm | Final | Total | Grade | Points |"
            );
            let _ = writeln!(output, "|---|---|---|---|---|---|---|");
            current_term = Some(term);
        }
        let _ = writeln!(
            output,
            "| {} | {:.1} | {:.1} | {:.1} | {:.1} | {} | {:.1} |",
            record.key.course_code,
            record.components.coursework,
            record.components.midterm,
            record.components.final_exam,
            record.result.total,
            record.result.letter,
            record.result.gpa_points
        );
    }

    let _ = writeln!(output);
    if let Some(gpa) = grades::cumulative_gpa(records) {
        let _ = writeln!(
            output,
            "Cumulative GPA: {:.2} across {} courses",
            gpa,
            records.len()
        );
    }
    if let Some(latest) = records.iter().map(|record| record.updated_at).max() {
        let _ = writeln!(output, "Last updated {}", latest.format("%Y-%m-%d"));
    }

    output
}
