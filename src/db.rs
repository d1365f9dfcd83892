use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::backend::{AuthProvider, GradeRepository, RegistrationRepository};
use crate::error::AuthError;
use crate::grades;
use crate::models::{GradeComponents, GradeKey, GradeRecord, GradeResult, LetterGrade, Session};
use crate::registration::{hash_password, RegistrationRequest};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub struct PgPortal {
    pool: PgPool,
}

impl PgPortal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub async fn seed(portal: &PgPortal) -> anyhow::Result<()> {
    let accounts = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Avery Lee",
            "avery.lee@uni.edu",
            "student",
            "Engineering",
            "Computer Science",
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Jules Moreno",
            "jules.moreno@uni.edu",
            "student",
            "Science",
            "Mathematics",
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Kiara Patel",
            "kiara.patel@uni.edu",
            "teacher",
            "Engineering",
            "Computer Science",
        ),
    ];

    let password_hash = hash_password("portal123");
    for (id, name, email, role, college, department) in accounts {
        sqlx::query(
            r#"
            INSERT INTO portal.accounts (id, email, password_hash, role, full_name, college, department)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name, role = EXCLUDED.role,
                college = EXCLUDED.college, department = EXCLUDED.department
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(&password_hash)
        .bind(role)
        .bind(name)
        .bind(college)
        .bind(department)
        .execute(portal.pool())
        .await?;
    }

    let courses = vec![
        ("CS101", "Introduction to Programming", "Computer Science"),
        ("MATH201", "Linear Algebra", "Mathematics"),
    ];
    for (code, title, department) in courses {
        sqlx::query(
            r#"
            INSERT INTO portal.courses (code, title, department)
            VALUES ($1, $2, $3)
            ON CONFLICT (code) DO UPDATE SET title = EXCLUDED.title
            "#,
        )
        .bind(code)
        .bind(title)
        .bind(department)
        .execute(portal.pool())
        .await?;
    }

    let grade_rows = vec![
        ("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2", "CS101", 27.0, 28.0, 37.0),
        ("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2", "MATH201", 21.0, 19.0, 30.0),
        ("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc", "MATH201", 25.0, 24.0, 33.0),
    ];
    for (student, course, coursework, midterm, final_exam) in grade_rows {
        let key = GradeKey {
            student_id: Uuid::parse_str(student)?,
            course_code: course.to_string(),
            academic_year: "2025/2026".to_string(),
            semester: "fall".to_string(),
        };
        let components = grades::normalize(coursework, midterm, final_exam);
        let result = grades::compute_grade(coursework, midterm, final_exam);
        portal.save_grade(&key, &components, &result).await?;
    }

    Ok(())
}

#[async_trait]
impl GradeRepository for PgPortal {
    async fn save_grade(
        &self,
        key: &GradeKey,
        components: &GradeComponents,
        result: &GradeResult,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO portal.grades
            (id, student_id, course_code, academic_year, semester,
             coursework, midterm, final_exam, total, letter_grade, gpa_points, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now())
            ON CONFLICT (student_id, course_code, academic_year, semester) DO UPDATE
            SET coursework = EXCLUDED.coursework, midterm = EXCLUDED.midterm,
                final_exam = EXCLUDED.final_exam, total = EXCLUDED.total,
                letter_grade = EXCLUDED.letter_grade, gpa_points = EXCLUDED.gpa_points,
                updated_at = now()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key.student_id)
        .bind(&key.course_code)
        .bind(&key.academic_year)
        .bind(&key.semester)
        .bind(components.coursework)
        .bind(components.midterm)
        .bind(components.final_exam)
        .bind(result.total)
        .bind(result.letter.as_str())
        .bind(result.gpa_points)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            "Saved grade {} ({:.1}) for {} in {} {} {}",
            result.letter,
            result.total,
            key.student_id,
            key.course_code,
            key.academic_year,
            key.semester
        );
        Ok(())
    }

    async fn grades_for_student(&self, student_id: Uuid) -> anyhow::Result<Vec<GradeRecord>> {
        let rows = sqlx::query(
            "SELECT student_id, course_code, academic_year, semester, coursework, midterm, \
             final_exam, total, letter_grade, gpa_points, updated_at \
             FROM portal.grades \
             WHERE student_id = $1 \
             ORDER BY academic_year, semester, course_code",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::new();
        for row in rows {
            let total: f64 = row.get("total");
            let letter: String = row.get("letter_grade");
            records.push(GradeRecord {
                key: GradeKey {
                    student_id: row.get("student_id"),
                    course_code: row.get("course_code"),
                    academic_year: row.get("academic_year"),
                    semester: row.get("semester"),
                },
                components: GradeComponents {
                    coursework: row.get("coursework"),
                    midterm: row.get("midterm"),
                    final_exam: row.get("final_exam"),
                },
                result: GradeResult {
                    total,
                    letter: LetterGrade::parse(&letter)
                        .unwrap_or_else(|| grades::letter_for_total(total)),
                    gpa_points: row.get("gpa_points"),
                },
                updated_at: row.get("updated_at"),
            });
        }

        Ok(records)
    }
}

#[async_trait]
impl RegistrationRepository for PgPortal {
    async fn create_registration_request(
        &self,
        request: &RegistrationRequest,
    ) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO portal.registration_requests
            (id, first_name, last_name, email, date_of_birth, gender, phone, address, city,
             college, department, program, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(id)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.email)
        .bind(request.date_of_birth)
        .bind(&request.gender)
        .bind(&request.phone)
        .bind(&request.address)
        .bind(&request.city)
        .bind(&request.college)
        .bind(&request.department)
        .bind(&request.program)
        .bind(&request.password_hash)
        .execute(&self.pool)
        .await?;

        tracing::info!("Registration request {} created for {}", id, request.email);
        Ok(id)
    }
}

#[async_trait]
impl AuthProvider for PgPortal {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let row = sqlx::query(
            "SELECT id, email, role, password_hash FROM portal.accounts WHERE lower(email) = lower($1)",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) if row.get::<String, _>("password_hash") == hash_password(password) => {
                Ok(Session {
                    user_id: row.get("id"),
                    email: row.get("email"),
                    role: row.get("role"),
                })
            }
            _ => Err(AuthError::Rejected("Invalid login credentials".to_string())),
        }
    }
}

pub async fn import_grades_csv(
    portal: &PgPortal,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_id: Uuid,
        course_code: String,
        academic_year: String,
        semester: String,
        #[serde(default)]
        coursework: String,
        #[serde(default)]
        midterm: String,
        #[serde(default, rename = "final")]
        final_exam: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let key = GradeKey {
            student_id: row.student_id,
            course_code: row.course_code.trim().to_string(),
            academic_year: row.academic_year.trim().to_string(),
            semester: row.semester.trim().to_string(),
        };
        let (components, grade) =
            grades::compute_from_input(&row.coursework, &row.midterm, &row.final_exam);
        portal.save_grade(&key, &components, &grade).await?;
        imported += 1;
    }

    Ok(imported)
}
