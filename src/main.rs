use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod backend;
mod clock;
mod config;
mod content;
mod db;
mod error;
mod grades;
mod login;
mod models;
mod registration;
mod remember;
mod report;
mod storage;
mod throttle;

use backend::{GradeRepository, NoBiometrics, RegistrationRepository};
use clock::SystemClock;
use config::PortalConfig;
use db::PgPortal;
use error::LoginError;
use models::{GradeKey, RememberedIdentity};
use registration::{EnrollmentPrompt, RegistrationWizard};
use remember::RememberMeStore;
use storage::{FileStore, KeyValueStore};
use throttle::{AuthThrottle, CountdownExit, CountdownTask};

#[derive(Parser)]
#[command(name = "campus-portal")]
#[command(about = "Grades, sign-in and registration tooling for the university portal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo accounts, courses and grades
    Seed,
    /// Import grade components from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compute a grade from its components, optionally saving it
    Grade {
        #[arg(long, default_value = "")]
        coursework: String,
        #[arg(long, default_value = "")]
        midterm: String,
        #[arg(long = "final", default_value = "")]
        final_exam: String,
        #[arg(long)]
        save: bool,
        #[arg(long)]
        student: Option<Uuid>,
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        year: Option<String>,
        #[arg(long)]
        semester: Option<String>,
    },
    /// Write a markdown transcript for one student
    Transcript {
        #[arg(long)]
        student: Uuid,
        #[arg(long, default_value = "transcript.md")]
        out: PathBuf,
    },
    /// Sign in with email and password
    #[command(group(
        ArgGroup::new("toggle")
            .args(["remember", "forget"])
            .multiple(false)
    ))]
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        college: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        remember: bool,
        #[arg(long)]
        forget: bool,
    },
    /// Show failed sign-in attempts and any active lockout
    LockoutStatus {
        /// Keep counting down until the lockout lapses
        #[arg(long)]
        watch: bool,
    },
    /// Show the remembered sign-in details
    Prefill,
    /// Submit a registration request
    Register {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        date_of_birth: Option<NaiveDate>,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        college: String,
        #[arg(long)]
        department: String,
        #[arg(long)]
        program: Option<String>,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },
    /// Resolve an editable page element from a content file
    Content {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        page: String,
        #[arg(long)]
        element: String,
        #[arg(long, default_value = "")]
        fallback: String,
    },
}

async fn connect(config: &PortalConfig) -> anyhow::Result<PgPortal> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to the portal's Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(PgPortal::new(pool))
}

fn state_store(config: &PortalConfig) -> Arc<dyn KeyValueStore> {
    Arc::new(FileStore::new(&config.state_file))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = PortalConfig::from_env();

    match cli.command {
        Commands::InitDb => {
            let portal = connect(&config).await?;
            db::init_db(portal.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let portal = connect(&config).await?;
            db::seed(&portal).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let portal = connect(&config).await?;
            let imported = db::import_grades_csv(&portal, &csv).await?;
            println!("Imported {imported} grades from {}.", csv.display());
        }
        Commands::Grade {
            coursework,
            midterm,
            final_exam,
            save,
            student,
            course,
            year,
            semester,
        } => {
            let (components, result) =
                grades::compute_from_input(&coursework, &midterm, &final_exam);
            println!(
                "Total {:.1} -> {} ({:.1} points)",
                result.total, result.letter, result.gpa_points
            );

            if save {
                let key = GradeKey {
                    student_id: student.context("--student is required with --save")?,
                    course_code: course.context("--course is required with --save")?,
                    academic_year: year.context("--year is required with --save")?,
                    semester: semester.context("--semester is required with --save")?,
                };
                let portal = connect(&config).await?;
                portal.save_grade(&key, &components, &result).await?;
                println!("Grade saved.");
            }
        }
        Commands::Transcript { student, out } => {
            let portal = connect(&config).await?;
            let records = portal.grades_for_student(student).await?;
            let transcript = report::build_transcript(student, &records);
            std::fs::write(&out, transcript)?;
            println!("Transcript written to {}.", out.display());
        }
        Commands::Login {
            email,
            password,
            college,
            department,
            remember,
            forget,
        } => {
            let store = state_store(&config);
            let throttle = AuthThrottle::new(store.clone(), Arc::new(SystemClock), config.login);
            let remember_store = RememberMeStore::new(store);

            // Without an explicit toggle, keep whatever the prefill had.
            let remember_me = if remember || forget {
                remember
            } else {
                remember_store.load()?.remember_me
            };

            let identity = RememberedIdentity {
                email,
                college,
                department,
            };
            let portal = connect(&config).await?;
            let flow = login::LoginFlow::new(&portal, &throttle, &remember_store);
            match flow.attempt(&identity, &password, remember_me).await {
                Ok(session) => {
                    println!(
                        "Signed in as {} ({}, id {}).",
                        session.email, session.role, session.user_id
                    );
                }
                Err(LoginError::Locked { remaining }) => {
                    anyhow::bail!(
                        "Too many failed attempts. Sign-in is locked for another {}.",
                        remaining
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::LockoutStatus { watch } => {
            let throttle = Arc::new(AuthThrottle::new(
                state_store(&config),
                Arc::new(SystemClock),
                config.login,
            ));
            let now = throttle.now();
            throttle.tick(now)?;
            let state = throttle.state()?;
            println!(
                "Failed attempts: {} of {}",
                state.attempt_count,
                throttle.policy().max_attempts
            );

            if !throttle.is_locked(now)? {
                println!("Sign-in is open.");
            } else if !watch {
                if let Some(remaining) = throttle.remaining_time(now)? {
                    println!("Locked for another {remaining}.");
                }
            } else {
                let mut handle = CountdownTask::start(throttle.clone(), |remaining| {
                    match remaining {
                        Some(remaining) => println!("Locked for another {remaining}."),
                        None => println!("Sign-in is open."),
                    }
                });
                let exit = tokio::select! {
                    exit = handle.finished() => Some(exit),
                    _ = tokio::signal::ctrl_c() => None,
                };
                let exit = match exit {
                    Some(exit) => exit,
                    None => {
                        handle.stop();
                        handle.finished().await
                    }
                };
                if exit == CountdownExit::Stopped {
                    println!("Countdown stopped.");
                }
            }
        }
        Commands::Prefill => {
            let prefill = RememberMeStore::new(state_store(&config)).load()?;
            match prefill.identity {
                Some(identity) if prefill.remember_me => {
                    println!("Remember me: on");
                    println!("Email: {}", identity.email);
                    println!("College: {}", identity.college.as_deref().unwrap_or("-"));
                    println!(
                        "Department: {}",
                        identity.department.as_deref().unwrap_or("-")
                    );
                }
                _ => println!("Remember me: off"),
            }
        }
        Commands::Register {
            first_name,
            last_name,
            email,
            date_of_birth,
            gender,
            phone,
            address,
            city,
            college,
            department,
            program,
            password,
            confirm_password,
        } => {
            let mut wizard = RegistrationWizard::new();
            wizard.draft = registration::RegistrationDraft {
                first_name,
                last_name,
                email,
                date_of_birth,
                gender,
                phone,
                address,
                city,
                college,
                department,
                program,
                password,
                confirm_password,
            };

            while wizard.current() != registration::RegistrationStep::Security {
                let step = wizard.current();
                wizard
                    .advance()
                    .with_context(|| format!("step {step} is incomplete"))?;
            }
            let request = match wizard.submit() {
                Ok(request) => request,
                Err(e) => match wizard.rewind_to_first_invalid() {
                    Some(message) => {
                        anyhow::bail!("step {} is incomplete: {}", wizard.current(), message)
                    }
                    None => return Err(e.into()),
                },
            };

            let portal = connect(&config).await?;
            let id = portal.create_registration_request(&request).await?;
            println!("Registration request {id} submitted for {}.", request.email);

            if registration::next_after_submit(&NoBiometrics)
                == EnrollmentPrompt::OfferPasskeyEnrollment
            {
                println!("This device supports passkeys; enroll one after approval.");
            }
        }
        Commands::Content {
            file,
            page,
            element,
            fallback,
        } => {
            let catalog = content::ContentCatalog::load(&file)
                .with_context(|| format!("failed to load {}", file.display()))?;
            if catalog.is_empty() {
                tracing::warn!("{} holds no content elements", file.display());
            } else {
                tracing::debug!("Loaded {} content elements", catalog.len());
            }
            let resolved = catalog.resolve(&page, &element, &fallback);
            if !resolved.from_store {
                tracing::info!("{}/{} not found in {}, showing fallback", page, element, file.display());
            }
            println!("{}", content::render_plain(&resolved.element));
        }
    }

    Ok(())
}
