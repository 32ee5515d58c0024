use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod db;
mod engine;
mod error;
mod forms;
mod keys;
mod models;
mod settings;
mod store;

use db::PgStore;
use error::SubmitError;
use models::{EvaluationMode, KeyValidation, SurveyPayload, SurveyRole};

#[derive(Parser)]
#[command(name = "ojt-evaluations")]
#[command(about = "OJT survey collection for students, company mentors, and advisers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the document table
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import student records from a CSV roster
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Check an access key for a role and period
    ValidateKey {
        #[arg(long)]
        role: String,
        #[arg(long, default_value = "final")]
        mode: String,
        #[arg(long)]
        key: String,
    },
    /// Submit a survey payload from a JSON file
    Submit {
        #[arg(long)]
        payload: PathBuf,
        #[arg(long)]
        doc_id: Option<String>,
    },
    /// Show the global access lock flags
    Settings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = PgStore::new(pool.clone());

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&store).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let imported = db::import_csv(&store, &csv).await?;
            println!("Imported {imported} student records from {}.", csv.display());
        }
        Commands::ValidateKey { role, mode, key } => {
            let role: SurveyRole = role.parse().map_err(anyhow::Error::msg)?;
            let mode: EvaluationMode = mode.parse().map_err(anyhow::Error::msg)?;

            let current = settings::fetch(&store).await?;
            if settings::locked_for(&current, role) {
                println!("{role} access is locked by settings.");
                return Ok(());
            }

            match keys::validate(&store, role, mode, &key).await {
                KeyValidation::Invalid { reason } => println!("Key rejected: {reason}."),
                KeyValidation::Fresh { student } => println!(
                    "Key accepted for {} ({}, {}).",
                    student.record.name, student.record.section, student.doc_id
                ),
                KeyValidation::AlreadySubmitted { student, previous } => println!(
                    "Key already used for {}: survey {} submitted on {}.",
                    student.record.name,
                    previous.survey_id,
                    previous.submitted_on.as_deref().unwrap_or("an unknown date")
                ),
            }
        }
        Commands::Submit { payload, doc_id } => {
            let raw = std::fs::read_to_string(&payload)
                .with_context(|| format!("failed to read {}", payload.display()))?;
            let parsed: SurveyPayload =
                serde_json::from_str(&raw).context("payload is not a valid survey document")?;
            forms::validate_payload(&parsed)?;

            let mut custom_id = doc_id;
            if let Some(role) = parsed.key_role() {
                let key = parsed.access_key().trim().to_string();
                if !key.is_empty() {
                    let current = settings::fetch(&store).await?;
                    if settings::locked_for(&current, role) {
                        return Err(
                            SubmitError::KeyInvalid(format!("{role} access is locked")).into()
                        );
                    }
                    match keys::validate(&store, role, parsed.evaluation_mode(), &key).await {
                        KeyValidation::Invalid { reason } => {
                            return Err(SubmitError::KeyInvalid(reason).into())
                        }
                        KeyValidation::AlreadySubmitted { previous, .. } => {
                            return Err(SubmitError::KeyInvalid(format!(
                                "access key already used (survey {})",
                                previous.survey_id
                            ))
                            .into())
                        }
                        // Keying the submission on the student's own record id
                        // gives at-most-one-submission-per-student downstream.
                        KeyValidation::Fresh { student } => {
                            if custom_id.is_none() {
                                custom_id = Some(student.doc_id);
                            }
                        }
                    }
                }
            }

            let id = engine::submit(&store, &parsed, custom_id.as_deref()).await?;
            println!("Submission saved with document id {id}.");
        }
        Commands::Settings => {
            let current = settings::fetch(&store).await?;
            println!("Student access locked: {}", current.lock_student_access);
            println!("Company access locked: {}", current.lock_company_access);
        }
    }

    Ok(())
}
