// src/db.rs
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::error::StoreError;
use crate::models::{Character, Job, JobId, QaReport, VoiceDescriptor};
use crate::store::{CharacterStore, JobStore};

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed successfully");
    Ok(())
}

/// Job snapshots and QA reports stored as JSONB.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_label(job: &Job) -> Result<String, StoreError> {
    Ok(serde_json::to_value(job.status)?
        .as_str()
        .unwrap_or("unknown")
        .to_string())
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        let snapshot = serde_json::to_value(job)?;
        sqlx::query(
            r#"
            INSERT INTO lesson_jobs (id, status, snapshot, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status,
                snapshot = EXCLUDED.snapshot,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(job.id)
        .bind(status_label(job)?)
        .bind(snapshot)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT snapshot FROM lesson_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let snapshot: serde_json::Value = row.try_get("snapshot")?;
                Ok(Some(serde_json::from_value(snapshot)?))
            }
            None => Ok(None),
        }
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query("SELECT snapshot FROM lesson_jobs ORDER BY created_at DESC LIMIT 100")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let snapshot: serde_json::Value = row.try_get("snapshot")?;
                Ok(serde_json::from_value(snapshot)?)
            })
            .collect()
    }

    async fn save_report(&self, report: &QaReport) -> Result<(), StoreError> {
        let body = serde_json::to_value(report)?;
        sqlx::query(
            r#"
            INSERT INTO qa_reports (id, job_id, flagged, report, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(report.id)
        .bind(report.job_id)
        .bind(report.flagged)
        .bind(body)
        .bind(report.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_report(&self, job_id: JobId) -> Result<Option<QaReport>, StoreError> {
        let row = sqlx::query(
            "SELECT report FROM qa_reports WHERE job_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let report: serde_json::Value = row.try_get("report")?;
                Ok(Some(serde_json::from_value(report)?))
            }
            None => Ok(None),
        }
    }
}

#[derive(Clone)]
pub struct PgCharacterStore {
    pool: PgPool,
}

impl PgCharacterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn character_from_row(row: &sqlx::postgres::PgRow) -> Result<Character, StoreError> {
    let gender: String = row.try_get("gender")?;
    let style: String = row.try_get("voice_style")?;
    let voice = VoiceDescriptor::new(
        gender.parse().map_err(invalid_column)?,
        style.parse().map_err(invalid_column)?,
    );
    let avatar_image: Option<String> = row.try_get("avatar_image")?;

    Ok(Character {
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        voice,
        avatar_image: avatar_image.map(PathBuf::from),
    })
}

fn invalid_column(message: String) -> StoreError {
    StoreError::Database(sqlx::Error::Decode(message.into()))
}

fn lowercase_label<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_value(value)?
        .as_str()
        .unwrap_or_default()
        .to_string())
}

#[async_trait]
impl CharacterStore for PgCharacterStore {
    async fn get_character(&self, name: &str) -> Result<Character, StoreError> {
        let row = sqlx::query(
            "SELECT name, description, gender, voice_style, avatar_image FROM characters WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => character_from_row(&row),
            None => Err(StoreError::CharacterNotFound(name.to_string())),
        }
    }

    async fn list_characters(&self) -> Result<Vec<Character>, StoreError> {
        let rows = sqlx::query(
            "SELECT name, description, gender, voice_style, avatar_image FROM characters ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(character_from_row).collect()
    }

    async fn put_character(&self, character: Character) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO characters (name, description, gender, voice_style, avatar_image, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO UPDATE
            SET description = EXCLUDED.description,
                gender = EXCLUDED.gender,
                voice_style = EXCLUDED.voice_style,
                avatar_image = EXCLUDED.avatar_image,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&character.name)
        .bind(&character.description)
        .bind(lowercase_label(&character.voice.gender)?)
        .bind(lowercase_label(&character.voice.style)?)
        .bind(character.avatar_image.as_ref().map(|p| p.to_string_lossy().to_string()))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_character(&self, name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM characters WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
