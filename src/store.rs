// src/store.rs
//! Storage seams: characters (read by ingestion) and job snapshots / QA
//! reports (written by the runner). In-memory implementations back tests
//! and database-less runs; `db.rs` provides the PostgreSQL ones.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::models::{Character, Job, JobId, QaReport};

#[async_trait]
pub trait CharacterStore: Send + Sync {
    async fn get_character(&self, name: &str) -> Result<Character, StoreError>;
    async fn list_characters(&self) -> Result<Vec<Character>, StoreError>;
    async fn put_character(&self, character: Character) -> Result<(), StoreError>;
    /// Returns false when no character had that name.
    async fn delete_character(&self, name: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save_job(&self, job: &Job) -> Result<(), StoreError>;
    async fn load_job(&self, id: JobId) -> Result<Option<Job>, StoreError>;
    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError>;
    async fn save_report(&self, report: &QaReport) -> Result<(), StoreError>;
    /// Most recent report for a job.
    async fn latest_report(&self, job_id: JobId) -> Result<Option<QaReport>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryCharacterStore {
    characters: RwLock<HashMap<String, Character>>,
}

impl MemoryCharacterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_characters(characters: impl IntoIterator<Item = Character>) -> Self {
        Self {
            characters: RwLock::new(
                characters
                    .into_iter()
                    .map(|c| (c.name.clone(), c))
                    .collect(),
            ),
        }
    }

    /// Seed from a JSON array of characters.
    pub async fn from_json_file(path: &Path) -> Result<Self, StoreError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let characters: Vec<Character> = serde_json::from_str(&raw)?;
        tracing::info!("👤 Loaded {} characters from {}", characters.len(), path.display());
        Ok(Self::with_characters(characters))
    }
}

#[async_trait]
impl CharacterStore for MemoryCharacterStore {
    async fn get_character(&self, name: &str) -> Result<Character, StoreError> {
        self.characters
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::CharacterNotFound(name.to_string()))
    }

    async fn list_characters(&self) -> Result<Vec<Character>, StoreError> {
        let mut all: Vec<Character> = self.characters.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn put_character(&self, character: Character) -> Result<(), StoreError> {
        self.characters
            .write()
            .await
            .insert(character.name.clone(), character);
        Ok(())
    }

    async fn delete_character(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.characters.write().await.remove(name).is_some())
    }
}

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    reports: RwLock<HashMap<JobId, Vec<QaReport>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn load_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn save_report(&self, report: &QaReport) -> Result<(), StoreError> {
        self.reports
            .write()
            .await
            .entry(report.job_id)
            .or_default()
            .push(report.clone());
        Ok(())
    }

    async fn latest_report(&self, job_id: JobId) -> Result<Option<QaReport>, StoreError> {
        Ok(self
            .reports
            .read()
            .await
            .get(&job_id)
            .and_then(|reports| reports.last().cloned()))
    }
}
