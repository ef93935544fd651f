// lib.rs - Lesson video pipeline: generation, composition and QA
pub mod compositor;
pub mod config;
pub mod db;
pub mod error;
pub mod generators;
pub mod handlers;
pub mod jobs;
pub mod media;
pub mod middleware;
pub mod models;
pub mod qa;
pub mod services;
pub mod store;
pub mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::jobs::JobManager;
use crate::services::UnitPricing;

// Shared state handed to every handler through an `Extension`
pub struct AppState {
    pub job_manager: Arc<JobManager>,
    pub pricing: UnitPricing,
    pub db_pool: Option<sqlx::PgPool>,
    pub generators_configured: bool,
    pub lipsync_configured: bool,
}
