use std::sync::Arc;

use anyhow::Context;
use axum::{Extension, Router};
use tower_http::cors::CorsLayer;

use lesson_forge::config::AppConfig;
use lesson_forge::generators::{
    AvatarAnimator, CachedSpeech, CommandAnimator, OpenAiClient, StillImageAnimator,
};
use lesson_forge::jobs::{Collaborators, JobManager, PipelineContext};
use lesson_forge::media::FfmpegBackend;
use lesson_forge::qa::QaValidator;
use lesson_forge::services::UnitPricing;
use lesson_forge::store::{CharacterStore, JobStore, MemoryCharacterStore, MemoryJobStore};
use lesson_forge::{db, handlers, middleware, utils, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging().map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let config = AppConfig::from_env()?;

    if let Err(e) = utils::check_ffmpeg_available().await {
        tracing::error!("❌ FFmpeg is required for rendering: {}", e);
        return Err(e.into());
    }

    tokio::fs::create_dir_all(&config.pipeline.output_dir)
        .await
        .with_context(|| format!("creating {}", config.pipeline.output_dir.display()))?;
    tracing::info!("Outputs directory ready: {}", config.pipeline.output_dir.display());

    // Stores: PostgreSQL when configured, otherwise in-memory
    let (db_pool, job_store, characters) = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await.context("connecting to database")?;
            db::run_migrations(&pool).await.context("running migrations")?;
            tracing::info!("🗄️ Using PostgreSQL job and character stores");
            let job_store: Arc<dyn JobStore> = Arc::new(db::PgJobStore::new(pool.clone()));
            let characters: Arc<dyn CharacterStore> = Arc::new(db::PgCharacterStore::new(pool.clone()));
            (Some(pool), job_store, characters)
        }
        None => {
            tracing::warn!("DATABASE_URL not set. Jobs and characters are kept in memory only.");
            let seeded = match &config.characters_file {
                Some(path) => MemoryCharacterStore::from_json_file(path)
                    .await
                    .with_context(|| format!("loading characters from {}", path.display()))?,
                None => MemoryCharacterStore::new(),
            };
            let job_store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
            let characters: Arc<dyn CharacterStore> = Arc::new(seeded);
            (None, job_store, characters)
        }
    };

    let api_key = match &config.openai_api_key {
        Some(key) => key.clone(),
        None => {
            tracing::warn!("OPENAI_API_KEY not found. Image and speech generation will be rejected.");
            String::new()
        }
    };
    let openai = OpenAiClient::new(api_key, config.openai_base_url.clone());
    let speech_cache = config.pipeline.output_dir.join("speech_cache");

    let animator: Arc<dyn AvatarAnimator> = match &config.lipsync_command {
        Some(command) => {
            tracing::info!("🎭 Lip-sync command configured: {}", command);
            Arc::new(CommandAnimator::new(command))
        }
        None => {
            tracing::warn!("LIPSYNC_COMMAND not set. Avatars will be rendered as still images.");
            Arc::new(StillImageAnimator)
        }
    };

    let media = Arc::new(FfmpegBackend::new());
    let validator = QaValidator::new(
        media.clone(),
        config.qa.clone(),
        config.pipeline.render.resolution,
    );
    let ctx = PipelineContext::new(
        Collaborators {
            images: Arc::new(openai.clone()),
            speech: Arc::new(CachedSpeech::new(openai, speech_cache)),
            animator,
        },
        media,
        validator,
        job_store,
        config.pipeline.clone(),
    );

    let shared_state = Arc::new(AppState {
        job_manager: Arc::new(JobManager::new(Arc::new(ctx), characters)),
        pricing: UnitPricing::openai(),
        db_pool,
        generators_configured: config.openai_api_key.is_some(),
        lipsync_configured: config.lipsync_command.is_some(),
    });

    let app = Router::new()
        .merge(handlers::jobs::job_routes())
        .merge(handlers::characters::character_routes())
        .route("/api/status", axum::routing::get(api_status))
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>()).await?;
    Ok(())
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,lesson_forge=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,lesson_forge=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON logging for log aggregation
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!("🎬 LessonForge starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Build mode: {}", if cfg!(debug_assertions) { "development" } else { "production" });
    tracing::info!("Log level: {}", log_level);

    Ok(())
}

// API Status endpoint
async fn api_status(Extension(state): Extension<Arc<AppState>>) -> axum::response::Json<serde_json::Value> {
    use serde_json::json;

    let db_status = match &state.db_pool {
        Some(pool) => match sqlx::query("SELECT 1").fetch_one(pool).await {
            Ok(_) => "healthy",
            Err(_) => "unhealthy",
        },
        None => "in_memory",
    };
    let generators_status = if state.generators_configured { "configured" } else { "not_configured" };
    let lipsync_status = if state.lipsync_configured { "configured" } else { "still_image_fallback" };

    let jobs = state.job_manager.list_jobs().await.map(|jobs| jobs.len()).ok();

    axum::response::Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": db_status,
            "image_and_speech": generators_status,
            "lipsync": lipsync_status,
        },
        "jobs": jobs,
        "endpoints": {
            "status": "/api/status",
            "jobs": "/api/jobs",
            "characters": "/api/characters",
            "progress": "/api/jobs/:job_id/ws"
        }
    }))
}
