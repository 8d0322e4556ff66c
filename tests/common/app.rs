use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use tutorlah_backend::config::{Config, EmbeddingConfig, LimitsConfig, WorkerConfig};
use tutorlah_backend::events::ListingEvents;
use tutorlah_backend::routes::build_router;
use tutorlah_backend::services::embedding_provider::{EmbeddingProvider, MockEmbeddingProvider};
use tutorlah_backend::state::AppState;
use tutorlah_backend::store::Store;

pub const TEST_EMBEDDING_DIMENSION: usize = 16;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    pub shutdown_tx: broadcast::Sender<()>,
    _temp_dir: TempDir,
}

fn test_config(sled_path: String) -> Config {
    // Built directly so tests never race on process environment variables.
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path,
        jwt_secret: format!("integration-test-jwt-secret-{}", uuid::Uuid::new_v4()),
        cors_origin: "http://localhost:8081".to_string(),
        worker: WorkerConfig {
            is_leader: false,
            enable_rating_reconcile: false,
            enable_embedding_backfill: false,
        },
        embedding: EmbeddingConfig {
            mock: true,
            api_url: String::new(),
            api_key: String::new(),
            timeout_secs: 5,
            dimension: TEST_EMBEDDING_DIMENSION,
        },
        limits: LimitsConfig::default(),
    }
}

pub async fn spawn_test_app_with(embedder: Arc<dyn EmbeddingProvider>) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("tutorlah-test.sled");
    let config = test_config(sled_path.to_string_lossy().to_string());

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(
        store,
        embedder,
        ListingEvents::default(),
        &config,
        shutdown_tx.clone(),
    );
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        shutdown_tx,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_app() -> TestApp {
    spawn_test_app_with(Arc::new(MockEmbeddingProvider::new(TEST_EMBEDDING_DIMENSION))).await
}
