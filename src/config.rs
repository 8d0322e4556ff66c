use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use std::fmt;

#[derive(Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub jwt_secret: String,
    pub cors_origin: String,
    pub worker: WorkerConfig,
    pub embedding: EmbeddingConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub enable_rating_reconcile: bool,
    pub enable_embedding_backfill: bool,
}

#[derive(Clone)]
pub struct EmbeddingConfig {
    pub mock: bool,
    pub api_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub dimension: usize,
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub max_sse_connections: usize,
    pub max_listings_page: usize,
    pub max_subjects_per_request: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sse_connections: 256,
            max_listings_page: 100,
            max_subjects_per_request: 20,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("enable_file_logs", &self.enable_file_logs)
            .field("log_dir", &self.log_dir)
            .field("sled_path", &self.sled_path)
            .field("jwt_secret", &"***REDACTED***")
            .field("cors_origin", &self.cors_origin)
            .field("worker", &self.worker)
            .field("embedding", &self.embedding)
            .field("limits", &self.limits)
            .finish()
    }
}

impl fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("mock", &self.mock)
            .field("api_url", &self.api_url)
            .field("api_key", &"***REDACTED***")
            .field("timeout_secs", &self.timeout_secs)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default_limits = LimitsConfig::default();
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/tutorlah.sled"),
            jwt_secret: env_or(
                "JWT_SECRET",
                "change_me_to_random_64_chars_change_me_to_random_64_chars",
            ),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:8081"),
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                enable_rating_reconcile: env_or_bool("ENABLE_RATING_RECONCILE_WORKER", true),
                enable_embedding_backfill: env_or_bool("ENABLE_EMBEDDING_BACKFILL_WORKER", false),
            },
            embedding: EmbeddingConfig {
                mock: env_or_bool("EMBEDDING_MOCK", true),
                api_url: env_or("EMBEDDING_API_URL", ""),
                api_key: env_or("EMBEDDING_API_KEY", ""),
                timeout_secs: env_or_parse("EMBEDDING_TIMEOUT_SECS", 20_u64),
                dimension: env_or_parse("EMBEDDING_DIMENSION", 384_usize),
            },
            limits: LimitsConfig {
                max_sse_connections: env_or_parse(
                    "MAX_SSE_CONNECTIONS",
                    default_limits.max_sse_connections,
                ),
                ..default_limits
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
