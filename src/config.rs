// src/config.rs
use std::env;
use std::path::PathBuf;

use crate::constants::{DEFAULT_QUEUE, DEFAULT_SEARCH_TIMEOUT_SECS};

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Front-door configuration. Built once in the binary and injected; the
/// library never reads the environment itself.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub redis_url: String,
    pub queue: String,
    pub result_dir: PathBuf,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            queue: env_or("QUEUE_NAME", DEFAULT_QUEUE),
            result_dir: env_or("RESULT_DIR", "results").into(),
        }
    }
}

/// Worker configuration.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub redis_url: String,
    pub queue: String,
    pub consumer_tag: String,
    pub mmseqs_bin: PathBuf,
    pub db_path: PathBuf,
    pub workspace_dir: PathBuf,
    pub result_dir: PathBuf,
    pub search_timeout_secs: u64,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let timeout = env_or("SEARCH_TIMEOUT_SECS", "")
            .parse()
            .unwrap_or(DEFAULT_SEARCH_TIMEOUT_SECS);
        Self {
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            queue: env_or("QUEUE_NAME", DEFAULT_QUEUE),
            consumer_tag: env_or("CONSUMER_TAG", &format!("worker-{}", std::process::id())),
            mmseqs_bin: env_or("MMSEQS_BIN", "mmseqs").into(),
            db_path: env_or("SEARCH_DB", "/app/swissprot").into(),
            workspace_dir: env_or("WORKSPACE_DIR", "/workspace").into(),
            result_dir: env_or("RESULT_DIR", "results").into(),
            search_timeout_secs: timeout,
        }
    }
}
