//! Runtime configuration: `genqueue.ron` merged over defaults, with the API
//! key overridable from the environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use genqueue_engine::{HttpClientSettings, OrchestratorSettings};
use genqueue_logging::{gq_info, gq_warn};
use log::LevelFilter;
use serde::Deserialize;

pub const CONFIG_FILENAME: &str = "genqueue.ron";
pub const API_KEY_ENV: &str = "GENQUEUE_API_KEY";

/// On-disk shape; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    api_key: Option<String>,
    base_url: Option<String>,
    max_concurrent: Option<usize>,
    poll_interval_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    state_dir: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    workspace: Option<String>,
    log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub orchestrator: OrchestratorSettings,
    pub http: HttpClientSettings,
    pub state_dir: PathBuf,
    pub export_dir: PathBuf,
    pub workspace: String,
    pub log_level: LevelFilter,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorSettings::default(),
            http: HttpClientSettings::default(),
            state_dir: PathBuf::from(".genqueue"),
            export_dir: PathBuf::from("videos"),
            workspace: "default".to_string(),
            log_level: LevelFilter::Info,
        }
    }
}

/// Reads `path` if it exists and applies `GENQUEUE_API_KEY` on top.
pub fn load(path: &Path) -> anyhow::Result<AppConfig> {
    let file = match fs::read_to_string(path) {
        Ok(text) => ron::from_str::<FileConfig>(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read config {}", path.display()))
        }
    };
    Ok(resolve(file, std::env::var(API_KEY_ENV).ok()))
}

fn resolve(file: FileConfig, env_key: Option<String>) -> AppConfig {
    let mut config = AppConfig::default();

    if let Some(max) = file.max_concurrent {
        config.orchestrator.max_concurrent = max;
    }
    if let Some(secs) = file.poll_interval_secs {
        config.orchestrator.poll_interval = Duration::from_secs(secs.max(1));
    }
    if let Some(url) = file.base_url {
        config.http.base_url = url;
    }
    if let Some(secs) = file.request_timeout_secs {
        config.http.request_timeout = Duration::from_secs(secs);
    }
    if let Some(dir) = file.state_dir {
        config.state_dir = dir;
    }
    if let Some(dir) = file.export_dir {
        config.export_dir = dir;
    }
    if let Some(workspace) = file.workspace {
        config.workspace = workspace;
    }
    if let Some(level) = file.log_level {
        match level.parse::<LevelFilter>() {
            Ok(level) => config.log_level = level,
            Err(_) => gq_warn!("unknown log level {:?}, keeping {}", level, config.log_level),
        }
    }

    let env_key = env_key.filter(|key| !key.trim().is_empty());
    config.orchestrator.api_key = match (env_key, file.api_key) {
        (Some(key), _) => {
            gq_info!("using API key from {}", API_KEY_ENV);
            Some(key)
        }
        (None, key) => key,
    };
    config
}
