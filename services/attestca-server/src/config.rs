use std::env;
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "attestca.toml";

/// Process-level options read from the environment.
#[derive(Debug, Clone)]
pub struct Options {
    pub config_path: PathBuf,
    pub json_logs: bool,
}

impl Options {
    pub fn from_env() -> Self {
        Options {
            config_path: env::var("ATTESTCA_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
            json_logs: env::var("ATTESTCA_LOG_FORMAT")
                .map(|format| format.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}
