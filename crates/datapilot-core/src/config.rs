use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for an analysis run.
///
/// Everything is overridable from the environment; `.env` files are honoured
/// so local setups don't need exported variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Model identifier sent to the completions endpoint.
    pub model: String,
    /// Hard cap on generate steps per run.
    pub max_iterations: u32,
    /// Wall-clock budget for a single code fragment.
    pub exec_timeout: Duration,
    /// Directory searched for catalog datasets.
    pub datasets_dir: PathBuf,
    /// Root directory for per-run artifact directories.
    pub artifacts_dir: PathBuf,
    /// API key for the model provider, if configured.
    pub api_key: Option<String>,
    /// Override for the provider's completions URL.
    pub base_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "gpt-5".to_string(),
            max_iterations: 15,
            exec_timeout: Duration::from_secs(60),
            datasets_dir: PathBuf::from("datasets"),
            artifacts_dir: PathBuf::from("artifacts"),
            api_key: None,
            base_url: None,
        }
    }
}

impl Config {
    /// Build a config from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Config::default();
        Self {
            model: env_string("DATAPILOT_MODEL").unwrap_or(defaults.model),
            max_iterations: env_parse("DATAPILOT_MAX_ITERATIONS")
                .unwrap_or(defaults.max_iterations),
            exec_timeout: env_parse("DATAPILOT_EXEC_TIMEOUT_SECS")
                .map_or(defaults.exec_timeout, Duration::from_secs),
            datasets_dir: env_string("DATAPILOT_DATASETS_DIR")
                .map_or(defaults.datasets_dir, PathBuf::from),
            artifacts_dir: env_string("DATAPILOT_ARTIFACTS_DIR")
                .map_or(defaults.artifacts_dir, PathBuf::from),
            api_key: env_string("OPENAI_API_KEY"),
            base_url: env_string("OPENAI_BASE_URL"),
        }
    }

    /// Create the directories a run writes into.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.artifacts_dir)?;
        std::fs::create_dir_all(&self.datasets_dir)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}
