use crate::agent::{AgentConfig, AgentMode, step::DEFAULT_MAX_STEPS};
use crate::traits::AgentToolDescriptor;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const STRIDE_DIR: &str = ".stride";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub mode: AgentMode,
    pub max_steps: usize,
    pub temperature: Option<f64>,
    pub max_tokens_per_step: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub stream_steps: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: String::new(),
            base_url: None,
            model: "gpt-4o".to_string(),
            mode: AgentMode::PlanAct,
            max_steps: DEFAULT_MAX_STEPS,
            temperature: None,
            max_tokens_per_step: None,
            timeout_ms: None,
            stream_steps: true,
        }
    }
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        if config_exists() {
            load_config()
        } else {
            Ok(Config::default())
        }
    }

    /// Per-run settings derived from the file config plus the tools being
    /// advertised for this run.
    pub fn agent_config(&self, tools: Vec<AgentToolDescriptor>) -> AgentConfig {
        AgentConfig {
            mode: self.mode,
            max_steps: self.max_steps,
            max_tokens_per_step: self.max_tokens_per_step,
            temperature: self.temperature,
            tools,
            timeout_ms: self.timeout_ms,
            stream_steps: self.stream_steps,
        }
    }
}

pub fn get_stride_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(STRIDE_DIR)
}

pub fn get_config_path() -> PathBuf {
    get_stride_dir().join("config.toml")
}

pub fn ensure_stride_dir() -> Result<PathBuf> {
    let stride_dir = get_stride_dir();

    if !stride_dir.exists() {
        std::fs::create_dir_all(&stride_dir).with_context(|| {
            format!(
                "Failed to create stride directory at {}",
                stride_dir.display()
            )
        })?;
    }

    Ok(stride_dir)
}

pub fn load_config() -> Result<Config> {
    load_config_from(&get_config_path())
}

pub fn save_config(config: &Config) -> Result<()> {
    ensure_stride_dir()?;
    save_config_to(config, &get_config_path())
}

pub fn config_exists() -> bool {
    get_config_path().exists()
}

fn load_config_from(config_path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(config_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            anyhow::anyhow!("Config file not found. Run 'stride init' to create one.")
        } else {
            anyhow::anyhow!("Failed to read config from {}: {}", config_path.display(), e)
        }
    })?;

    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", config_path.display()))
}

fn save_config_to(config: &Config, config_path: &Path) -> Result<()> {
    let content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config to TOML")?;

    std::fs::write(config_path, content)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

    Ok(())
}
