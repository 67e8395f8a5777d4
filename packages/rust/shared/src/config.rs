//! Application configuration for LinkScout.
//!
//! User config lives at `~/.linkscout/linkscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LinkScoutError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "linkscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".linkscout";

// ---------------------------------------------------------------------------
// Config structs (matching linkscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Text-generation bridge settings.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Report per-chunk progress while searching.
    #[serde(default)]
    pub verbose: bool,
}

/// `[bridge]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bridge command (e.g., "bun").
    #[serde(default = "default_bridge_command")]
    pub command: String,

    /// Bridge script passed to the command.
    #[serde(default = "default_bridge_script")]
    pub script: String,

    /// Working directory for the bridge process.
    #[serde(default = "default_working_dir")]
    pub working_dir: String,

    /// Model identifier forwarded with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: default_bridge_command(),
            script: default_bridge_script(),
            working_dir: default_working_dir(),
            model: default_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_bridge_command() -> String {
    "bun".into()
}
fn default_bridge_script() -> String {
    "bridge/llm-bridge.ts".into()
}
fn default_working_dir() -> String {
    ".".into()
}
fn default_model() -> String {
    "moonshotai/kimi-k2.5".into()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.linkscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LinkScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.linkscout/linkscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LinkScoutError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LinkScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LinkScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LinkScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LinkScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the bridge's API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.bridge.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(LinkScoutError::config(format!(
            "API key not found. Set the {var_name} environment variable \
             before starting the text-generation bridge."
        ))),
    }
}
