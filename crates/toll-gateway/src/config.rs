use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use toll_types::config::TollConfig;

/// Returns the tollgate home directory (~/.tollgate/)
pub fn tollgate_home() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".tollgate"))
        .context("Could not determine home directory")
}

/// Returns the path to the config file (~/.tollgate/config.toml)
pub fn config_path() -> Result<PathBuf> {
    Ok(tollgate_home()?.join("config.toml"))
}

/// Load config from `path`, writing the defaults there first if it is missing.
pub fn load_config_from(path: &Path) -> Result<TollConfig> {
    if !path.exists() {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let default = TollConfig::default();
        save_config_to(path, &default)?;
        return Ok(default);
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: TollConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;
    Ok(config)
}

/// Save config to `path`, overwriting the existing file.
pub fn save_config_to(path: &Path, config: &TollConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, toml_str)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    Ok(())
}

/// Anthropic API key: `ANTHROPIC_API_KEY` wins over the config file.
pub fn anthropic_api_key(config: &TollConfig) -> Option<String> {
    std::env::var("ANTHROPIC_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
        .or_else(|| config.model.api_key.clone().filter(|k| !k.is_empty()))
}
