//! Finding, loading and overriding `assetpipe.toml`.

use super::schema::{
    AssetsConfig, ConfigValidationError, PipelineConfig, ProjectConfig, ScriptsConfig, ServerConfig, SpritesConfig,
    StylesConfig, TemplatesConfig, WatchConfig,
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project configuration file
pub const CONFIG_FILENAME: &str = "assetpipe.toml";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse assetpipe.toml: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub out: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Nearest `assetpipe.toml` at or above the working directory, else the one
/// under `$XDG_CONFIG_HOME/assetpipe` (`~/.config/assetpipe`).
pub fn find_config() -> Option<PathBuf> {
    if let Ok(cwd) = env::current_dir() {
        if let Some(path) = find_config_from(cwd) {
            return Some(path);
        }
    }

    find_xdg_config()
}

pub fn find_xdg_config() -> Option<PathBuf> {
    let xdg_config = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;

    let config_path = xdg_config.join("assetpipe").join(CONFIG_FILENAME);
    if config_path.exists() {
        Some(config_path)
    } else {
        None
    }
}

pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load and validate `path`, or the discovered config; defaults when none exists.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(default_config()),
    }
}

fn load_config_file(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: PipelineConfig = toml::from_str(&contents)?;

    check(&config.validate())?;
    Ok(config)
}

/// Fail with every message when `errors` is non-empty.
pub fn check(errors: &[ConfigValidationError]) -> Result<(), ConfigError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors.iter().map(|e| e.to_string()).collect()))
    }
}

/// Defaults for a project without a config file, named after the working
/// directory.
pub fn default_config() -> PipelineConfig {
    let project_name = env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unnamed".to_string());

    PipelineConfig {
        project: ProjectConfig { name: project_name, out: PathBuf::from("dist") },
        scripts: ScriptsConfig::default(),
        styles: StylesConfig::default(),
        templates: TemplatesConfig::default(),
        assets: AssetsConfig::default(),
        sprites: SpritesConfig::default(),
        server: ServerConfig::default(),
        watch: WatchConfig::default(),
    }
}

pub fn merge_cli_overrides(config: &mut PipelineConfig, overrides: &CliOverrides) {
    if let Some(ref out) = overrides.out {
        config.project.out = out.clone();
    }

    if let Some(ref host) = overrides.host {
        config.server.host = host.clone();
    }

    if let Some(port) = overrides.port {
        config.server.port = port;
    }
}
