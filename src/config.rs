use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

/// External engine process: `command args...`, speaking JSON lines.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_file")]
    pub file: String,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_file() -> String {
    "scrubchef.log".to_string()
}

fn default_log_filter() -> String {
    "scrubchef=info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            filter: default_log_filter(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_recipe_name")]
    pub recipe_name: String,
}

fn default_output_dir() -> String {
    ".".to_string()
}

fn default_recipe_name() -> String {
    crate::recipe::DEFAULT_RECIPE_NAME.to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            recipe_name: default_recipe_name(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse config TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parses() {
        let config = Config::load(Path::new("config.toml")).unwrap();
        assert_eq!(config.engine.command, "scrubchef-engine");
        assert_eq!(config.log.filter, "scrubchef=info");
        assert_eq!(config.export.recipe_name, "Custom Pipeline");
    }

    #[test]
    fn test_optional_sections_default() {
        let config = Config::parse("[engine]\ncommand = \"engine\"\n").unwrap();
        assert!(config.engine.args.is_empty());
        assert_eq!(config.log.file, "scrubchef.log");
        assert_eq!(config.export.output_dir, ".");
    }

    #[test]
    fn test_missing_engine_section_fails() {
        assert!(Config::parse("[log]\nfile = \"x.log\"\n").is_err());
    }
}
