// Runtime configuration: TOML file, then MORTGAGE_* environment overrides

use crate::error::{CalcError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Bare level ("debug") or a full EnvFilter directive
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub page_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("mortgage.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig { page_size: 20 }
    }
}

impl AppConfig {
    /// Load from an optional TOML file, then apply process environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CalcError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| CalcError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MORTGAGE_*` overrides using `lookup` as the variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("MORTGAGE_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(path) = lookup("MORTGAGE_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(level) = lookup("MORTGAGE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("MORTGAGE_LOG_JSON") {
            self.logging.json = parse_flag("MORTGAGE_LOG_JSON", &json)?;
        }
        if let Some(size) = lookup("MORTGAGE_PAGE_SIZE") {
            self.api.page_size = size.trim().parse().map_err(|_| {
                CalcError::Config(format!("MORTGAGE_PAGE_SIZE must be a positive integer, got {:?}", size))
            })?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.server.bind_addr.trim().is_empty() {
            return Err(CalcError::Config("server.bind_addr is empty".to_string()));
        }
        if self.api.page_size == 0 {
            return Err(CalcError::Config("api.page_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CalcError::Config(format!("{} must be a boolean, got {:?}", key, other))),
    }
}
