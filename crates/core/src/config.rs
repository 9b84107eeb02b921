//! Configuration management for kbase.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Defaults
//! - Config file (`.kbase/config.yaml`)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric, with all state stored in `.kbase/`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Name of the state directory inside a workspace.
pub const STATE_DIR: &str = ".kbase";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .kbase/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Generation provider (e.g., "ollama")
    pub provider: String,

    /// Generation model identifier
    pub model: String,

    /// Custom endpoint for the generation provider
    pub endpoint: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Listen address for `kbase serve`
    pub server_addr: String,

    /// API tokens accepted by the HTTP endpoint, keyed by user name
    #[serde(skip_serializing)]
    pub api_tokens: HashMap<String, String>,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmSection>,
    workspace: Option<WorkspaceSection>,
    logging: Option<LoggingSection>,
    server: Option<ServerSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LlmSection {
    provider: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceSection {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerSection {
    addr: Option<String>,
    #[serde(default)]
    tokens: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            endpoint: None,
            log_level: None,
            verbose: false,
            no_color: false,
            server_addr: "127.0.0.1:8080".to_string(),
            api_tokens: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML file and the environment.
    ///
    /// Environment variables:
    /// - `KBASE_WORKSPACE`: Override workspace path
    /// - `KBASE_CONFIG`: Path to config file
    /// - `KBASE_PROVIDER`: Generation provider
    /// - `KBASE_MODEL`: Model identifier
    /// - `KBASE_ENDPOINT`: Provider endpoint
    /// - `KBASE_API_TOKEN`: Token accepted for the `default` user
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use kbase_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("KBASE_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("KBASE_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.state_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("KBASE_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("KBASE_MODEL") {
            config.model = model;
        }

        if let Ok(endpoint) = std::env::var("KBASE_ENDPOINT") {
            config.endpoint = Some(endpoint);
        }

        if let Ok(token) = std::env::var("KBASE_API_TOKEN") {
            config.api_tokens.insert("default".to_string(), token);
        }

        if config.log_level.is_none() {
            config.log_level = std::env::var("RUST_LOG").ok();
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into a copy of this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            if let Some(provider) = llm.provider {
                result.provider = provider;
            }
            if let Some(model) = llm.model {
                result.model = model;
            }
            if llm.endpoint.is_some() {
                result.endpoint = llm.endpoint;
            }
        }

        if let Some(server) = config_file.server {
            if let Some(addr) = server.addr {
                result.server_addr = addr;
            }
            result.api_tokens.extend(server.tokens);
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over the environment and the file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .kbase directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Ensure the .kbase directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let state_dir = self.state_dir();
        if !state_dir.exists() {
            std::fs::create_dir_all(&state_dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", STATE_DIR, e))
            })?;
        }
        Ok(())
    }

    /// Resolve the user owning an API token.
    pub fn user_for_token(&self, token: &str) -> Option<&str> {
        self.api_tokens
            .iter()
            .find(|(_, t)| t.as_str() == token)
            .map(|(user, _)| user.as_str())
    }

    /// Validate configuration for the active provider.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["ollama"];

        if !known_providers.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                known_providers.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert!(!config.verbose);
        assert!(config.api_tokens.is_empty());
    }

    #[test]
    fn test_state_dir() {
        let config = AppConfig::default();
        assert!(config.state_dir().ends_with(".kbase"));
    }

    #[test]
    fn test_with_overrides() {
        let overridden = AppConfig::default().with_overrides(
            None,
            None,
            Some("ollama".to_string()),
            Some("mistral".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.model, "mistral");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
llm:
  model: qwen2.5
  endpoint: http://gpu-box:11434
logging:
  level: warn
  color: false
server:
  addr: 0.0.0.0:9000
  tokens:
    alice: s3cret
"#,
        )
        .unwrap();

        let merged = AppConfig::default().merge_yaml(&path).unwrap();
        assert_eq!(merged.provider, "ollama");
        assert_eq!(merged.model, "qwen2.5");
        assert_eq!(merged.endpoint.as_deref(), Some("http://gpu-box:11434"));
        assert_eq!(merged.log_level.as_deref(), Some("warn"));
        assert!(merged.no_color);
        assert_eq!(merged.server_addr, "0.0.0.0:9000");
        assert_eq!(merged.user_for_token("s3cret"), Some("alice"));
        assert_eq!(merged.user_for_token("nope"), None);
    }

    #[test]
    fn test_merge_invalid_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "llm: [unclosed").unwrap();

        assert!(AppConfig::default().merge_yaml(&path).is_err());
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ollama() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }
}
