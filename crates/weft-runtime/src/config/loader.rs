//! Configuration file loader.
//!
//! Loads the declarative document from YAML with `${VAR}` /
//! `${VAR:-default}` environment expansion applied to the raw text, then
//! overlays `WEFT_`-prefixed environment variables through figment.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde_json::Value;
use tracing::{debug, info};

use super::error::{ConfigLoadError, ConfigLoadResult};

const CONFIG_NAMES: &[&str] = &[
    "weft.yaml",
    "weft.yml",
    "config.yaml",
    "config.yml",
    ".weft.yaml",
    ".weft.yml",
];

/// Configuration loader with support for multiple search paths.
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Creates a loader with no search paths.
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
        }
    }

    /// Adds a search path for configuration files.
    pub fn add_search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.add_search_path(cwd)
        } else {
            self
        }
    }

    /// Adds the user config directory to search paths.
    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.add_search_path(config_dir.join("weft"))
        } else {
            self
        }
    }

    /// Loads the config tree from the first available source.
    ///
    /// With no file found, returns an empty tree.
    pub fn load(&self) -> ConfigLoadResult<Value> {
        if let Some(path) = self.find_config_file() {
            return self.load_from_file(&path);
        }
        info!("No configuration file found, using empty configuration");
        Ok(Value::Object(Default::default()))
    }

    /// Loads the config tree from a specific file.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> ConfigLoadResult<Value> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        self.load_from_str(&content)
    }

    /// Loads the config tree from a YAML string.
    pub fn load_from_str(&self, yaml: &str) -> ConfigLoadResult<Value> {
        let expanded = expand_env_vars(yaml);
        Figment::new()
            .merge(Yaml::string(&expanded))
            .merge(Env::prefixed("WEFT_").split("__"))
            .extract::<Value>()
            .map_err(|e| ConfigLoadError::Parse(e.to_string()))
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        for search_path in &self.search_paths {
            for name in CONFIG_NAMES {
                let path = search_path.join(name);
                debug!("Checking for config file: {}", path.display());
                if path.exists() {
                    info!("Found configuration file: {}", path.display());
                    return Some(path);
                }
            }
        }
        None
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new().with_current_dir().with_user_config_dir()
    }
}

/// Expands environment variables in the format `${VAR}` or
/// `${VAR:-default}`.
fn expand_env_vars(content: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(:-([^}]*))?\}")
        .expect("env expansion pattern is valid");
    let mut result = content.to_string();

    for cap in re.captures_iter(content) {
        let full_match = cap.get(0).map(|m| m.as_str()).unwrap_or_default();
        let Some(var_name) = cap.get(1).map(|m| m.as_str()) else {
            continue;
        };
        let default_value = cap.get(3).map(|m| m.as_str());

        let value = std::env::var(var_name)
            .ok()
            .or_else(|| default_value.map(String::from))
            .unwrap_or_default();
        result = result.replace(full_match, &value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_empty_yaml() {
        let loader = ConfigLoader::new();
        let tree = loader.load_from_str("").unwrap();
        assert!(tree.as_object().is_some_and(|m| m.is_empty()));
    }

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
modules:
  - name: web
    type: http.server
    config:
      port: 8080
"#;
        let tree = ConfigLoader::new().load_from_str(yaml).unwrap();
        assert_eq!(tree["modules"][0]["name"], json!("web"));
        assert_eq!(tree["modules"][0]["config"]["port"], json!(8080));
    }

    #[test]
    fn test_env_var_default_value() {
        let yaml = r#"
database:
  dsn: ${WEFT_TEST_NONEXISTENT_DSN:-postgres://localhost/app}
"#;
        let tree = ConfigLoader::new().load_from_str(yaml).unwrap();
        assert_eq!(tree["database"]["dsn"], json!("postgres://localhost/app"));
    }

    #[test]
    fn test_env_var_expansion() {
        // SAFETY: test-local variable, no concurrent reader in this test
        // binary cares about it.
        unsafe { std::env::set_var("WEFT_TEST_EXPANSION_PORT", "9090") };
        let yaml = "httpserver:\n  port: ${WEFT_TEST_EXPANSION_PORT}\n";
        let tree = ConfigLoader::new().load_from_str(yaml).unwrap();
        assert_eq!(tree["httpserver"]["port"], json!(9090));
        unsafe { std::env::remove_var("WEFT_TEST_EXPANSION_PORT") };
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = ConfigLoader::new()
            .load_from_file("/nonexistent/weft.yaml")
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::FileNotFound(_)));
    }
}
