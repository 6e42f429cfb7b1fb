use crate::models::UserConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use ::config::{Config, Environment, File, FileFormat, Map};
use std::fs;

/// File name of the user configuration inside the config directory
pub const USER_CONFIG_FILE: &str = "atterm.yaml";

/// Prefix of environment overrides, e.g. `ATTERM_CONNECTION__BAUD_RATE=9600`
pub const ENV_PREFIX: &str = "ATTERM";

/// Configuration manager for loading and saving `atterm.yaml`.
///
/// Settings are layered, later layers winning:
/// 1. built-in defaults
/// 2. `atterm.yaml` in the config directory (optional)
/// 3. `ATTERM_*` environment variables, `__` separating nested keys
///
/// Command line arguments are applied on top by the caller.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    user_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory holding `atterm.yaml` (created if missing)
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            user_config_path: config_dir.join(USER_CONFIG_FILE),
            config_dir,
        })
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn user_config_path(&self) -> &Utf8Path {
        &self.user_config_path
    }

    /// Load the user configuration from defaults, file and process environment.
    pub fn load_user_config(&self) -> Result<UserConfig> {
        self.load_layered(Environment::with_prefix(ENV_PREFIX))
    }

    /// Same as [`load_user_config`](Self::load_user_config), reading the
    /// environment layer from `vars` instead of the process environment.
    pub fn load_user_config_with_env(&self, vars: Map<String, String>) -> Result<UserConfig> {
        self.load_layered(Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn load_layered(&self, environment: Environment) -> Result<UserConfig> {
        if !self.user_config_path.exists() {
            tracing::warn!(
                "User config file not found at {}, using defaults",
                self.user_config_path
            );
        }

        let defaults = Config::try_from(&UserConfig::default())
            .context("Failed to serialize default user config")?;

        let layered = Config::builder()
            .add_source(defaults)
            .add_source(
                File::from(self.user_config_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                environment
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read user config: {}", self.user_config_path))?;

        let config: UserConfig = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse user config: {}", self.user_config_path))?;

        tracing::info!(
            "Loaded user config: device={}, baud={}, isolation={}",
            config.connection.device,
            config.connection.baud_rate,
            config.session.isolation
        );
        Ok(config)
    }

    /// Save the user configuration file.
    ///
    /// # Arguments
    /// * `config` - The UserConfig to save
    pub fn save_user_config(&self, config: &UserConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize user config to YAML")?;

        fs::write(&self.user_config_path, yaml_string)
            .with_context(|| format!("Failed to write user config: {}", self.user_config_path))?;

        tracing::info!("Saved user config to {}", self.user_config_path);
        Ok(())
    }

    /// Write a default `atterm.yaml` if there is none yet.
    ///
    /// # Returns
    /// `true` if a template was written
    pub fn ensure_user_config(&self) -> Result<bool> {
        if self.user_config_path.exists() {
            return Ok(false);
        }

        self.save_user_config(&UserConfig::default())?;
        tracing::info!("Wrote default user config template");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(temp_dir: &TempDir) -> ConfigManager {
        let dir = Utf8Path::from_path(temp_dir.path()).unwrap();
        ConfigManager::new(dir).unwrap()
    }

    #[test]
    fn test_config_manager_creation() {
        let temp_dir = TempDir::new().unwrap();
        let nested = Utf8Path::from_path(temp_dir.path()).unwrap().join("nested/config");

        let manager = ConfigManager::new(&nested).unwrap();
        assert!(nested.exists());
        assert_eq!(manager.user_config_path(), nested.join("atterm.yaml"));
    }

    #[test]
    fn test_defaults_without_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = manager(&temp_dir).load_user_config_with_env(Map::new()).unwrap();
        assert_eq!(config, UserConfig::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        fs::write(
            manager.user_config_path(),
            "connection:\n  device: COM7\n  baud_rate: 9600\n",
        )
        .unwrap();

        let config = manager.load_user_config_with_env(Map::new()).unwrap();
        assert_eq!(config.connection.device, "COM7");
        assert_eq!(config.connection.baud_rate, 9600);
        // Untouched keys keep their defaults
        assert_eq!(config.connection.read_poll_timeout_ms, 100);
        assert_eq!(config.session.join_timeout_ms, 1000);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        fs::write(manager.user_config_path(), "connection:\n  baud_rate: 9600\n").unwrap();

        let mut vars = Map::new();
        vars.insert("ATTERM_CONNECTION__BAUD_RATE".to_string(), "57600".to_string());
        vars.insert("ATTERM_SESSION__ISOLATION".to_string(), "thread".to_string());

        let config = manager.load_user_config_with_env(vars).unwrap();
        assert_eq!(config.connection.baud_rate, 57_600);
        assert_eq!(config.session.isolation, crate::models::Isolation::Thread);
    }

    #[test]
    fn test_ensure_writes_template_once() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);

        assert!(manager.ensure_user_config().unwrap());
        assert!(!manager.ensure_user_config().unwrap());

        let text = fs::read_to_string(manager.user_config_path()).unwrap();
        assert!(text.contains("baud_rate: 115200"));
    }
}
