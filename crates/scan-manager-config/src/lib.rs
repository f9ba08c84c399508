// crates/scan-manager-config/src/lib.rs
// ============================================================================
// Module: Scan Manager Configuration
// Description: Configuration loading and validation.
// Purpose: Provide strict, fail-closed config parsing with hard limits for
//          the state directory, sysconf directory, and external tools.
// Dependencies: serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path
//! limits. Missing or invalid configuration fails closed. The store file
//! lives at `<state>/mgr/tasks.db`; report-format trees live under
//! `<sysconf>/openvasmd/`. The environment variable `SCAN_MANAGER_CONFIG`
//! overrides the config path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "scan-manager.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "SCAN_MANAGER_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default state directory.
const DEFAULT_STATE_DIR: &str = "/var/lib/openvas";
/// Default system configuration directory.
const DEFAULT_SYSCONF_DIR: &str = "/etc";
/// Default sendmail binary.
const DEFAULT_SENDMAIL: &str = "/usr/sbin/sendmail";
/// Default wget binary.
const DEFAULT_WGET: &str = "wget";
/// Default gpg binary.
const DEFAULT_GPG: &str = "gpg";
/// Default external tool timeout in seconds.
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 600;
/// Mode for a freshly created state directory.
#[cfg(unix)]
const STATE_DIR_MODE: u32 = 0o755;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("config file unreadable: {0}")]
    Unreadable(String),
    /// The config file is larger than the limit.
    #[error("config file exceeds {MAX_CONFIG_FILE_SIZE} bytes")]
    TooLarge,
    /// The config file is not valid TOML for the schema.
    #[error("config parse error: {0}")]
    Parse(String),
    /// A configured path fails the length limits.
    #[error("config path invalid: {0}")]
    InvalidPath(String),
    /// The state directory could not be created.
    #[error("state directory unusable: {0}")]
    StateDir(String),
}

// ============================================================================
// SECTION: Model
// ============================================================================

/// On-disk configuration schema. Every field is optional; defaults apply.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    /// State directory override.
    state_dir: Option<PathBuf>,
    /// Sysconf directory override.
    sysconf_dir: Option<PathBuf>,
    /// Sendmail binary override.
    sendmail_path: Option<PathBuf>,
    /// Wget binary override.
    wget_path: Option<PathBuf>,
    /// Gpg binary override.
    gpg_path: Option<PathBuf>,
    /// External tool timeout in seconds.
    tool_timeout_secs: Option<u64>,
}

/// Validated manager configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// State directory; the store lives under `<state>/mgr/`.
    pub state_dir: PathBuf,
    /// System configuration directory holding the format trees.
    pub sysconf_dir: PathBuf,
    /// Sendmail binary for the Email escalation method.
    pub sendmail_path: PathBuf,
    /// Wget binary for the HTTP Get escalation method.
    pub wget_path: PathBuf,
    /// Gpg binary for detached-signature verification.
    pub gpg_path: PathBuf,
    /// Timeout applied to every external tool run.
    pub tool_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            sysconf_dir: PathBuf::from(DEFAULT_SYSCONF_DIR),
            sendmail_path: PathBuf::from(DEFAULT_SENDMAIL),
            wget_path: PathBuf::from(DEFAULT_WGET),
            gpg_path: PathBuf::from(DEFAULT_GPG),
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
        }
    }
}

impl ManagerConfig {
    /// Loads configuration: the explicit path, the env override, the
    /// default filename in the working directory, or pure defaults when
    /// no file exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a present file is oversized,
    /// unparseable, or names invalid paths.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = path.map(Path::to_path_buf).or_else(|| {
            env::var_os(CONFIG_ENV_VAR).map(PathBuf::from).or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_NAME);
                default.exists().then_some(default)
            })
        });
        let Some(file) = resolved else {
            return Ok(Self::default());
        };
        let metadata =
            fs::metadata(&file).map_err(|err| ConfigError::Unreadable(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge);
        }
        let text =
            fs::read_to_string(&file).map_err(|err| ConfigError::Unreadable(err.to_string()))?;
        let raw: RawConfig =
            toml::from_str(&text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        let config = Self {
            state_dir: raw.state_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
            sysconf_dir: raw.sysconf_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_SYSCONF_DIR)),
            sendmail_path: raw
                .sendmail_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SENDMAIL)),
            wget_path: raw.wget_path.unwrap_or_else(|| PathBuf::from(DEFAULT_WGET)),
            gpg_path: raw.gpg_path.unwrap_or_else(|| PathBuf::from(DEFAULT_GPG)),
            tool_timeout: Duration::from_secs(
                raw.tool_timeout_secs.unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS),
            ),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates path limits.
    fn validate(&self) -> Result<(), ConfigError> {
        for path in [&self.state_dir, &self.sysconf_dir] {
            validate_path(path)?;
        }
        Ok(())
    }

    /// Path of the store file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join("mgr").join("tasks.db")
    }

    /// Ensures the store's parent directory exists, creating it 0755.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::StateDir`] on creation failure.
    pub fn ensure_state_dir(&self) -> Result<(), ConfigError> {
        let dir = self.state_dir.join("mgr");
        if dir.is_dir() {
            return Ok(());
        }
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(STATE_DIR_MODE);
        }
        builder.create(&dir).map_err(|err| ConfigError::StateDir(err.to_string()))
    }
}

/// Rejects overlong paths and components.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.display().to_string();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::InvalidPath(format!("path too long: {text}")));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::InvalidPath(format!("component too long in {text}")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use std::fs;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::ConfigError;
    use super::ManagerConfig;

    #[test]
    fn defaults_apply_without_a_file() {
        let config = ManagerConfig::load(None).unwrap();
        assert!(config.database_path().ends_with("mgr/tasks.db"));
        assert_eq!(config.tool_timeout, Duration::from_secs(600));
    }

    #[test]
    fn file_overrides_win() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("scan-manager.toml");
        fs::write(
            &file,
            "state_dir = \"/tmp/sm-state\"\ntool_timeout_secs = 30\n",
        )
        .unwrap();
        let config = ManagerConfig::load(Some(&file)).unwrap();
        assert_eq!(config.state_dir.display().to_string(), "/tmp/sm-state");
        assert_eq!(config.tool_timeout, Duration::from_secs(30));
        assert_eq!(config.database_path().display().to_string(), "/tmp/sm-state/mgr/tasks.db");
    }

    #[test]
    fn unknown_keys_fail_closed() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("scan-manager.toml");
        fs::write(&file, "surprise = true\n").unwrap();
        assert!(matches!(
            ManagerConfig::load(Some(&file)),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn ensure_state_dir_creates_the_mgr_tree() {
        let dir = TempDir::new().unwrap();
        let config = ManagerConfig {
            state_dir: dir.path().join("state"),
            ..ManagerConfig::default()
        };
        config.ensure_state_dir().unwrap();
        assert!(dir.path().join("state/mgr").is_dir());
    }
}
