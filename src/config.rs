//! Keeper configuration, stored as RON in the user's config directory.

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::error::ConfigError;

const APP_DIR: &str = "window_layout_keeper";
const CONFIG_FILE: &str = "config.ron";

/// Tuning knobs for the capture scheduler, stabilization and restore.
///
/// Every field has a default, so a config file only needs the values it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
    /// Quiet period after the last window-move event before capturing.
    pub debounce_ms:             u64,
    /// Interval between geometry samples while waiting for stabilization.
    pub stabilization_poll_ms:   u64,
    /// Give up waiting for stabilization after this many polls and proceed.
    pub max_stabilization_polls: u32,
    /// Extra delay after stabilization before a restore pass starts.
    pub restore_settle_ms:       u64,
    /// Process-name substrings whose windows are never restored.
    pub hang_denylist:           Vec<String>,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            debounce_ms:             4500,
            stabilization_poll_ms:   1000,
            max_stabilization_polls: 30,
            restore_settle_ms:       0,
            // SetWindowPlacement never returns for this installer's windows
            hang_denylist:           vec!["CodeSetup".to_string()],
        }
    }
}

impl KeeperConfig {
    #[must_use]
    pub const fn debounce(&self) -> Duration { Duration::from_millis(self.debounce_ms) }

    #[must_use]
    pub const fn stabilization_poll(&self) -> Duration {
        Duration::from_millis(self.stabilization_poll_ms)
    }

    #[must_use]
    pub const fn restore_settle(&self) -> Duration { Duration::from_millis(self.restore_settle_ms) }
}

/// Default config file location: `config_dir()/window_layout_keeper/config.ron`.
///
/// - Windows: `C:\Users\<User>\AppData\Roaming\window_layout_keeper\config.ron`
/// - Linux: `~/.config/window_layout_keeper/config.ron`
/// - macOS: `~/Library/Application Support/window_layout_keeper/config.ron`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
}

/// Load the config file, falling back to defaults when it does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<KeeperConfig, ConfigError> {
    if !path.exists() {
        debug!(
            "[load_config] {} not found, using defaults",
            path.display()
        );
        return Ok(KeeperConfig::default());
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("[load_config] loaded {}", path.display());
    Ok(config)
}

/// Write the config as pretty RON, creating parent directories as needed.
///
/// # Errors
///
/// Returns an error if serialization fails or the file cannot be written.
pub fn save_config(path: &Path, config: &KeeperConfig) -> Result<(), ConfigError> {
    let contents = ron::ser::to_string_pretty(config, ron::ser::PrettyConfig::default())?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, contents).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.ron")).unwrap();
        assert_eq!(config, KeeperConfig::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "(debounce_ms: 3000, hang_denylist: [])").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.debounce(), Duration::from_millis(3000));
        assert!(config.hang_denylist.is_empty());
        assert_eq!(config.stabilization_poll_ms, 1000);
        assert_eq!(config.max_stabilization_polls, 30);
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = KeeperConfig {
            restore_settle_ms: 250,
            ..KeeperConfig::default()
        };

        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "(debounce_ms: \"soon\")").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(CONFIG_FILE));
    }
}
