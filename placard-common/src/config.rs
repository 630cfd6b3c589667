//! Configuration loading and data directory resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Well-known file layout inside the placard data directory
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
    /// Shared state database
    pub state_db: PathBuf,
    /// Locally uploaded media blobs
    pub blobs_dir: PathBuf,
    /// Persistent device identity
    pub identity_file: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            state_db: root.join("state.db"),
            blobs_dir: root.join("blobs"),
            identity_file: root.join("device.json"),
            root,
        }
    }
}

/// Data directory resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_dir(cli_arg: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = find_config_file() {
        if let Some(dir) = read_data_dir_key(&config_path) {
            return Ok(dir);
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_data_dir())
}

fn read_data_dir_key(config_path: &Path) -> Option<PathBuf> {
    let toml_content = std::fs::read_to_string(config_path).ok()?;
    let config = toml::from_str::<toml::Value>(&toml_content).ok()?;
    config
        .get("data_dir")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
}

/// Get default configuration file path for the platform
fn find_config_file() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // Try ~/.config/placard/config.toml first, then /etc/placard/config.toml
        if let Some(path) = dirs::config_dir().map(|d| d.join("placard").join("config.toml")) {
            if path.exists() {
                return Ok(path);
            }
        }
        let system_config = PathBuf::from("/etc/placard/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
        Err(Error::Config("No config file found".to_string()))
    } else {
        let path = dirs::config_dir()
            .map(|d| d.join("placard").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::Config(format!("Config file not found: {:?}", path)))
        }
    }
}

/// Get OS-dependent default data directory path
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/placard (or /var/lib/placard for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("placard"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/placard"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("placard"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/placard"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("placard"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\placard"))
    } else {
        PathBuf::from("./placard_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn data_paths_layout() {
        let paths = DataPaths::new("/var/lib/placard");
        assert_eq!(paths.state_db, PathBuf::from("/var/lib/placard/state.db"));
        assert_eq!(paths.blobs_dir, PathBuf::from("/var/lib/placard/blobs"));
        assert_eq!(
            paths.identity_file,
            PathBuf::from("/var/lib/placard/device.json")
        );
    }

    #[test]
    #[serial]
    fn cli_argument_wins() {
        std::env::set_var("PLACARD_TEST_DATA_DIR", "/from/env");
        let dir = resolve_data_dir(Some("/from/cli"), "PLACARD_TEST_DATA_DIR").unwrap();
        assert_eq!(dir, PathBuf::from("/from/cli"));
        std::env::remove_var("PLACARD_TEST_DATA_DIR");
    }

    #[test]
    #[serial]
    fn env_var_beats_defaults() {
        std::env::set_var("PLACARD_TEST_DATA_DIR", "/from/env");
        let dir = resolve_data_dir(None, "PLACARD_TEST_DATA_DIR").unwrap();
        assert_eq!(dir, PathBuf::from("/from/env"));
        std::env::remove_var("PLACARD_TEST_DATA_DIR");
    }

    #[test]
    #[serial]
    fn falls_back_to_platform_default() {
        std::env::remove_var("PLACARD_TEST_DATA_DIR");
        let dir = resolve_data_dir(None, "PLACARD_TEST_DATA_DIR").unwrap();
        // Whatever the platform, the default ends in "placard"
        assert!(dir.to_string_lossy().contains("placard"));
    }
}
