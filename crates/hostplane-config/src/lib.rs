//! Hostplane configuration
//!
//! Locates `hostplane.kdl`, parses it into a [`PanelConfig`] and applies
//! environment overrides.

pub mod config;
pub mod error;

pub use config::{PanelConfig, ProviderConfig, Timeouts};
pub use error::*;

use std::path::PathBuf;

pub const CONFIG_PATH_ENV: &str = "HOSTPLANE_CONFIG_PATH";

const CONFIG_FILES: [&str; 2] = ["hostplane.local.kdl", "hostplane.kdl"];

/// Hostplane config directory, created on first use
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("hostplane");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Finds the config file
///
/// Lookup order:
/// 1. `HOSTPLANE_CONFIG_PATH`
/// 2. current directory: `hostplane.local.kdl`, `hostplane.kdl`
/// 3. `./.hostplane/hostplane.kdl`
/// 4. `~/.config/hostplane/hostplane.kdl`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CONFIG_FILES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_config = current_dir.join(".hostplane").join("hostplane.kdl");
    if project_config.exists() {
        return Ok(project_config);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("hostplane").join("hostplane.kdl");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    /// Runs `f` inside `dir` with no explicit config path
    fn in_dir<R>(dir: &std::path::Path, f: impl FnOnce() -> R) -> R {
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, f);
        std::env::set_current_dir(original_dir).unwrap();
        result
    }

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("hostplane"));
        assert!(config_dir.exists());
    }

    #[test]
    #[serial]
    fn test_find_config_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("hostplane.kdl"), "// test").unwrap();

        let found = in_dir(temp_dir.path(), find_config_file).unwrap();
        assert!(found.ends_with("hostplane.kdl"));
    }

    #[test]
    #[serial]
    fn test_local_file_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("hostplane.kdl"), "// shared").unwrap();
        fs::write(temp_dir.path().join("hostplane.local.kdl"), "// local").unwrap();

        let found = in_dir(temp_dir.path(), find_config_file).unwrap();
        assert!(found.ends_with("hostplane.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_config_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_dir = temp_dir.path().join(".hostplane");
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("hostplane.kdl"), "// project").unwrap();

        let found = in_dir(temp_dir.path(), find_config_file).unwrap();
        assert!(found.ends_with(".hostplane/hostplane.kdl"));
    }

    #[test]
    #[serial]
    fn test_env_path_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.kdl");
        fs::write(&config_path, "// custom").unwrap();

        let found = temp_env::with_var(CONFIG_PATH_ENV, Some(&config_path), find_config_file);
        assert_eq!(found.unwrap(), config_path);
    }

    #[test]
    #[serial]
    fn test_missing_env_path_falls_through() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("hostplane.kdl"), "// test").unwrap();

        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp_dir.path()).unwrap();
        let found = temp_env::with_var(
            CONFIG_PATH_ENV,
            Some("/nonexistent/hostplane.kdl"),
            find_config_file,
        );
        std::env::set_current_dir(original_dir).unwrap();

        assert!(found.unwrap().ends_with("hostplane.kdl"));
    }

    #[test]
    #[serial]
    fn test_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        // An empty HOME keeps a developer's global config out of the lookup
        let result = temp_env::with_vars(
            [
                ("HOME", Some(temp_dir.path().as_os_str())),
                ("XDG_CONFIG_HOME", None),
            ],
            || in_dir(temp_dir.path(), find_config_file),
        );

        assert!(matches!(result, Err(ConfigError::ConfigFileNotFound)));
    }
}
