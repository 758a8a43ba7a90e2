//! XDG Base Directory paths for parley.
//!
//! The CLI and the credential store resolve their files through these
//! helpers so that every platform uses the same layout.

use std::path::PathBuf;

/// Application directory name used under every base directory.
pub const APP_DIR: &str = "parley";

/// Name of the persisted credentials file inside [`data_dir`].
pub const CREDENTIALS_FILE: &str = "credentials.toml";

/// Name of the user configuration file inside [`config_dir`].
pub const CONFIG_FILE: &str = "config.toml";

/// Get the parley config directory.
///
/// Returns `$XDG_CONFIG_HOME/parley` if set, otherwise `~/.config/parley`.
///
/// # Examples
///
/// ```
/// use parley_paths::config_dir;
///
/// let config = config_dir();
/// assert!(config.ends_with("parley"));
/// ```
pub fn config_dir() -> PathBuf {
    base_dir("XDG_CONFIG_HOME", ".config")
}

/// Get the parley data directory.
///
/// Returns `$XDG_DATA_HOME/parley` if set, otherwise `~/.local/share/parley`.
/// Persisted access tokens live here.
pub fn data_dir() -> PathBuf {
    base_dir("XDG_DATA_HOME", ".local/share")
}

/// Path of the user-level config file.
pub fn config_file() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// Path of the persisted credentials file.
pub fn credentials_file() -> PathBuf {
    data_dir().join(CREDENTIALS_FILE)
}

fn base_dir(xdg_var: &str, home_relative: &str) -> PathBuf {
    if let Ok(xdg) = std::env::var(xdg_var)
        && !xdg.is_empty()
    {
        PathBuf::from(xdg).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        home.join(home_relative).join(APP_DIR)
    } else {
        PathBuf::from(home_relative).join(APP_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn config_dir_ends_with_app_dir() {
        assert!(config_dir().ends_with(APP_DIR));
    }

    #[test]
    #[serial]
    fn config_dir_respects_xdg_env() {
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", "/tmp/parley-test-config");
        }
        let path = config_dir();
        unsafe {
            std::env::remove_var("XDG_CONFIG_HOME");
        }
        assert_eq!(path, PathBuf::from("/tmp/parley-test-config/parley"));
    }

    #[test]
    #[serial]
    fn credentials_file_lives_in_data_dir() {
        unsafe {
            std::env::set_var("XDG_DATA_HOME", "/tmp/parley-test-data");
        }
        let path = credentials_file();
        unsafe {
            std::env::remove_var("XDG_DATA_HOME");
        }
        assert_eq!(
            path,
            PathBuf::from("/tmp/parley-test-data/parley/credentials.toml")
        );
    }

    #[test]
    #[serial]
    fn empty_xdg_var_falls_back_to_home() {
        unsafe {
            std::env::set_var("XDG_DATA_HOME", "");
        }
        let path = data_dir();
        unsafe {
            std::env::remove_var("XDG_DATA_HOME");
        }
        assert!(path.ends_with(".local/share/parley"));
    }
}
