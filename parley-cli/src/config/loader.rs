use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parley_core::ReconnectConfig;
use parley_core::config::{API_URL_ENV, ENDPOINT_ENV, env_value};

use super::types::{
    ChatConfig, ParleyConfig, RawParleyConfig, RawReconnectConfig, RawServerConfig, ServerConfig,
};

/// Environment variable relocating the project config directory
pub const PROJECT_CONFIG_DIR_ENV: &str = "PARLEY_PROJECT_CONFIG_DIR";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project + environment)
    pub fn load() -> Result<ParleyConfig> {
        Self::load_layers(Some(&Self::user_config_path()), &Self::project_config_path())
    }

    /// Get user config path (`$XDG_CONFIG_HOME/parley/config.toml`)
    pub fn user_config_path() -> PathBuf {
        parley_paths::config_file()
    }

    /// Get project config path
    /// Can be overridden with PARLEY_PROJECT_CONFIG_DIR env var (useful for isolated e2e tests)
    pub fn project_config_path() -> PathBuf {
        match std::env::var(PROJECT_CONFIG_DIR_ENV) {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir).join(parley_paths::CONFIG_FILE),
            _ => PathBuf::from(".parley").join(parley_paths::CONFIG_FILE),
        }
    }

    fn load_layers(user_path: Option<&Path>, project_path: &Path) -> Result<ParleyConfig> {
        let mut raw = RawParleyConfig::default();

        // Layer 1: User config
        if let Some(user_path) = user_path
            && let Some(user_config) = Self::read_raw(user_path)?
        {
            raw = Self::merge_raw(raw, user_config);
        }

        // Layer 2: Project config
        if let Some(project_config) = Self::read_raw(project_path)? {
            raw = Self::merge_raw(raw, project_config);
        }

        // Layer 3: Environment
        Self::apply_env(&mut raw);

        Ok(Self::finalize(raw))
    }

    fn read_raw(path: &Path) -> Result<Option<RawParleyConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(Some(config))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawParleyConfig, overlay: RawParleyConfig) -> RawParleyConfig {
        RawParleyConfig {
            server: RawServerConfig {
                endpoint: overlay.server.endpoint.or(base.server.endpoint),
                api_url: overlay.server.api_url.or(base.server.api_url),
                protocol: overlay.server.protocol.or(base.server.protocol),
                transports: overlay.server.transports.or(base.server.transports),
            },
            reconnect: RawReconnectConfig {
                enabled: overlay.reconnect.enabled.or(base.reconnect.enabled),
                max_attempts: overlay.reconnect.max_attempts.or(base.reconnect.max_attempts),
                delay: overlay.reconnect.delay.or(base.reconnect.delay),
            },
            chat: ChatConfig {
                user: overlay.chat.user.or(base.chat.user),
                rooms: if overlay.chat.rooms.is_empty() {
                    base.chat.rooms
                } else {
                    overlay.chat.rooms
                },
            },
        }
    }

    fn apply_env(raw: &mut RawParleyConfig) {
        if let Some(endpoint) = env_value(ENDPOINT_ENV) {
            raw.server.endpoint = Some(endpoint);
        }
        if let Some(api_url) = env_value(API_URL_ENV) {
            raw.server.api_url = Some(api_url);
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawParleyConfig) -> ParleyConfig {
        let defaults = ReconnectConfig::default();
        ParleyConfig {
            server: ServerConfig::from_raw(raw.server),
            reconnect: ReconnectConfig {
                enabled: raw.reconnect.enabled.unwrap_or(defaults.enabled),
                max_attempts: raw.reconnect.max_attempts.unwrap_or(defaults.max_attempts),
                delay: raw.reconnect.delay.unwrap_or(defaults.delay),
            },
            chat: raw.chat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{IdInput, Protocol};
    use serial_test::serial;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn clear_env() {
        // SAFETY: serial tests own the process environment
        unsafe {
            std::env::remove_var(ENDPOINT_ENV);
            std::env::remove_var(API_URL_ENV);
        }
    }

    #[test]
    #[serial]
    fn test_missing_files_yield_defaults() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();

        let config = ConfigLoader::load_layers(
            Some(&temp_dir.path().join("user.toml")),
            &temp_dir.path().join("project.toml"),
        )
        .unwrap();

        assert_eq!(config.server.endpoint, "http://localhost:3001");
        assert_eq!(config.reconnect, ReconnectConfig::default());
    }

    #[test]
    #[serial]
    fn test_project_overrides_user() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let user = write(
            &temp_dir,
            "user.toml",
            r#"
[server]
endpoint = "http://user.example:3001"
api_url = "http://user.example:3000"

[reconnect]
max_attempts = 10

[chat]
user = "alice"
rooms = [1, 2]
"#,
        );
        let project = write(
            &temp_dir,
            "project.toml",
            r#"
[server]
endpoint = "http://project.example:3001/"
protocol = "json_frames"

[reconnect]
delay = "3s"
"#,
        );

        let config = ConfigLoader::load_layers(Some(&user), &project).unwrap();

        assert_eq!(config.server.endpoint, "http://project.example:3001");
        assert_eq!(
            config.server.api_url.as_deref(),
            Some("http://user.example:3000")
        );
        assert_eq!(config.server.protocol, Protocol::JsonFrames);
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.reconnect.delay, Duration::from_secs(3));
        assert!(config.reconnect.enabled);
        assert_eq!(config.chat.user.as_deref(), Some("alice"));
        assert_eq!(
            config.chat.rooms,
            vec![IdInput::Number(1), IdInput::Number(2)]
        );
    }

    #[test]
    #[serial]
    fn test_env_overrides_files() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let project = write(
            &temp_dir,
            "project.toml",
            "[server]\nendpoint = \"http://project.example:3001\"\n",
        );

        // SAFETY: serial tests own the process environment
        unsafe {
            std::env::set_var(ENDPOINT_ENV, "https://env.example/");
            std::env::set_var(API_URL_ENV, "https://api.env.example");
        }
        let config = ConfigLoader::load_layers(None, &project).unwrap();
        clear_env();

        assert_eq!(config.server.endpoint, "https://env.example");
        assert_eq!(
            config.server.api_url.as_deref(),
            Some("https://api.env.example")
        );
    }

    #[test]
    #[serial]
    fn test_blank_env_keeps_file_values() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let project = write(
            &temp_dir,
            "project.toml",
            "[server]\nendpoint = \"http://project.example:3001\"\n",
        );

        // SAFETY: serial tests own the process environment
        unsafe {
            std::env::set_var(ENDPOINT_ENV, "   ");
            std::env::set_var(API_URL_ENV, "");
        }
        let config = ConfigLoader::load_layers(None, &project).unwrap();
        clear_env();

        assert_eq!(config.server.endpoint, "http://project.example:3001");
        assert_eq!(config.server.api_url, None);
    }

    #[test]
    #[serial]
    fn test_invalid_toml_returns_error() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let project = write(&temp_dir, "project.toml", "this is not valid toml {{{{");

        let err = ConfigLoader::load_layers(None, &project).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
    }

    #[test]
    fn test_merge_raw_none_preserves_base() {
        let base = RawParleyConfig {
            server: RawServerConfig {
                endpoint: Some("http://base:3001".to_string()),
                ..Default::default()
            },
            reconnect: RawReconnectConfig {
                enabled: Some(false),
                ..Default::default()
            },
            chat: ChatConfig {
                user: Some("bob".to_string()),
                rooms: vec![IdInput::Number(5)],
            },
        };

        let merged = ConfigLoader::merge_raw(base, RawParleyConfig::default());

        assert_eq!(merged.server.endpoint.as_deref(), Some("http://base:3001"));
        assert_eq!(merged.reconnect.enabled, Some(false));
        assert_eq!(merged.chat.user.as_deref(), Some("bob"));
        assert_eq!(merged.chat.rooms, vec![IdInput::Number(5)]);
    }

    #[test]
    #[serial]
    fn test_project_config_path() {
        // SAFETY: serial tests own the process environment
        unsafe { std::env::remove_var(PROJECT_CONFIG_DIR_ENV) };
        assert_eq!(
            ConfigLoader::project_config_path(),
            PathBuf::from(".parley/config.toml")
        );

        unsafe { std::env::set_var(PROJECT_CONFIG_DIR_ENV, "/tmp/parley-e2e") };
        assert_eq!(
            ConfigLoader::project_config_path(),
            PathBuf::from("/tmp/parley-e2e/config.toml")
        );
        unsafe { std::env::remove_var(PROJECT_CONFIG_DIR_ENV) };
    }

    #[test]
    fn test_user_config_path_is_under_parley() {
        let path = ConfigLoader::user_config_path();
        assert!(path.to_string_lossy().contains("parley"));
        assert!(path.ends_with("config.toml"));
    }
}
