//! `AppConfig` struct, file location and TOML read/write.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Directory under the user config root.
const APP_DIR: &str = "reelmeta";
/// File name inside the config directory.
const FILE_NAME: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// TMDB settings.
    #[serde(default)]
    pub tmdb: TmdbConfig,
    /// OMDb settings.
    #[serde(default)]
    pub omdb: OmdbConfig,
    /// Settings shared by both clients.
    #[serde(default)]
    pub http: HttpConfig,
}

/// `[tmdb]` section.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TmdbConfig {
    /// API read access token. `TMDB_API_TOKEN` takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Base URL override (e.g., a local mirror).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Client-side request rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_second: Option<u32>,
}

/// `[omdb]` section.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct OmdbConfig {
    /// API key. `OMDB_API_KEY` takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Client-side request rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_second: Option<u32>,
}

/// `[http]` section.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct HttpConfig {
    /// Overall deadline per logical request, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// `User-Agent` header override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl HttpConfig {
    /// Request deadline, if configured.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl AppConfig {
    /// Location of the config file.
    ///
    /// `dir` (the `--dir` flag) wins. Otherwise `$XDG_CONFIG_HOME/reelmeta/config.toml`,
    /// falling back to `$HOME/.config/reelmeta/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` is `None` and neither variable is usable.
    pub fn path(dir: Option<&Path>) -> Result<PathBuf> {
        locate(
            dir,
            std::env::var_os("XDG_CONFIG_HOME"),
            std::env::var_os("HOME"),
        )
    }

    /// Loads config from a TOML file. Returns default if file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Saves config to a TOML file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation or file write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("failed to serialize config to TOML")?;
        std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Resolves the config file from the flag and the environment values.
///
/// A relative `XDG_CONFIG_HOME` is ignored, as the XDG base directory rules require.
fn locate(
    dir: Option<&Path>,
    xdg_config_home: Option<OsString>,
    home: Option<OsString>,
) -> Result<PathBuf> {
    if let Some(dir) = dir {
        return Ok(dir.join(FILE_NAME));
    }
    let root = xdg_config_home
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .or_else(|| {
            home.filter(|h| !h.is_empty())
                .map(|h| PathBuf::from(h).join(".config"))
        })
        .context("cannot locate the config directory: set HOME or XDG_CONFIG_HOME, or pass --dir")?;
    Ok(root.join(APP_DIR).join(FILE_NAME))
}

/// Picks a credential: a non-empty environment value wins over the file value.
#[must_use]
pub fn resolve_secret(env_value: Option<String>, file_value: Option<&str>) -> Option<String> {
    env_value
        .filter(|v| !v.trim().is_empty())
        .or_else(|| file_value.map(String::from))
        .filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_default_config() {
        // Arrange & Act
        let config = AppConfig::default();

        // Assert
        assert!(config.tmdb.api_token.is_none());
        assert!(config.omdb.api_key.is_none());
        assert!(config.http.timeout().is_none());
    }

    #[test]
    fn test_parse_all_sections() {
        // Arrange
        let toml_str = r#"
            [tmdb]
            api_token = "tok"
            base_url = "http://127.0.0.1:8080/3/"
            requests_per_second = 20

            [omdb]
            api_key = "key"

            [http]
            timeout_secs = 15
            user_agent = "reelmeta-test/1.0"
        "#;

        // Act
        let config: AppConfig = toml::from_str(toml_str).unwrap();

        // Assert
        assert_eq!(config.tmdb.api_token.as_deref(), Some("tok"));
        assert_eq!(config.tmdb.requests_per_second, Some(20));
        assert_eq!(config.omdb.api_key.as_deref(), Some("key"));
        assert!(config.omdb.base_url.is_none());
        assert_eq!(config.http.timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.http.user_agent.as_deref(), Some("reelmeta-test/1.0"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        // Arrange
        let toml_str = "[omdb]\napi_key = \"key\"\n";

        // Act
        let config: AppConfig = toml::from_str(toml_str).unwrap();

        // Assert
        assert_eq!(config.tmdb, TmdbConfig::default());
        assert_eq!(config.http, HttpConfig::default());
    }

    #[test]
    fn test_path_prefers_dir_flag() {
        // Arrange
        let dir = Path::new("/srv/reelmeta");

        // Act
        let path = locate(
            Some(dir),
            Some(OsString::from("/xdg")),
            Some(OsString::from("/home/u")),
        )
        .unwrap();

        // Assert
        assert_eq!(path, PathBuf::from("/srv/reelmeta/config.toml"));
    }

    #[test]
    fn test_path_uses_xdg_config_home() {
        // Arrange & Act
        let path = locate(
            None,
            Some(OsString::from("/xdg")),
            Some(OsString::from("/home/u")),
        )
        .unwrap();

        // Assert
        assert_eq!(path, PathBuf::from("/xdg/reelmeta/config.toml"));
    }

    #[test]
    fn test_path_falls_back_to_home() {
        // Arrange & Act
        let unset = locate(None, None, Some(OsString::from("/home/u"))).unwrap();
        let relative = locate(
            None,
            Some(OsString::from("cfg")),
            Some(OsString::from("/home/u")),
        )
        .unwrap();

        // Assert
        assert_eq!(unset, PathBuf::from("/home/u/.config/reelmeta/config.toml"));
        assert_eq!(relative, unset);
    }

    #[test]
    fn test_path_without_any_root_fails() {
        // Arrange & Act
        let err = locate(None, None, Some(OsString::new())).unwrap_err();

        // Assert
        assert!(err.to_string().contains("--dir"));
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        // Arrange
        let path = Path::new("/tmp/nonexistent_reelmeta_test/config.toml");

        // Act
        let config = AppConfig::load(path).unwrap();

        // Assert
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tmdb\napi_token = ").unwrap();

        // Act
        let err = AppConfig::load(&path).unwrap_err();

        // Assert
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_save_and_load() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");
        let config = AppConfig {
            tmdb: TmdbConfig {
                api_token: Some(String::from("tok")),
                ..TmdbConfig::default()
            },
            http: HttpConfig {
                timeout_secs: Some(30),
                user_agent: None,
            },
            ..AppConfig::default()
        };

        // Act
        config.save(&path).unwrap();
        let loaded = AppConfig::load(&path).unwrap();

        // Assert
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_resolve_secret_prefers_env() {
        // Arrange & Act & Assert
        assert_eq!(
            resolve_secret(Some(String::from("env")), Some("file")).as_deref(),
            Some("env")
        );
        assert_eq!(resolve_secret(None, Some("file")).as_deref(), Some("file"));
        assert_eq!(
            resolve_secret(Some(String::from("  ")), Some("file")).as_deref(),
            Some("file")
        );
        assert_eq!(resolve_secret(None, Some("")), None);
        assert_eq!(resolve_secret(None, None), None);
    }
}
