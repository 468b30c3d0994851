//! Configuration loader.

use std::borrow::Cow;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::ConfigError;
use crate::schema::Config;

static ENV_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex"));

/// Reads `cronhook.toml`, substituting `${VAR}` references from the environment.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file. A missing file is `NotFound`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::NotFound(path.display().to_string()),
            _ => ConfigError::Io(e),
        })?;
        Self::load_str(&content)
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(&substitute_env(content)?)?)
    }

    /// Expand a leading `~` in paths such as `database.path`.
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }
}

/// Replace every `${VAR}`. The first unset variable is reported by name.
fn substitute_env(content: &str) -> Result<Cow<'_, str>, ConfigError> {
    let mut missing = None;
    let expanded = ENV_REF.replace_all(content, |caps: &Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| {
            if missing.is_none() {
                missing = Some(caps[1].to_string());
            }
            String::new()
        })
    });

    match missing {
        Some(name) => Err(ConfigError::EnvVarNotSet(name)),
        None => Ok(expanded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.scheduler.restore_on_startup);
        assert!(config.dispatcher.timeout_seconds.is_none());
    }

    #[test]
    fn test_every_section_is_read() {
        let config = ConfigLoader::load_str(
            r#"
            [server]
            host = "localhost"
            port = 9000

            [database]
            path = "/var/lib/cronhook/jobs.db"

            [dispatcher]
            timeout_seconds = 15
            user_agent = "billing-hooks/1.0"
            max_response_body_bytes = 1024

            [scheduler]
            restore_on_startup = false

            [logging]
            level = "cronhook=debug"
            directory = "/var/log/cronhook"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.path, "/var/lib/cronhook/jobs.db");
        assert_eq!(config.dispatcher.timeout_seconds, Some(15));
        assert_eq!(config.dispatcher.user_agent, "billing-hooks/1.0");
        assert_eq!(config.dispatcher.max_response_body_bytes, 1024);
        assert!(!config.scheduler.restore_on_startup);
        assert_eq!(config.logging.level, "cronhook=debug");
        assert!(config.logging.directory.is_some());
    }

    #[test]
    fn test_bundled_sample_parses() {
        let config = ConfigLoader::load_str(include_str!("../../../config/cronhook.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.dispatcher.timeout_seconds.is_none());
        assert!(config.logging.directory.is_none());
    }

    #[test]
    fn test_load_file_and_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cronhook.toml");
        assert!(matches!(
            ConfigLoader::load(&path),
            Err(ConfigError::NotFound(p)) if p.ends_with("cronhook.toml")
        ));

        std::fs::write(&path, "[scheduler]\nrestore_on_startup = false\n").unwrap();
        assert!(!ConfigLoader::load(&path).unwrap().scheduler.restore_on_startup);
    }

    #[test]
    fn test_malformed_toml_is_rejected() {
        let result = ConfigLoader::load_str("[dispatcher\ntimeout_seconds = 5");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_env_reference_in_user_agent() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("CRONHOOK_LOADER_AGENT", "ops-bot/2") };
        let config =
            ConfigLoader::load_str("[dispatcher]\nuser_agent = \"${CRONHOOK_LOADER_AGENT}\"")
                .unwrap();
        assert_eq!(config.dispatcher.user_agent, "ops-bot/2");
        unsafe { std::env::remove_var("CRONHOOK_LOADER_AGENT") };
    }

    #[test]
    fn test_unset_env_reference_names_the_variable() {
        let result = ConfigLoader::load_str("[database]\npath = \"${CRONHOOK_LOADER_UNSET}/db\"");
        assert!(
            matches!(result, Err(ConfigError::EnvVarNotSet(name)) if name == "CRONHOOK_LOADER_UNSET")
        );
    }

    #[test]
    fn test_dollar_without_braces_is_left_alone() {
        assert_eq!(substitute_env("body = \"$5 off\"").unwrap(), "body = \"$5 off\"");
    }

    #[test]
    fn test_expand_path_resolves_home() {
        let expanded = ConfigLoader::expand_path("~/.cronhook/cronhook.db");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("/.cronhook/cronhook.db"));
        assert_eq!(ConfigLoader::expand_path("/srv/cronhook.db"), "/srv/cronhook.db");
    }
}
