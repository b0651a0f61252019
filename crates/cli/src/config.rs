//! Settings read from `KUBESLEEP_*` environment variables

use serde::Deserialize;

/// Latest release endpoint queried by the update check
pub const DEFAULT_RELEASE_URL: &str = "https://api.github.com/repos/y0-l0/kubesleep/releases/latest";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines (default)
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// CLI settings
#[derive(Debug, Clone, Deserialize)]
pub struct CliSettings {
    /// Format of the logs written to stderr
    #[serde(default)]
    pub log_format: LogFormat,

    /// Check GitHub for a newer release while the command runs
    #[serde(default = "default_update_check")]
    pub update_check: bool,

    #[serde(default = "default_release_url")]
    pub release_url: String,
}

fn default_update_check() -> bool {
    true
}

fn default_release_url() -> String {
    DEFAULT_RELEASE_URL.to_string()
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            update_check: default_update_check(),
            release_url: default_release_url(),
        }
    }
}

impl CliSettings {
    /// Load settings from the environment.
    ///
    /// Logging is not set up yet when this runs, so errors are returned for
    /// the caller to report once it is.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::with_prefix("KUBESLEEP"))
    }

    fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environment(vars: &[(&str, &str)]) -> config::Environment {
        let source = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<config::Map<String, String>>();
        config::Environment::with_prefix("KUBESLEEP").source(Some(source))
    }

    #[test]
    fn test_defaults() {
        let settings = CliSettings::from_environment(environment(&[])).unwrap();
        assert_eq!(settings.log_format, LogFormat::Text);
        assert!(settings.update_check);
        assert_eq!(settings.release_url, DEFAULT_RELEASE_URL);
    }

    #[test]
    fn test_overrides() {
        let settings = CliSettings::from_environment(environment(&[
            ("KUBESLEEP_LOG_FORMAT", "json"),
            ("KUBESLEEP_UPDATE_CHECK", "false"),
            ("KUBESLEEP_RELEASE_URL", "http://localhost:1234/latest"),
        ]))
        .unwrap();
        assert_eq!(settings.log_format, LogFormat::Json);
        assert!(!settings.update_check);
        assert_eq!(settings.release_url, "http://localhost:1234/latest");
    }

    #[test]
    fn test_invalid_log_format() {
        let result = CliSettings::from_environment(environment(&[("KUBESLEEP_LOG_FORMAT", "xml")]));
        assert!(result.is_err());
    }
}
