mod audit;
mod bus;
mod call_graph;
mod catalog;
mod runner;
mod server;
mod socket;

pub use audit::*;
pub use bus::*;
pub use call_graph::*;
pub use catalog::*;
pub use runner::*;
pub use server::*;
pub use socket::*;

use std::fmt;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub call_graph: CallGraphConfig,
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for
    /// every field the file omits.
    pub fn load_from_str(toml_src: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_src)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. An empty
    /// vec means everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.catalog.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "catalog.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        } else if !self.catalog.base_url.starts_with("http://")
            && !self.catalog.base_url.starts_with("https://")
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "catalog.base_url".into(),
                message: format!(
                    "base_url must start with http:// or https:// (got \"{}\")",
                    self.catalog.base_url
                ),
            });
        }

        if self.call_graph.max_depth == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "call_graph.max_depth".into(),
                message: "max_depth must be greater than 0".into(),
            });
        }

        if self.bus.publish_timeout_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "bus.publish_timeout_ms".into(),
                message: "a zero publish timeout means any busy subscriber is skipped immediately".into(),
            });
        }

        if self.audit.log_dir.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "audit.log_dir".into(),
                message: "log_dir must not be empty".into(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig {
                port: 8087,
                host: "127.0.0.1".into(),
                ..ServerConfig::default()
            },
            catalog: CatalogConfig {
                base_url: "https://catalog.example.com".into(),
                ..CatalogConfig::default()
            },
            ..Config::default()
        }
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_passes() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issue = find_issue(&cfg.validate(), "server.port").expect("expected error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn catalog_base_url_invalid_scheme_is_error() {
        let mut cfg = valid_config();
        cfg.catalog.base_url = "ftp://catalog.example.com".into();
        let issue = find_issue(&cfg.validate(), "catalog.base_url").expect("expected error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn catalog_base_url_empty_is_error() {
        let mut cfg = valid_config();
        cfg.catalog.base_url = String::new();
        let issue = find_issue(&cfg.validate(), "catalog.base_url").expect("expected error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn call_graph_max_depth_zero_is_error() {
        let mut cfg = valid_config();
        cfg.call_graph.max_depth = 0;
        let issue = find_issue(&cfg.validate(), "call_graph.max_depth").expect("expected error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn load_from_minimal_toml_uses_defaults() {
        let cfg = Config::load_from_str("").unwrap();
        assert_eq!(cfg.server.port, 8087);
        assert_eq!(cfg.call_graph.max_depth, 25);
    }

    #[test]
    fn load_from_toml_overrides_fields() {
        let cfg = Config::load_from_str(
            r#"
            [server]
            port = 9000

            [call_graph]
            max_depth = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.call_graph.max_depth, 5);
        assert_eq!(cfg.server.host, "127.0.0.1");
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be greater than 0".into(),
        };
        assert_eq!(
            format!("{err}"),
            "[ERROR] server.port: port must be greater than 0"
        );
    }
}
