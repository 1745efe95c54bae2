use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Local skill-service endpoint configuration (§4.G).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SocketConfig {
    /// Explicit socket path override. When unset, resolved at startup from
    /// `$XDG_RUNTIME_DIR/tangent.service`, falling back to
    /// `~/.local/run/tangent.service`.
    #[serde(default)]
    pub path: Option<String>,
}

impl SocketConfig {
    /// Resolve the concrete socket path: the configured override, or
    /// `$XDG_RUNTIME_DIR/tangent.service`, or `~/.local/run/tangent.service`
    /// (§4.G, §6 "Environment").
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return PathBuf::from(path);
        }

        if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
            if !runtime_dir.is_empty() {
                return PathBuf::from(runtime_dir).join("tangent.service");
            }
        }

        let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
        PathBuf::from(home).join(".local/run/tangent.service")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_override_wins() {
        let cfg = SocketConfig {
            path: Some("/tmp/custom.sock".into()),
        };
        assert_eq!(cfg.resolve(), PathBuf::from("/tmp/custom.sock"));
    }

    #[test]
    fn falls_back_to_xdg_runtime_dir() {
        std::env::set_var("XDG_RUNTIME_DIR", "/run/user/1000");
        let cfg = SocketConfig::default();
        assert_eq!(
            cfg.resolve(),
            PathBuf::from("/run/user/1000/tangent.service")
        );
        std::env::remove_var("XDG_RUNTIME_DIR");
    }

    #[test]
    fn falls_back_to_home_local_run_when_xdg_unset() {
        std::env::remove_var("XDG_RUNTIME_DIR");
        std::env::set_var("HOME", "/home/tester");
        let cfg = SocketConfig::default();
        assert_eq!(
            cfg.resolve(),
            PathBuf::from("/home/tester/.local/run/tangent.service")
        );
    }
}
