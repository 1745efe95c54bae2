use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Process-wide runner defaults (§4.D). Per-skill overrides live on the
/// skill's own `RunnerDef` in `tangent-policy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Root directory under which per-session scratch directories
    /// (`<scratch_root>/<session_id>`) are created.
    #[serde(default = "d_scratch_root")]
    pub scratch_root: String,
    /// Interpreter binary to use for each named runtime, e.g.
    /// `{"python": "/usr/bin/python3", "node": "/usr/bin/node"}`.
    #[serde(default = "d_interpreters")]
    pub interpreters: HashMap<String, String>,
    /// Grace period after sending a kill signal before declaring the
    /// process unresponsive, in milliseconds.
    #[serde(default = "d_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            scratch_root: d_scratch_root(),
            interpreters: d_interpreters(),
            kill_grace_ms: d_kill_grace_ms(),
        }
    }
}

fn d_scratch_root() -> String {
    std::env::temp_dir()
        .join("tangent-sessions")
        .to_string_lossy()
        .into_owned()
}

fn d_interpreters() -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert("bash".into(), "/bin/bash".into());
    m.insert("python".into(), "/usr/bin/python3".into());
    m.insert("node".into(), "/usr/bin/node".into());
    m.insert("npx".into(), "/usr/bin/npx".into());
    m.insert("npm".into(), "/usr/bin/npm".into());
    m
}

fn d_kill_grace_ms() -> u64 {
    2_000
}

/// The single supported runner security mode. Anything else fails
/// `Config::validate()` — production isolation (chroot/namespaces/seccomp)
/// is explicitly out of scope (`spec.md` §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunnerSecurityType {
    DevMode,
}
