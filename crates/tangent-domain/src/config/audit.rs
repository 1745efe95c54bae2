use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "d_log_dir")]
    pub log_dir: String,
    #[serde(default = "d_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "d_flush_buffer_size")]
    pub flush_buffer_size: usize,
    /// Env var holding the HMAC key for the hash chain (§4.B). If unset at
    /// startup, a fixed development key is used and a warning is logged
    /// once (Open Question resolution, see DESIGN.md).
    #[serde(default = "d_mac_key_env")]
    pub mac_key_env: String,
    /// Cap on how long `Finalize` awaits the "audit-log complete" signal,
    /// in milliseconds (`spec.md` §5, 10s).
    #[serde(default = "d_finalize_await_ms")]
    pub finalize_await_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_dir: d_log_dir(),
            flush_interval_ms: d_flush_interval_ms(),
            flush_buffer_size: d_flush_buffer_size(),
            mac_key_env: d_mac_key_env(),
            finalize_await_ms: d_finalize_await_ms(),
        }
    }
}

fn d_log_dir() -> String {
    std::env::temp_dir()
        .join("tangent-audit")
        .to_string_lossy()
        .into_owned()
}

fn d_flush_interval_ms() -> u64 {
    1_000
}

fn d_flush_buffer_size() -> usize {
    32
}

fn d_mac_key_env() -> String {
    "TANGENT_AUDIT_KEY".into()
}

fn d_finalize_await_ms() -> u64 {
    10_000
}
