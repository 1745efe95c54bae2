use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Per-send timeout before a slow subscriber is skipped for one event
    /// (`spec.md` §5, ~100ms).
    #[serde(default = "d_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    #[serde(default = "d_default_buffer_size")]
    pub default_buffer_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            publish_timeout_ms: d_publish_timeout_ms(),
            default_buffer_size: d_default_buffer_size(),
        }
    }
}

fn d_publish_timeout_ms() -> u64 {
    100
}

fn d_default_buffer_size() -> usize {
    64
}
