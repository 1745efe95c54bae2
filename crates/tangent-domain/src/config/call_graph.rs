use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallGraphConfig {
    #[serde(default = "d_max_depth")]
    pub max_depth: usize,
}

impl Default for CallGraphConfig {
    fn default() -> Self {
        Self {
            max_depth: d_max_depth(),
        }
    }
}

fn d_max_depth() -> usize {
    25
}
