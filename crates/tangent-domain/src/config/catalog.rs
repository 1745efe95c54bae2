use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Env var holding a static API key, used when no bearer token is
    /// present or the session's token has expired.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            request_timeout_ms: d_timeout_ms(),
            api_key_env: d_api_key_env(),
        }
    }
}

fn d_base_url() -> String {
    "https://catalog.tangent.internal".into()
}

fn d_timeout_ms() -> u64 {
    30_000
}

fn d_api_key_env() -> String {
    "TANGENT_CATALOG_API_KEY".into()
}
