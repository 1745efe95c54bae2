//! Explicit app-state construction (§4.F, §4.H, §4.I). Every subsystem is
//! built once, in dependency order, with a `tracing::info!` status line —
//! the same sequential-construction-with-status-lines shape as the
//! teacher's server bootstrap.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tangent_bus::{AuditKeySource, EventBus, StaticKey};
use tangent_catalog_client::CatalogClient;
use tangent_domain::config::Config;
use tangent_session::SessionRegistry;

/// Shared application state passed to every API handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub bus: EventBus,
    pub catalog_client: Arc<CatalogClient>,
    pub call_graph_max_depth: usize,
    pub runner_defaults: tangent_domain::config::RunnerConfig,
    pub scripts_root: PathBuf,
    pub socket_path: String,
    pub audit_log_dir: PathBuf,
    pub audit_key: Arc<dyn AuditKeySource>,
    pub audit_flush_buffer_size: usize,
    pub audit_finalize_await_ms: u64,
}

impl AppState {
    pub fn build(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let bus = EventBus::new(Duration::from_millis(config.bus.publish_timeout_ms));
        tracing::info!(
            publish_timeout_ms = config.bus.publish_timeout_ms,
            "event bus ready"
        );

        let registry = Arc::new(SessionRegistry::new());
        tracing::info!("session registry ready");

        let catalog_client = Arc::new(CatalogClient::new(&config.catalog)?);
        tracing::info!(base_url = %config.catalog.base_url, "catalog client ready");

        let audit_log_dir = PathBuf::from(&config.audit.log_dir);
        std::fs::create_dir_all(&audit_log_dir)?;
        let audit_key: Arc<dyn AuditKeySource> = Arc::new(StaticKey::from_env(&config.audit.mac_key_env));
        tracing::info!(dir = %audit_log_dir.display(), "audit log directory ready");

        let scripts_root = PathBuf::from(&config.runner.scratch_root);
        std::fs::create_dir_all(&scripts_root)?;

        let socket_path = config.socket.resolve().to_string_lossy().into_owned();
        tracing::info!(path = %socket_path, "skill-service socket path resolved");

        Ok(Self {
            call_graph_max_depth: config.call_graph.max_depth,
            runner_defaults: config.runner.clone(),
            audit_flush_buffer_size: config.audit.flush_buffer_size,
            audit_finalize_await_ms: config.audit.finalize_await_ms,
            config,
            registry,
            bus,
            catalog_client,
            scripts_root,
            socket_path,
            audit_log_dir,
            audit_key,
        })
    }
}
