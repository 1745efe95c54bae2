//! Runner interface and the stdio runner (§4.D).

pub mod stdio;
pub mod writer;

pub use writer::{OutputStream, OutputWriter};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use tangent_domain::Result;

/// The runner's own view of what kind of run this is. Only `Interactive` is
/// produced today (`spec.md` §4.F only supports interactive sessions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Interactive,
}

/// Argument bundle a session hands to a runner for one invocation
/// (`spec.md` §4.E step 8).
#[derive(Debug, Clone, Serialize)]
pub struct RunArgs {
    pub invocation_id: String,
    /// Filesystem path to the skill-service Unix domain socket.
    pub service_endpoint: String,
    pub run_mode: RunMode,
    pub session_id: String,
    pub skill_name: String,
    pub input_args: serde_json::Map<String, serde_json::Value>,
    pub session_variables: serde_json::Map<String, serde_json::Value>,
}

/// Per-invocation execution context. Cancelling `cancellation` kills the
/// child process (signal, then wait with bounded grace).
#[derive(Clone)]
pub struct RunContext {
    pub cancellation: CancellationToken,
    pub session_id: String,
    pub invocation_id: String,
}

/// One concrete executable unit behind a skill's `RunnerRef` (`spec.md`
/// §4.D). `id`/`add_writers`/`run` mirror the spec's interface exactly.
#[async_trait]
pub trait Runner: Send + Sync {
    fn id(&self) -> &str;

    /// Register additional output sinks before `run` is called. Writers
    /// already registered are kept; this only appends.
    fn add_writers(&self, writers: Vec<Arc<dyn OutputWriter>>);

    async fn run(&self, ctx: RunContext, args: RunArgs) -> Result<()>;
}

/// Opaque per-skill runner configuration, keyed by runner id (§3, `Skill`).
pub type RunnerConfigMap = HashMap<String, serde_json::Value>;
