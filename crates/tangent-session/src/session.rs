//! The central `Session` object (§4.E): holds view + skillset + token +
//! call graph + invocation map + audit logger, and drives `Run`/`Finalize`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use tangent_bus::{Event, EventBus, HashChainWriter};
use tangent_catalog_client::{BearerAuth, CatalogClient, RequestOptions};
use tangent_domain::config::RunnerConfig as RunnerDefaults;
use tangent_domain::trace::TraceEvent;
use tangent_domain::{Error, Result};
use tangent_policy::{
    are_actions_allowed_on_resource, CallGraph, PolicyDecision, Scope, Skill, Skillset,
    ViewDefinition,
};
use tangent_runner::stdio::{StdioRunner, StdioRunnerConfig};
use tangent_runner::{RunArgs, RunContext, RunMode, Runner};

use crate::writer::{BusWriter, CapturingWriter};

/// Outcome of a completed `Run` call, returned up to the caller (orchestrator
/// or skill-service endpoint).
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub invocation_id: String,
    pub output: Value,
}

fn audit_topic(session_id: &str) -> String {
    format!("session.{session_id}.audit.log")
}

fn session_log_topic(session_id: &str) -> String {
    format!("session.{session_id}.session.log")
}

fn interactive_log_topic(session_id: &str) -> String {
    format!("session.{session_id}.interactive.log")
}

/// The session object. One instance lives per active session; the registry
/// (§4.H) holds sessions behind `Arc` so the skill-service endpoint can
/// re-enter by id rather than by direct handle.
pub struct Session {
    pub id: String,
    pub skillset_path: String,
    pub skill_name: String,
    pub view_id: String,
    pub tenant: String,
    pub catalog: String,
    pub variant: String,
    pub namespace: String,
    pub session_variables: Map<String, Value>,
    pub input_args: Map<String, Value>,

    view: ViewDefinition,
    skillset: RwLock<Option<Skillset>>,

    auth: RwLock<BearerAuth>,
    call_graph: CallGraph,
    invocation_map: RwLock<std::collections::HashMap<String, ViewDefinition>>,

    bus: EventBus,
    log_writer: Arc<HashChainWriter>,
    log_path: std::path::PathBuf,
    audit_complete: Arc<tokio::sync::Notify>,
    audit_completed: AtomicBool,

    catalog_client: Arc<CatalogClient>,
    runner_defaults: RunnerDefaults,
    scripts_root: std::path::PathBuf,
    socket_path: String,
}

/// Arguments for constructing a new session, mirroring the execution-state
/// record the orchestrator fetches from the catalog (§4.F step 2).
pub struct SessionInit {
    pub id: String,
    pub skillset_path: String,
    pub skill_name: String,
    pub view_id: String,
    pub view: ViewDefinition,
    pub tenant: String,
    pub catalog: String,
    pub variant: String,
    pub namespace: String,
    pub session_variables: Map<String, Value>,
    pub input_args: Map<String, Value>,
    pub auth: BearerAuth,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        init: SessionInit,
        bus: EventBus,
        log_writer: Arc<HashChainWriter>,
        log_path: std::path::PathBuf,
        catalog_client: Arc<CatalogClient>,
        call_graph_max_depth: usize,
        runner_defaults: RunnerDefaults,
        scripts_root: std::path::PathBuf,
        socket_path: String,
    ) -> Self {
        Self {
            id: init.id,
            skillset_path: init.skillset_path,
            skill_name: init.skill_name,
            view_id: init.view_id,
            tenant: init.tenant,
            catalog: init.catalog,
            variant: init.variant,
            namespace: init.namespace,
            session_variables: init.session_variables,
            input_args: init.input_args,
            view: init.view,
            skillset: RwLock::new(None),
            auth: RwLock::new(init.auth),
            call_graph: CallGraph::new(call_graph_max_depth),
            invocation_map: RwLock::new(std::collections::HashMap::new()),
            bus,
            log_writer,
            log_path,
            audit_complete: Arc::new(tokio::sync::Notify::new()),
            audit_completed: AtomicBool::new(false),
            catalog_client,
            runner_defaults,
            scripts_root,
            socket_path,
        }
    }

    fn scope(&self) -> Scope {
        Scope {
            catalog: self.catalog.clone(),
            variant: self.variant.clone(),
            namespace: self.namespace.clone(),
        }
    }

    /// Publish a structured event onto both the bus (for the audit topic
    /// subscriber) and the hash-chained log (§4.B). The bus pump in the
    /// orchestrator is responsible for actually feeding the bus event into
    /// `log_writer`; `Session` only ever publishes — it never writes the
    /// chain directly, so every audit entry goes through one code path.
    async fn emit_audit(&self, kind: &str, mut fields: Value) {
        if let Value::Object(ref mut map) = fields {
            map.insert("event".into(), Value::String(kind.to_string()));
            map.insert("session_id".into(), Value::String(self.id.clone()));
        }
        self.bus.publish(Event::json(audit_topic(&self.id), fields)).await;
    }

    /// Emit the final `session_end` audit event (§4.F step 8: "Failures are
    /// surfaced as a final audit `session_end` event before the log is
    /// sealed"; S1 expects this entry on success too). Callers must emit
    /// this before cancelling the audit pump so it lands in the sealed
    /// chain.
    pub async fn emit_session_end(&self, status: &str, error: Option<String>) {
        TraceEvent::SessionEnd {
            session_id: self.id.clone(),
            status: status.to_string(),
        }
        .emit();
        self.emit_audit(
            "session_end",
            serde_json::json!({
                "status": status,
                "error": error,
            }),
        )
        .await;
    }

    /// Resolve the skillset document, fetching and caching it on first use
    /// (§4.E `fetchObjects`). The view definition is carried from session
    /// construction (execution state already decodes it); only the
    /// skillset is lazily resolved here.
    pub async fn fetch_objects(&self) -> Result<Skillset> {
        if let Some(existing) = self.skillset.read().clone() {
            return Ok(existing);
        }

        let auth = self.auth.read().clone();
        let value = self
            .catalog_client
            .request(
                RequestOptions::get(format!("skillsets/{}", self.skillset_path)),
                Some(&auth),
            )
            .await
            .map_err(|e| Error::UnableToGetSkillset(e.to_string()))?;

        let skillset: Skillset = serde_json::from_value(value)
            .map_err(|e| Error::UnableToGetSkillset(format!("decoding skillset document: {e}")))?;

        *self.skillset.write() = Some(skillset.clone());
        Ok(skillset)
    }

    /// Factored out for reuse: evaluate whether the active view authorizes
    /// a skill's exported actions on its resource path (§4.E step 4).
    pub fn validate_run_policy(&self, skill: &Skill) -> PolicyDecision {
        are_actions_allowed_on_resource(&self.view, &self.scope(), skill)
    }

    /// Factored out for reuse: validate `input_args` against the skill's
    /// input JSON Schema (§4.E step 5).
    pub fn validate_input_for_skill(skill: &Skill, input_args: &Map<String, Value>) -> Result<()> {
        let compiled = jsonschema::JSONSchema::compile(&skill.input_schema)
            .map_err(|e| Error::InvalidParams(format!("invalid input schema: {e}")))?;

        let instance = Value::Object(input_args.clone());
        if let Err(errors) = compiled.validate(&instance) {
            let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Err(Error::InvalidParams(messages.join("; ")));
        }
        Ok(())
    }

    /// The central operation (§4.E `Run`): assigns an invocation id,
    /// evaluates policy, validates input, runs the skill, and emits every
    /// audit event along the way.
    pub async fn run(
        &self,
        ctx: CancellationToken,
        invoker_id: &str,
        skill_name: &str,
        input_args: Map<String, Value>,
        extra_writers: Vec<Arc<dyn tangent_runner::OutputWriter>>,
    ) -> Result<RunOutcome> {
        let invocation_id = uuid::Uuid::new_v4().to_string();

        TraceEvent::SkillStart {
            session_id: self.id.clone(),
            invocation_id: invocation_id.clone(),
            invoker_id: invoker_id.to_string(),
            skill_name: skill_name.to_string(),
        }
        .emit();
        self.emit_audit(
            "skill_start",
            serde_json::json!({
                "invocation_id": invocation_id,
                "invoker_id": invoker_id,
                "skill_name": skill_name,
            }),
        )
        .await;

        if !invoker_id.is_empty() && !self.invocation_map.read().contains_key(invoker_id) {
            return Err(Error::InvalidInvocationId(invoker_id.to_string()));
        }

        let skillset = self.fetch_objects().await?;
        let skill = skillset
            .find(skill_name)
            .cloned()
            .ok_or_else(|| Error::BadRequest(format!("unknown skill: {skill_name}")))?;

        let decision = self.validate_run_policy(&skill);
        TraceEvent::PolicyDecision {
            session_id: self.id.clone(),
            invocation_id: invocation_id.clone(),
            skill_name: skill_name.to_string(),
            decision: if decision.allowed { "allowed" } else { "blocked" }.to_string(),
            actions: decision.actions.clone(),
        }
        .emit();
        self.emit_audit(
            "policy_decision",
            serde_json::json!({
                "invocation_id": invocation_id,
                "skill_name": skill_name,
                "decision": if decision.allowed { "allowed" } else { "blocked" },
                "basis": decision.basis,
                "actions": decision.actions,
            }),
        )
        .await;

        if !decision.allowed {
            TraceEvent::SkillEnd {
                session_id: self.id.clone(),
                invocation_id: invocation_id.clone(),
                skill_name: skill_name.to_string(),
                status: "failed".to_string(),
                error: Some("blocked by policy".to_string()),
            }
            .emit();
            self.emit_audit(
                "skill_end",
                serde_json::json!({
                    "invocation_id": invocation_id,
                    "skill_name": skill_name,
                    "status": "failed",
                    "error": "blocked by policy",
                }),
            )
            .await;
            return Err(Error::BlockedByPolicy(skill_name.to_string()));
        }

        if let Err(e) = Self::validate_input_for_skill(&skill, &input_args) {
            TraceEvent::SkillEnd {
                session_id: self.id.clone(),
                invocation_id: invocation_id.clone(),
                skill_name: skill_name.to_string(),
                status: "failed".to_string(),
                error: Some(e.to_string()),
            }
            .emit();
            self.emit_audit(
                "skill_end",
                serde_json::json!({
                    "invocation_id": invocation_id,
                    "skill_name": skill_name,
                    "status": "failed",
                    "error": e.to_string(),
                }),
            )
            .await;
            return Err(e);
        }

        if let Err(e) = self.call_graph.register_call(invoker_id, skill_name, &invocation_id) {
            TraceEvent::CallGraphRejected {
                session_id: self.id.clone(),
                invocation_id: invocation_id.clone(),
                reason: e.to_string(),
            }
            .emit();
            return Err(Error::ToolGraphError(e.to_string()));
        }
        self.invocation_map
            .write()
            .insert(invocation_id.clone(), self.view.clone());

        let runner = self.build_runner(&skill)?;
        let topic = if invoker_id.is_empty() {
            session_log_topic(&self.id)
        } else {
            interactive_log_topic(&self.id)
        };
        let capture = Arc::new(CapturingWriter::new());
        let mut writers: Vec<Arc<dyn tangent_runner::OutputWriter>> = vec![
            Arc::new(BusWriter::new(
                self.bus.clone(),
                topic,
                self.id.clone(),
                skill_name.to_string(),
                skill.runner.runner_id.clone(),
            )),
            capture.clone(),
        ];
        writers.extend(extra_writers);
        runner.add_writers(writers);

        TraceEvent::RunnerStart {
            session_id: self.id.clone(),
            invocation_id: invocation_id.clone(),
            runner_id: skill.runner.runner_id.clone(),
        }
        .emit();
        self.emit_audit(
            "runner_start",
            serde_json::json!({
                "invocation_id": invocation_id,
                "runner_id": skill.runner.runner_id,
            }),
        )
        .await;

        let run_args = RunArgs {
            invocation_id: invocation_id.clone(),
            service_endpoint: self.socket_path.clone(),
            run_mode: RunMode::Interactive,
            session_id: self.id.clone(),
            skill_name: skill_name.to_string(),
            input_args,
            session_variables: self.session_variables.clone(),
        };
        let run_ctx = RunContext {
            cancellation: ctx,
            session_id: self.id.clone(),
            invocation_id: invocation_id.clone(),
        };

        let started = std::time::Instant::now();
        let result = runner.run(run_ctx, run_args).await;
        // Grace period after completion to let the bus drain (§4.E step 9,
        // §5 ~100ms).
        tokio::time::sleep(Duration::from_millis(100)).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let (status, error_message) = match &result {
            Ok(()) => ("success", None),
            Err(e) => ("failed", Some(e.to_string())),
        };

        TraceEvent::RunnerCompleted {
            session_id: self.id.clone(),
            invocation_id: invocation_id.clone(),
            runner_id: skill.runner.runner_id.clone(),
            exit_code: None,
            duration_ms,
        }
        .emit();
        self.emit_audit(
            "runner_completed",
            serde_json::json!({
                "invocation_id": invocation_id,
                "runner_id": skill.runner.runner_id,
                "status": status,
                "duration_ms": duration_ms,
                "error": error_message,
            }),
        )
        .await;
        TraceEvent::SkillEnd {
            session_id: self.id.clone(),
            invocation_id: invocation_id.clone(),
            skill_name: skill_name.to_string(),
            status: status.to_string(),
            error: error_message.clone(),
        }
        .emit();
        self.emit_audit(
            "skill_end",
            serde_json::json!({
                "invocation_id": invocation_id,
                "skill_name": skill_name,
                "status": status,
                "error": error_message,
            }),
        )
        .await;

        match result {
            Ok(()) => Ok(RunOutcome {
                invocation_id,
                output: Value::String(capture.take_text()),
            }),
            Err(e) => Err(e),
        }
    }

    fn build_runner(&self, skill: &Skill) -> Result<Arc<dyn Runner>> {
        let config: StdioRunnerConfig = serde_json::from_value(Value::Object(
            skill.runner.config.clone().into_iter().collect(),
        ))
        .map_err(|e| Error::InvalidObject(format!("invalid runner config: {e}")))?;

        Ok(Arc::new(StdioRunner::new(
            skill.runner.runner_id.clone(),
            config,
            self.scripts_root.clone(),
            &self.runner_defaults,
        )))
    }

    /// Look up the view definition snapshot recorded for an invocation id,
    /// used by the skill-service endpoint's tool-catalogue/context reads.
    pub fn invocation_view(&self, invocation_id: &str) -> Option<ViewDefinition> {
        self.invocation_map.read().get(invocation_id).cloned()
    }

    pub fn skillset_snapshot(&self) -> Option<Skillset> {
        self.skillset.read().clone()
    }

    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    /// Signal that the audit-log pump has observed context cancellation and
    /// will write no further entries (§4.F step 5, §5 "Finalize runs
    /// strictly after Run returns").
    pub fn signal_audit_log_complete(&self) {
        if !self.audit_completed.swap(true, Ordering::AcqRel) {
            self.audit_complete.notify_waiters();
        }
    }

    /// Await the "audit-log complete" signal with a bounded cap, then seal
    /// the log and PUT the final execution state (§4.E `Finalize`).
    pub async fn finalize(&self, await_cap: Duration, run_err: Option<&Error>) -> Result<()> {
        if !self.audit_completed.load(Ordering::Acquire) {
            let _ = tokio::time::timeout(await_cap, self.audit_complete.notified()).await;
        }

        let entry_count = self.log_writer.entry_count();
        self.log_writer
            .close()
            .map_err(|e| Error::SessionError(format!("closing audit log: {e}")))?;
        TraceEvent::AuditLogSealed {
            session_id: self.id.clone(),
            entry_count,
        }
        .emit();

        let compressed = compress_and_encode(&self.log_path).ok();

        let status_summary = if run_err.is_some() { "failed" } else { "success" };
        let mut status = serde_json::json!({ "auditLog": compressed });
        if let Some(err) = run_err {
            status["error"] = Value::String(err.to_string());
        }

        let auth = self.auth.read().clone();
        self.catalog_client
            .request(
                RequestOptions::put(
                    "sessions/execution-state",
                    serde_json::json!({ "statusSummary": status_summary, "status": status }),
                ),
                Some(&auth),
            )
            .await
            .map_err(|e| Error::SessionError(format!("finalizing execution state: {e}")))?;

        Ok(())
    }
}

fn compress_and_encode(path: &std::path::Path) -> std::io::Result<String> {
    use std::io::Read;
    let mut raw = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut raw)?;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    std::io::Write::write_all(&mut encoder, &raw)?;
    let compressed = encoder.finish()?;
    use base64::Engine;
    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

/// Shared handle to a session, held by the registry and the skill-service
/// endpoint alike.
pub type SessionHandle = Arc<Session>;
