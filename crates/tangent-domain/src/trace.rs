use serde::Serialize;

/// Structured trace events emitted across all Tangent crates via
/// `tracing`. Distinct from the on-disk hash-chained audit log
/// (`tangent_bus::log_chain`) — this is the operator-facing structured
/// log, not the tamper-evident external record.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_id: String,
        skillset: String,
        skill: String,
    },
    SessionAlreadyExists {
        session_id: String,
    },
    SessionDeleted {
        session_id: String,
    },
    SkillStart {
        session_id: String,
        invocation_id: String,
        invoker_id: String,
        skill_name: String,
    },
    PolicyDecision {
        session_id: String,
        invocation_id: String,
        skill_name: String,
        decision: String,
        actions: Vec<String>,
    },
    SkillEnd {
        session_id: String,
        invocation_id: String,
        skill_name: String,
        status: String,
        error: Option<String>,
    },
    RunnerStart {
        session_id: String,
        invocation_id: String,
        runner_id: String,
    },
    RunnerCompleted {
        session_id: String,
        invocation_id: String,
        runner_id: String,
        exit_code: Option<i32>,
        duration_ms: u64,
    },
    CallGraphRejected {
        session_id: String,
        invocation_id: String,
        reason: String,
    },
    SessionEnd {
        session_id: String,
        status: String,
    },
    AuditLogSealed {
        session_id: String,
        entry_count: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "tangent_event");
    }
}
