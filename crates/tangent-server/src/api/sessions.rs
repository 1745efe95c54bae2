//! `POST /sessions` — the orchestrator's only entry point into a session
//! (§4.F). Exchanges an OAuth code for a token, fetches execution state,
//! registers the session, and streams ndjson chunks back to the caller
//! while the root skill runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use tangent_bus::EventData;
use tangent_catalog_client::{BearerAuth, RequestOptions};
use tangent_domain::Error;
use tangent_policy::ViewDefinition;
use tangent_session::{Session, SessionInit};

use crate::bootstrap::AppState;

/// `POST /sessions` body (§4.F: "Only interactive is supported").
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub code: String,
    #[serde(rename = "codeVerifier")]
    pub code_verifier: String,
    #[serde(default)]
    pub interactive: bool,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
    expiry: chrono::DateTime<chrono::Utc>,
}

/// The execution-state record fetched from the catalog (§4.F step 2).
#[derive(Debug, Deserialize)]
struct ExecutionState {
    #[serde(default)]
    session_id: Option<String>,
    skillset_path: String,
    skill_name: String,
    view_id: String,
    view: ViewDefinition,
    tenant: String,
    catalog: String,
    #[serde(default)]
    variant: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    session_variables: Map<String, Value>,
    #[serde(default)]
    input_args: Map<String, Value>,
}

fn error_response(err: Error) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(serde_json::json!({ "error": err.to_string(), "kind": err.kind() }))).into_response()
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> Response {
    if !body.interactive {
        return error_response(Error::BadRequest("only interactive sessions are supported".into()));
    }

    // Step 1: exchange (code, codeVerifier) for a token (§4.F step 1).
    let token_value = match state
        .catalog_client
        .request(
            RequestOptions::post("sessions/execution-state", Value::Null)
                .with_query("code", &body.code)
                .with_query("code_verifier", &body.code_verifier),
            None,
        )
        .await
    {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };
    let token_resp: TokenResponse = match serde_json::from_value(token_value) {
        Ok(t) => t,
        Err(e) => return error_response(Error::SessionError(format!("decoding token response: {e}"))),
    };

    let auth = BearerAuth {
        token: token_resp.token,
        expires_at: token_resp.expiry,
    };
    // S4: an expiry in the past fails before any session is registered and
    // before any log file is created.
    if auth.is_expired() {
        return error_response(Error::TokenExpired);
    }

    // Step 2: fetch the execution state with the freshly minted token.
    let exec_state_value = match state
        .catalog_client
        .request(RequestOptions::get("sessions/execution-state"), Some(&auth))
        .await
    {
        Ok(v) => v,
        Err(e) => return error_response(e),
    };
    let exec_state: ExecutionState = match serde_json::from_value(exec_state_value) {
        Ok(v) => v,
        Err(e) => return error_response(Error::SessionError(format!("decoding execution state: {e}"))),
    };

    let session_id = exec_state
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let log_path = state.audit_log_dir.join(format!("{session_id}.tlog"));
    let log_writer = match tangent_bus::HashChainWriter::open(
        &log_path,
        state.audit_key.as_ref(),
        state.audit_flush_buffer_size,
    ) {
        Ok(w) => Arc::new(w),
        Err(e) => return error_response(Error::SessionError(format!("opening audit log: {e}"))),
    };

    // Step 3: create and register the session.
    let session = Arc::new(Session::new(
        SessionInit {
            id: session_id.clone(),
            skillset_path: exec_state.skillset_path,
            skill_name: exec_state.skill_name.clone(),
            view_id: exec_state.view_id,
            view: exec_state.view,
            tenant: exec_state.tenant,
            catalog: exec_state.catalog,
            variant: exec_state.variant,
            namespace: exec_state.namespace,
            session_variables: exec_state.session_variables,
            input_args: exec_state.input_args.clone(),
            auth,
        },
        state.bus.clone(),
        log_writer.clone(),
        log_path,
        state.catalog_client.clone(),
        state.call_graph_max_depth,
        state.runner_defaults.clone(),
        state.scripts_root.clone(),
        state.socket_path.clone(),
    ));

    if let Err(e) = state.registry.create_session(session.clone()) {
        return error_response(e);
    }
    tracing::info!(session_id = %session_id, skill = %exec_state.skill_name, "session created");

    // Steps 4-8: respond with a chunked ndjson stream and drive the run
    // behind it.
    let stream = run_and_stream(state, session, exec_state.skill_name, exec_state.input_args, log_writer);

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/x-ndjson")
        .header("transfer-encoding", "chunked")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| error_response(Error::SessionError("building response".into())))
}

fn line_bytes(v: &Value) -> Bytes {
    let mut s = serde_json::to_string(v).unwrap_or_default();
    s.push('\n');
    Bytes::from(s)
}

/// Drive the session's root `Run`, multiplexing its session/interactive
/// log topics onto the ndjson response while a separate, independently
/// cancelled pump feeds the audit topic into the hash-chained log (§4.F
/// steps 5-8, §5 "a separate context is used for audit finalization").
fn run_and_stream(
    state: AppState,
    session: Arc<Session>,
    skill_name: String,
    input_args: Map<String, Value>,
    log_writer: Arc<tangent_bus::HashChainWriter>,
) -> impl futures_core::Stream<Item = Result<Bytes, std::convert::Infallible>> {
    async_stream::stream! {
        let session_id = session.id.clone();

        let audit_cancel = CancellationToken::new();
        let (mut audit_rx, audit_sub) = state
            .bus
            .subscribe(format!("session.{session_id}.audit.log"), 256);
        let audit_task = {
            let audit_cancel = audit_cancel.clone();
            let session_for_audit = session.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        // Prefer draining a pending event over honoring
                        // cancellation: the `session_end` entry is
                        // published right before `audit_cancel.cancel()`
                        // and must land in the chain before it is sealed.
                        biased;
                        event = audit_rx.recv() => match event {
                            Some(ev) => {
                                if let EventData::Json(payload) = ev.data {
                                    if let Err(e) = log_writer.add_entry(payload) {
                                        tracing::error!(session_id = %session_for_audit.id, error = %e, "audit log append failed");
                                    }
                                }
                            }
                            None => break,
                        },
                        _ = audit_cancel.cancelled() => break,
                    }
                }
                // Mop up anything already buffered by the time cancellation
                // was observed.
                while let Ok(ev) = audit_rx.try_recv() {
                    if let EventData::Json(payload) = ev.data {
                        if let Err(e) = log_writer.add_entry(payload) {
                            tracing::error!(session_id = %session_for_audit.id, error = %e, "audit log append failed");
                        }
                    }
                }
                session_for_audit.signal_audit_log_complete();
            })
        };

        let (mut log_rx, log_sub) = state
            .bus
            .subscribe(format!("session.{session_id}.session.log"), 256);
        let (mut interactive_rx, interactive_sub) = state
            .bus
            .subscribe(format!("session.{session_id}.interactive.log"), 256);

        let run_session = session.clone();
        let (run_done_tx, mut run_done_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let result = run_session
                .run(CancellationToken::new(), "", &skill_name, input_args, Vec::new())
                .await;
            let _ = run_done_tx.send(result);
        });

        let mut run_result = None;
        loop {
            tokio::select! {
                biased;
                result = &mut run_done_rx, if run_result.is_none() => {
                    run_result = Some(result.unwrap_or_else(|_| {
                        Err(Error::SessionError("run task ended unexpectedly".into()))
                    }));
                }
                event = log_rx.recv() => {
                    if let Some(ev) = event {
                        if let EventData::Json(v) = ev.data { yield Ok(line_bytes(&v)); }
                    }
                }
                event = interactive_rx.recv() => {
                    if let Some(ev) = event {
                        if let EventData::Json(v) = ev.data { yield Ok(line_bytes(&v)); }
                    }
                }
            }

            if run_result.is_some() {
                while let Ok(ev) = log_rx.try_recv() {
                    if let EventData::Json(v) = ev.data { yield Ok(line_bytes(&v)); }
                }
                while let Ok(ev) = interactive_rx.try_recv() {
                    if let EventData::Json(v) = ev.data { yield Ok(line_bytes(&v)); }
                }
                break;
            }
        }

        log_sub.unsubscribe();
        interactive_sub.unsubscribe();

        let run_err = run_result.unwrap();
        if let Err(e) = &run_err {
            yield Ok(line_bytes(&serde_json::json!({
                "session_id": session_id,
                "skill": "",
                "source": "system",
                "message": format!("session run failed: {e}"),
                "time_ms": chrono::Utc::now().timestamp_millis(),
                "runner": "",
            })));
        }

        // §4.F step 8: a final `session_end` audit entry, committed to the
        // chain before it is sealed below.
        let (session_end_status, session_end_error) = match &run_err {
            Ok(_) => ("success", None),
            Err(e) => ("failed", Some(e.to_string())),
        };
        session.emit_session_end(session_end_status, session_end_error).await;

        // A separate context for finalization: cancelling the audit pump
        // here, after Run has returned, does not truncate anything the
        // client was streaming.
        audit_cancel.cancel();
        let _ = audit_task.await;
        audit_sub.unsubscribe();

        let await_cap = Duration::from_millis(state.audit_finalize_await_ms);
        if let Err(e) = session.finalize(await_cap, run_err.as_ref().err()).await {
            tracing::error!(session_id = %session_id, error = %e, "finalize failed");
        }

        state.registry.delete_session(&session_id);
    }
}
