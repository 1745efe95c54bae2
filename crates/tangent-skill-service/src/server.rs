//! Unix-domain-socket local RPC endpoint (§4.G).
//!
//! Serves three operations over a process-local socket that a running
//! skill uses to re-enter its session: invoke a sub-skill, list the
//! skillset as LLM tool descriptors, and read a context value. Grounded
//! on the daemon lifecycle idiom elsewhere in this pack (unlink-then-bind
//! a `tokio::net::UnixListener`, socket file/directory permissions) and on
//! `sa_gateway`'s axum `Router`/`AppState` construction, retargeted onto a
//! Unix socket via `axum::serve`'s generic `Listener` support instead of a
//! TCP listener.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;

use tangent_domain::{Error, Result};
use tangent_session::SessionRegistry;

use crate::protocol::{
    ContextQuery, ContextValue, InvokeSkillRequest, InvokeSkillResponse, RpcError, ToolDescriptor,
    ToolsQuery, ToolsResponse,
};

#[derive(Clone)]
pub struct SkillServiceState {
    pub registry: Arc<SessionRegistry>,
}

/// Map a domain error onto its JSON response, the same inline
/// match-and-respond idiom the rest of this pack's axum handlers use
/// rather than a blanket `IntoResponse` impl (which domain errors, defined
/// outside this crate, can't carry across the crate boundary).
fn error_response(err: Error) -> axum::response::Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = RpcError {
        error: err.to_string(),
        kind: err.kind(),
    };
    (status, Json(body)).into_response()
}

pub fn router(state: SkillServiceState) -> Router {
    Router::new()
        .route("/skill-invocations", post(invoke_skill))
        .route("/tools", get(get_tools))
        .route("/context", get(get_context))
        .with_state(state)
}

async fn invoke_skill(
    State(state): State<SkillServiceState>,
    Json(req): Json<InvokeSkillRequest>,
) -> axum::response::Response {
    if req.invocation_id.is_empty() {
        return error_response(Error::InvalidInvocationId("invocation_id is required".into()));
    }

    let session = match state.registry.get_session(&req.session_id) {
        Some(s) => s,
        None => return error_response(Error::InvalidSession(req.session_id.clone())),
    };

    let outcome = match session
        .run(
            CancellationToken::new(),
            &req.invocation_id,
            &req.skill_name,
            req.args,
            Vec::new(),
        )
        .await
    {
        Ok(o) => o,
        Err(e) => return error_response(e),
    };

    let text = outcome.output.as_str().unwrap_or_default().to_string();
    Json(InvokeSkillResponse {
        invocation_id: outcome.invocation_id,
        output: ContextValue::from_text(text),
    })
    .into_response()
}

async fn get_tools(
    State(state): State<SkillServiceState>,
    Query(q): Query<ToolsQuery>,
) -> axum::response::Response {
    let session = match state.registry.get_session(&q.session_id) {
        Some(s) => s,
        None => return error_response(Error::InvalidSession(q.session_id.clone())),
    };

    let skillset = match session.fetch_objects().await {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };

    let tools = skillset
        .skills
        .into_iter()
        .map(|s| ToolDescriptor {
            name: s.name,
            description: s.description,
            input_schema: s.input_schema,
            output_schema: s.output_schema,
        })
        .collect();

    Json(ToolsResponse { tools }).into_response()
}

async fn get_context(
    State(state): State<SkillServiceState>,
    Query(q): Query<ContextQuery>,
) -> axum::response::Response {
    let session = match state.registry.get_session(&q.session_id) {
        Some(s) => s,
        None => return error_response(Error::InvalidSession(q.session_id.clone())),
    };

    let value = match session
        .session_variables
        .get(&q.name)
        .or_else(|| session.input_args.get(&q.name))
        .cloned()
    {
        Some(v) => v,
        None => {
            return error_response(Error::BadRequest(format!(
                "no context value named \"{}\"",
                q.name
            )))
        }
    };

    let text = serde_json::to_string(&value).unwrap_or_default();

    Json(ContextValue::from_text(text)).into_response()
}

/// Ensure `dir` exists with mode `0700` (§4.G: "its directory 0700").
async fn ensure_socket_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).await?;
    }
    Ok(())
}

/// Bind the skill-service socket, unlinking any stale file left behind by
/// a previous run, and chmod it `0600` (§4.G).
async fn bind(socket_path: &Path) -> Result<tokio::net::UnixListener> {
    if let Some(dir) = socket_path.parent() {
        ensure_socket_dir(dir).await?;
    }
    if socket_path.exists() {
        tokio::fs::remove_file(socket_path).await?;
    }

    let listener = tokio::net::UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    Ok(listener)
}

/// Serve the skill-service endpoint until `shutdown` is cancelled, then
/// unlink the socket file (§4.G lifecycle: "5-second graceful shutdown
/// and socket unlink").
pub async fn serve(
    socket_path: PathBuf,
    state: SkillServiceState,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = bind(&socket_path).await?;
    tracing::info!(path = %socket_path.display(), "skill-service endpoint listening");

    let app = router(state);
    let shutdown_signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_signal.cancelled().await })
        .await?;

    let _ = tokio::fs::remove_file(&socket_path).await;
    tracing::info!(path = %socket_path.display(), "skill-service endpoint stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http_body_util::BodyExt;
    use serde_json::Map;
    use tower::ServiceExt;

    use tangent_bus::{EventBus, HashChainWriter, StaticKey};
    use tangent_catalog_client::{BearerAuth, CatalogClient};
    use tangent_domain::config::{CatalogConfig, RunnerConfig};
    use tangent_policy::{Intent, Rule, Scope, ViewDefinition};
    use tangent_session::{Session, SessionInit};

    use super::*;

    fn view() -> ViewDefinition {
        ViewDefinition {
            scope: Scope {
                catalog: "acme".into(),
                variant: String::new(),
                namespace: String::new(),
            },
            rules: vec![Rule {
                intent: Intent::Allow,
                actions: vec!["fs.read".into()],
                targets: vec!["**".into()],
            }],
        }
    }

    fn make_state(id: &str) -> SkillServiceState {
        let bus = EventBus::new(Duration::from_millis(100));
        let dir = tempfile::tempdir().unwrap();
        std::mem::forget(dir.path().to_path_buf());
        let log_path = dir.path().join("session.tlog");
        let writer = Arc::new(
            HashChainWriter::open(&log_path, &StaticKey::from_bytes(b"k".to_vec()), 8).unwrap(),
        );
        let client = Arc::new(CatalogClient::new(&CatalogConfig::default()).unwrap());
        let mut session_variables = Map::new();
        session_variables.insert("greeting".into(), serde_json::json!("hello"));

        let session = Arc::new(Session::new(
            SessionInit {
                id: id.to_string(),
                skillset_path: "acme/billing".into(),
                skill_name: "echo-skill".into(),
                view_id: "v1".into(),
                view: view(),
                tenant: "acme".into(),
                catalog: "acme".into(),
                variant: String::new(),
                namespace: String::new(),
                session_variables,
                input_args: Map::new(),
                auth: BearerAuth {
                    token: "tok".into(),
                    expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
                },
            },
            bus,
            writer,
            log_path,
            client,
            25,
            RunnerConfig::default(),
            dir.path().to_path_buf(),
            "/tmp/tangent.service".into(),
        ));

        let registry = Arc::new(SessionRegistry::new());
        registry.create_session(session).unwrap();
        SkillServiceState { registry }
    }

    #[tokio::test]
    async fn get_context_returns_session_variable() {
        let state = make_state("sess-1");
        let app = router(state);

        let request = axum::http::Request::builder()
            .method("GET")
            .uri("/context?session_id=sess-1&name=greeting")
            .body(axum::body::Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["text"], "\"hello\"");
    }

    #[tokio::test]
    async fn get_context_unknown_session_is_invalid_session() {
        let state = make_state("sess-1");
        let app = router(state);

        let request = axum::http::Request::builder()
            .method("GET")
            .uri("/context?session_id=missing&name=greeting")
            .body(axum::body::Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invoke_skill_requires_invocation_id() {
        let state = make_state("sess-1");
        let app = router(state);

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/skill-invocations")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(
                serde_json::json!({
                    "session_id": "sess-1",
                    "invocation_id": "",
                    "skill_name": "echo-skill",
                })
                .to_string(),
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
