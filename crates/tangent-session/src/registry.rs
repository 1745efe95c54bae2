//! Process-wide active-sessions registry (§4.H): a map from session id to
//! a shared [`Session`] handle. Grounded on `sa_sessions::store::SessionStore`'s
//! `RwLock<HashMap<...>>` shape and `sa_gateway::runtime::session_lock
//! ::SessionLockMap`'s `Default`/`new()` construction convention.

use std::collections::HashMap;

use parking_lot::RwLock;

use tangent_domain::trace::TraceEvent;
use tangent_domain::{Error, Result};

use crate::session::SessionHandle;

/// Process-wide mapping from session id to session. Mutations are guarded
/// by a single `RwLock`; `Session` itself guards its own interior fields,
/// so the registry lock is only ever held for the duration of a map op.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly constructed session. Fails if the id is empty or
    /// already present (§3 "Session-id is unique within the registry;
    /// double-create fails").
    pub fn create_session(&self, session: SessionHandle) -> Result<()> {
        if session.id.is_empty() {
            return Err(Error::InvalidSession("session id must not be empty".into()));
        }

        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.id) {
            TraceEvent::SessionAlreadyExists {
                session_id: session.id.clone(),
            }
            .emit();
            return Err(Error::SessionAlreadyExists(session.id.clone()));
        }

        TraceEvent::SessionCreated {
            session_id: session.id.clone(),
            skillset: session.skillset_path.clone(),
            skill: session.skill_name.clone(),
        }
        .emit();
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().get(id).cloned()
    }

    pub fn list_sessions(&self) -> Vec<SessionHandle> {
        self.sessions.read().values().cloned().collect()
    }

    /// Remove a session from the registry. Returns the removed handle, if
    /// any existed — the caller (orchestrator, after `Finalize`) is
    /// responsible for letting it drop.
    pub fn delete_session(&self, id: &str) -> Option<SessionHandle> {
        let removed = self.sessions.write().remove(id);
        if removed.is_some() {
            TraceEvent::SessionDeleted {
                session_id: id.to_string(),
            }
            .emit();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::Map;

    use tangent_bus::{EventBus, HashChainWriter, StaticKey};
    use tangent_catalog_client::{BearerAuth, CatalogClient};
    use tangent_domain::config::{CatalogConfig, RunnerConfig};
    use tangent_policy::{Intent, Rule, Scope, ViewDefinition};

    use crate::session::{Session, SessionInit};

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

    fn make_session(id: &str) -> SessionHandle {
        let bus = EventBus::new(Duration::from_millis(100));
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("session.tlog");
        let writer = Arc::new(
            HashChainWriter::open(&log_path, &StaticKey::from_bytes(b"k".to_vec()), 8).unwrap(),
        );
        let client = Arc::new(CatalogClient::new(&CatalogConfig::default()).unwrap());
        Arc::new(Session::new(
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
                session_variables: Map::new(),
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
        ))
    }

    #[test]
    fn create_then_get_round_trips() {
        let registry = SessionRegistry::new();
        let session = make_session("sess-1");
        registry.create_session(session).unwrap();
        assert!(registry.get_session("sess-1").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn double_create_fails() {
        let registry = SessionRegistry::new();
        registry.create_session(make_session("sess-1")).unwrap();
        let err = registry.create_session(make_session("sess-1")).unwrap_err();
        assert!(matches!(err, Error::SessionAlreadyExists(_)));
    }

    #[test]
    fn empty_id_is_rejected() {
        let registry = SessionRegistry::new();
        let err = registry.create_session(make_session("")).unwrap_err();
        assert!(matches!(err, Error::InvalidSession(_)));
    }

    #[test]
    fn delete_removes_from_registry() {
        let registry = SessionRegistry::new();
        registry.create_session(make_session("sess-1")).unwrap();
        assert!(registry.delete_session("sess-1").is_some());
        assert!(registry.get_session("sess-1").is_none());
        assert!(registry.delete_session("sess-1").is_none());
    }

    #[test]
    fn list_sessions_returns_all() {
        let registry = SessionRegistry::new();
        registry.create_session(make_session("sess-1")).unwrap();
        registry.create_session(make_session("sess-2")).unwrap();
        assert_eq!(registry.list_sessions().len(), 2);
    }
}
