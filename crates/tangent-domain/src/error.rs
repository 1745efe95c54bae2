/// Shared error type used across all Tangent crates.
///
/// Each variant corresponds to one error kind in the external contract; the
/// kind name (`invalid-session`, `blocked-by-policy`, ...) is what the
/// orchestrator's HTTP and skill-service RPC layers render to callers.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("session already exists: {0}")]
    SessionAlreadyExists(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid invocation id: {0}")]
    InvalidInvocationId(String),

    #[error("tool graph error: {0}")]
    ToolGraphError(String),

    #[error("blocked by policy: {0}")]
    BlockedByPolicy(String),

    #[error("token required")]
    TokenRequired,

    #[error("token expired")]
    TokenExpired,

    #[error("failed request to catalog: {0}")]
    FailedRequestToCatalog(String),

    #[error("unable to get skillset: {0}")]
    UnableToGetSkillset(String),

    #[error("unable to get view definition: {0}")]
    UnableToGetViewDefinition(String),

    #[error("invalid object: {0}")]
    InvalidObject(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("session error: {0}")]
    SessionError(String),
}

impl Error {
    /// The kind string carried in error responses, e.g. `"blocked-by-policy"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io-error",
            Error::Json(_) => "invalid-object",
            Error::InvalidSession(_) => "invalid-session",
            Error::SessionAlreadyExists(_) => "session-already-exists",
            Error::BadRequest(_) => "bad-request",
            Error::InvalidParams(_) => "invalid-params",
            Error::UnknownMethod(_) => "unknown-method",
            Error::InvalidInvocationId(_) => "invalid-invocation-id",
            Error::ToolGraphError(_) => "tool-graph-error",
            Error::BlockedByPolicy(_) => "blocked-by-policy",
            Error::TokenRequired => "token-required",
            Error::TokenExpired => "token-expired",
            Error::FailedRequestToCatalog(_) => "failed-request-to-catalog",
            Error::UnableToGetSkillset(_) => "unable-to-get-skillset",
            Error::UnableToGetViewDefinition(_) => "unable-to-get-view-definition",
            Error::InvalidObject(_) => "invalid-object",
            Error::ExecutionFailed(_) => "execution-failed",
            Error::SessionError(_) => "session-error",
        }
    }

    /// HTTP status code for the orchestrator's REST surface and the
    /// skill-service RPC error envelope.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Io(_) => 500,
            Error::Json(_) | Error::InvalidObject(_) => 400,
            Error::InvalidSession(_) => 404,
            Error::SessionAlreadyExists(_) => 409,
            Error::BadRequest(_) | Error::InvalidParams(_) => 400,
            Error::UnknownMethod(_) => 404,
            Error::InvalidInvocationId(_) => 400,
            Error::ToolGraphError(_) => 400,
            Error::BlockedByPolicy(_) => 403,
            Error::TokenRequired => 401,
            Error::TokenExpired => 401,
            Error::FailedRequestToCatalog(_) => 502,
            Error::UnableToGetSkillset(_) => 502,
            Error::UnableToGetViewDefinition(_) => 502,
            Error::ExecutionFailed(_) => 500,
            Error::SessionError(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
