//! Local skill-service endpoint (§4.G): a process-local Unix-domain-socket
//! HTTP surface that a running skill re-enters to invoke a sub-skill, list
//! its tools, or read a context value.

pub mod protocol;
pub mod server;

pub use protocol::{
    ContextQuery, ContextValue, InvokeSkillRequest, InvokeSkillResponse, RpcError, ToolDescriptor,
    ToolsQuery, ToolsResponse,
};
pub use server::{router, serve, SkillServiceState};
