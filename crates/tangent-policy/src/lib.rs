pub mod call_graph;
pub mod model;
pub mod policy;

pub use call_graph::{CallGraph, CallGraphError};
pub use model::*;
pub use policy::{are_actions_allowed_on_resource, PolicyDecision};
