//! The `Session` object (§4.E) and the active-sessions registry (§4.H),
//! composing `tangent-policy`, `tangent-bus`, `tangent-runner`, and
//! `tangent-catalog-client`.

pub mod registry;
pub mod session;
pub mod writer;

pub use registry::SessionRegistry;
pub use session::{RunOutcome, Session, SessionHandle, SessionInit};
pub use writer::{BusWriter, CapturingWriter};
