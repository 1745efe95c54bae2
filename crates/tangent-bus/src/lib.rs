pub mod bus;
pub mod log_chain;

pub use bus::{Event, EventBus, EventData, Subscription};
pub use log_chain::{AuditKeySource, HashChainWriter, LogEntry, StaticKey, VerifyError};
