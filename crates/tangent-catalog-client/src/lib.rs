//! HTTP client for the catalog/control-plane service (§4.I).
//!
//! The orchestrator is the only caller; this crate knows nothing about
//! sessions, only how to sign and send requests against the catalog's REST
//! surface and how to read back a streamed body.

mod client;

pub use client::{BearerAuth, CatalogClient, RequestOptions, StreamBody};
