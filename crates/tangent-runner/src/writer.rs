//! Output sinks a runner fans stdout/stderr lines into (§4.D step 7).
//!
//! `tangent-session` supplies bus-backed writers tagged with
//! source/actor/runner/skill; callers of `Session::run` may add their own on
//! top. A runner never knows what's on the other end of a writer.

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[async_trait]
pub trait OutputWriter: Send + Sync {
    async fn write_line(&self, stream: OutputStream, line: &str);
}
