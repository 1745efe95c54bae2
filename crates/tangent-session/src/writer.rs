//! Bus-backed output writer: fans a runner's stdout/stderr lines onto the
//! event bus, tagged with source/actor/runner/skill (§4.E step 6, §6 ndjson
//! chunk schema).

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use tangent_bus::bus::{Event, EventBus};
use tangent_runner::{OutputStream, OutputWriter};

/// Publishes each line as a structured event matching the orchestrator's
/// ndjson chunk shape: `{session_id, skill, source, message, time_ms,
/// runner}`.
pub struct BusWriter {
    bus: EventBus,
    topic: String,
    session_id: String,
    skill_name: String,
    runner_id: String,
}

impl BusWriter {
    pub fn new(
        bus: EventBus,
        topic: impl Into<String>,
        session_id: impl Into<String>,
        skill_name: impl Into<String>,
        runner_id: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            topic: topic.into(),
            session_id: session_id.into(),
            skill_name: skill_name.into(),
            runner_id: runner_id.into(),
        }
    }
}

#[async_trait]
impl OutputWriter for BusWriter {
    async fn write_line(&self, stream: OutputStream, line: &str) {
        let source = match stream {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        };
        let time_ms = chrono::Utc::now().timestamp_millis();
        let event = Event::json(
            self.topic.clone(),
            serde_json::json!({
                "session_id": self.session_id,
                "skill": self.skill_name,
                "source": source,
                "message": line,
                "time_ms": time_ms,
                "runner": self.runner_id,
            }),
        );
        self.bus.publish(event).await;
    }
}

/// Accumulates stdout lines for one invocation so the skill-service
/// endpoint can return the invocation's output (§4.G: "the endpoint
/// encodes the session's stdout as a text value"). Stderr lines are
/// dropped — only stdout is part of an invocation's return value.
#[derive(Default)]
pub struct CapturingWriter {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CapturingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the captured stdout lines with newlines.
    pub fn take_text(&self) -> String {
        self.lines.lock().join("\n")
    }
}

#[async_trait]
impl OutputWriter for CapturingWriter {
    async fn write_line(&self, stream: OutputStream, line: &str) {
        if stream == OutputStream::Stdout {
            self.lines.lock().push(line.to_string());
        }
    }
}
