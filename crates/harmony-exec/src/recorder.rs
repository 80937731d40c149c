//! Tool-call recorder (C7, §4.6): decorates a [`ToolService`] to capture a
//! trace of every invocation. Grounded in the teacher's `HookEngine::emit_after`
//! idiom of "run, time, log, never swallow the original error".

use std::time::Instant;

use async_trait::async_trait;
use harmony_core::{ToolError, ToolService};
use serde_json::Value;
use tracing::{debug, warn};

/// One recorded tool invocation.
#[derive(Debug, Clone)]
pub struct ToolTrace {
    pub recipient: String,
    pub args: Value,
    pub started_at_ms: u64,
    pub completed_at_ms: u64,
    pub succeeded: bool,
    pub result: Option<Value>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl ToolTrace {
    pub fn duration_ms(&self) -> u64 {
        self.completed_at_ms.saturating_sub(self.started_at_ms)
    }
}

/// Receives each completed trace as it happens. The session service uses
/// this to attach artifacts and transcript lines without the recorder
/// knowing anything about sessions.
pub trait TraceSink: Send + Sync {
    fn record(&self, trace: ToolTrace);
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Wraps a [`ToolService`], forwarding every call to `inner` while recording
/// a [`ToolTrace`] to `sink`. Errors are recorded then re-raised unchanged —
/// the decorator never swallows a failure.
pub struct RecordingToolService<'a> {
    inner: &'a dyn ToolService,
    sink: &'a dyn TraceSink,
}

impl<'a> RecordingToolService<'a> {
    pub fn new(inner: &'a dyn ToolService, sink: &'a dyn TraceSink) -> Self {
        Self { inner, sink }
    }
}

#[async_trait]
impl<'a> ToolService for RecordingToolService<'a> {
    async fn invoke(&self, recipient: &str, args: &Value) -> Result<Value, ToolError> {
        let started_at_ms = now_ms();
        let t = Instant::now();
        let result = self.inner.invoke(recipient, args).await;
        let completed_at_ms = started_at_ms + t.elapsed().as_millis() as u64;

        match &result {
            Ok(value) => {
                debug!(recipient, duration_ms = t.elapsed().as_millis() as u64, "tool call succeeded");
                self.sink.record(ToolTrace {
                    recipient: recipient.to_string(),
                    args: args.clone(),
                    started_at_ms,
                    completed_at_ms,
                    succeeded: true,
                    result: Some(value.clone()),
                    error_kind: None,
                    error_message: None,
                });
            }
            Err(err) => {
                warn!(recipient, error = %err, "tool call failed");
                self.sink.record(ToolTrace {
                    recipient: recipient.to_string(),
                    args: args.clone(),
                    started_at_ms,
                    completed_at_ms,
                    succeeded: false,
                    result: None,
                    error_kind: Some("ToolInvocationFailed".to_string()),
                    error_message: Some(err.0.clone()),
                });
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct EchoTool;

    #[async_trait]
    impl ToolService for EchoTool {
        async fn invoke(&self, recipient: &str, args: &Value) -> Result<Value, ToolError> {
            if recipient == "demo.fail" {
                return Err(ToolError("boom".to_string()));
            }
            Ok(args.clone())
        }
    }

    struct CapturingSink {
        traces: Mutex<Vec<ToolTrace>>,
    }

    impl TraceSink for CapturingSink {
        fn record(&self, trace: ToolTrace) {
            self.traces.lock().unwrap().push(trace);
        }
    }

    #[tokio::test]
    async fn records_success_trace_and_forwards_result() {
        let tool = EchoTool;
        let sink = CapturingSink { traces: Mutex::new(Vec::new()) };
        let recording = RecordingToolService::new(&tool, &sink);
        let result = recording.invoke("demo.echo", &serde_json::json!({"text": "hi"})).await.unwrap();
        assert_eq!(result, serde_json::json!({"text": "hi"}));
        let traces = sink.traces.lock().unwrap();
        assert_eq!(traces.len(), 1);
        assert!(traces[0].succeeded);
        assert_eq!(traces[0].recipient, "demo.echo");
    }

    #[tokio::test]
    async fn records_and_reraises_failure() {
        let tool = EchoTool;
        let sink = CapturingSink { traces: Mutex::new(Vec::new()) };
        let recording = RecordingToolService::new(&tool, &sink);
        let err = recording.invoke("demo.fail", &serde_json::json!({})).await.unwrap_err();
        assert_eq!(err.0, "boom");
        let traces = sink.traces.lock().unwrap();
        assert_eq!(traces.len(), 1);
        assert!(!traces[0].succeeded);
        assert_eq!(traces[0].error_message.as_deref(), Some("boom"));
    }
}
