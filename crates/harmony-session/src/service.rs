//! Session service (C9, §4.8): the driving algorithm for one executed
//! message, composed from the lock provider, stores, preflight analyzer,
//! step interpreter, and tool-call recorder.

use std::sync::{Arc, Mutex};

use harmony_core::{
    default_chat_filter, ChatHistoryEntry, ChatService, Envelope, SchemaValidator, Script, ScriptId,
    StructuralValidator, ToolAvailability, ToolService,
};
use harmony_eval::EvalContext;
use harmony_exec::{
    normalize_role, preflight_blocked_summary, run_preflight, run_script, tool_summary,
    RecordingToolService, ToolTrace, TraceSink,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::dto::{
    ExecuteResponse, HistoryItemResponse, HistoryResponse, PageRequest, SessionListResponse,
    StatusResponse,
};
use crate::error::{Result, SessionError};
use crate::model::{
    Artifact, ArtifactContentType, ChatEntry, MessageExecutionRecord, RecordStatus, Session, SessionId,
    SessionStatus, StructuredError,
};
use crate::store::{encode_continuation_token, parse_continuation_token, ScriptStore, SessionIndexStore, SessionStore};

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Composition of the five collaborator/store dependencies the session
/// service needs; trait objects, matching the engine's DI seams (§6).
pub struct SessionService {
    scripts: Arc<dyn ScriptStore>,
    sessions: Arc<dyn SessionStore>,
    index: Arc<dyn SessionIndexStore>,
    locks: Arc<crate::lock::LockProvider>,
    availability: Arc<dyn ToolAvailability>,
    tools: Arc<dyn ToolService>,
    chat: Arc<dyn ChatService>,
}

/// Collects traces emitted mid-script so the service can attach them to the
/// record and session after the interpreter returns.
#[derive(Default)]
struct CollectingSink {
    traces: Mutex<Vec<ToolTrace>>,
}

impl TraceSink for CollectingSink {
    fn record(&self, trace: ToolTrace) {
        self.traces.lock().expect("trace sink poisoned").push(trace);
    }
}

impl SessionService {
    pub fn new(
        scripts: Arc<dyn ScriptStore>,
        sessions: Arc<dyn SessionStore>,
        index: Arc<dyn SessionIndexStore>,
        locks: Arc<crate::lock::LockProvider>,
        availability: Arc<dyn ToolAvailability>,
        tools: Arc<dyn ToolService>,
        chat: Arc<dyn ChatService>,
    ) -> Self {
        Self { scripts, sessions, index, locks, availability, tools, chat }
    }

    /// Runs the envelope (and any embedded harmony-script bodies) through
    /// the canonicalizer/validator before persisting — §2's `C2 → C3
    /// (validate) → stored` dataflow, and the §7 guarantee that
    /// `HRF_SCHEMA_*` errors are "returned synchronously from registration".
    pub async fn register_script(&self, script_id: ScriptId, envelope: Envelope) -> Result<()> {
        let validator = StructuralValidator;
        let canonical = harmony_core::to_canonical_json(&envelope);
        if let Some(err) = validator.validate_envelope(&canonical.to_string()) {
            return Err(SessionError::SchemaEnvelopeFailed(err.message));
        }
        for message in &envelope.messages {
            if message.content_type == harmony_core::ContentType::HarmonyScript {
                if let Some(err) = validator.validate_script(&message.content) {
                    return Err(SessionError::SchemaScriptFailed(err.message));
                }
            }
        }
        self.scripts.register(script_id, envelope).await
    }

    pub async fn start_session(&self, script_id: ScriptId) -> Result<Session> {
        self.scripts
            .get(&script_id)
            .await?
            .ok_or_else(|| SessionError::ScriptNotFound(script_id.to_string()))?;

        let session = Session::new(SessionId(new_id()), script_id.clone(), now());
        self.sessions.save(&session).await?;
        self.index.touch(&session.session_id, &script_id, &session.updated_at).await?;
        Ok(session)
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn execute_next(
        &self,
        session_id: &SessionId,
        execution_id: Option<String>,
    ) -> Result<ExecuteResponse> {
        self.execute(session_id, None, Value::Null, execution_id, None).await
    }

    #[instrument(skip(self, input), fields(session_id = %session_id, index))]
    pub async fn execute_message(
        &self,
        session_id: &SessionId,
        index: usize,
        input: Value,
        execution_id: Option<String>,
    ) -> Result<ExecuteResponse> {
        self.execute(session_id, Some(index), input, execution_id, None).await
    }

    /// Same as [`execute_next`](Self::execute_next), but aborts with
    /// [`SessionError::Cancelled`] if `cancel` fires before the lock is
    /// granted or before the mutated session would be persisted (§5's
    /// "must not persist if cancellation arrives before storeSave" rule).
    pub async fn execute_next_cancellable(
        &self,
        session_id: &SessionId,
        execution_id: Option<String>,
        cancel: CancellationToken,
    ) -> Result<ExecuteResponse> {
        self.execute(session_id, None, Value::Null, execution_id, Some(cancel)).await
    }

    /// Cancellable counterpart to [`execute_message`](Self::execute_message).
    pub async fn execute_message_cancellable(
        &self,
        session_id: &SessionId,
        index: usize,
        input: Value,
        execution_id: Option<String>,
        cancel: CancellationToken,
    ) -> Result<ExecuteResponse> {
        self.execute(session_id, Some(index), input, execution_id, Some(cancel)).await
    }

    async fn execute(
        &self,
        session_id: &SessionId,
        explicit_index: Option<usize>,
        input: Value,
        execution_id: Option<String>,
        cancel: Option<CancellationToken>,
    ) -> Result<ExecuteResponse> {
        let _guard = match self.locks.acquire_cancellable(session_id, cancel.as_ref()).await {
            Some(guard) => guard,
            None => return Err(SessionError::Cancelled),
        };

        if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(SessionError::Cancelled);
        }

        let mut session = self
            .sessions
            .load(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        let envelope = self
            .scripts
            .get(&session.script_id)
            .await?
            .ok_or_else(|| SessionError::ScriptNotFound(session.script_id.to_string()))?;

        if session.status.is_terminal() {
            let record = skipped_record(session.current_index, execution_id.clone());
            return self.finish(session, record, execution_id, cancel.clone()).await;
        }

        let i = match explicit_index {
            Some(i) => {
                if i >= envelope.messages.len() {
                    return Err(SessionError::IndexOutOfRange { index: i, len: envelope.messages.len() });
                }
                i
            }
            None => {
                if session.current_index >= envelope.messages.len() {
                    session.status = SessionStatus::Completed;
                    let record = skipped_record(session.current_index, execution_id.clone());
                    return self.finish(session, record, execution_id, cancel.clone()).await;
                }
                session.current_index
            }
        };

        if let Some(exec_id) = &execution_id {
            if let Some(&pos) = session.execution_id_index.get(exec_id) {
                if let Some(existing) = session.history.get(pos) {
                    if existing.index == i {
                        let record = existing.clone();
                        return Ok(project(&session, record.index, record));
                    }
                }
            }
        }

        let message = &envelope.messages[i];
        let started_at = now();

        let record = if message.content_type == harmony_core::ContentType::Text
            && message.termination.is_none()
            && message.content.is_string()
        {
            self.execute_context_only(&mut session, message, i, started_at.clone(), execution_id.clone())
        } else if message.content_type == harmony_core::ContentType::HarmonyScript {
            self.execute_harmony_script(&mut session, &envelope, message, i, started_at.clone(), execution_id.clone(), &input)
                .await
        } else {
            advance_skip(&mut session, i, started_at.clone(), execution_id.clone())
        };

        self.finish(session, record, execution_id, cancel).await
    }

    fn execute_context_only(
        &self,
        session: &mut Session,
        message: &harmony_core::Message,
        i: usize,
        started_at: String,
        execution_id: Option<String>,
    ) -> MessageExecutionRecord {
        let text = message.content.as_str().unwrap_or_default().to_string();
        let role = normalize_role(message.role.as_str());

        session.transcript.push(ChatEntry {
            role: role.clone(),
            content: text.clone(),
            timestamp: now(),
            source_index: Some(i),
        });

        let artifact = Artifact::new("message", ArtifactContentType::Text, Value::String(text), now());
        session.artifacts.insert(&artifact.name, artifact.clone());

        session.current_index = i + 1;
        if session.status == SessionStatus::Created {
            session.status = SessionStatus::Running;
        }

        MessageExecutionRecord {
            index: i,
            execution_id,
            status: RecordStatus::Succeeded,
            started_at,
            completed_at: Some(now()),
            inputs: Value::Null,
            outputs: vec![artifact],
            logs: Vec::new(),
            error: None,
        }
    }

    async fn execute_harmony_script(
        &self,
        session: &mut Session,
        envelope: &Envelope,
        message: &harmony_core::Message,
        i: usize,
        started_at: String,
        execution_id: Option<String>,
        input: &Value,
    ) -> MessageExecutionRecord {
        let preflight = run_preflight(envelope, self.availability.as_ref()).await;

        if !preflight.is_ready() {
            let summary = preflight_blocked_summary(preflight.missing_recipients.len());
            session.transcript.push(ChatEntry {
                role: "system".to_string(),
                content: summary,
                timestamp: now(),
                source_index: Some(i),
            });
            let artifact = Artifact::new(
                "preflight",
                ArtifactContentType::Preflight,
                serde_json::json!({
                    "requiredRecipients": preflight.required_recipients,
                    "missingRecipients": preflight.missing_recipients,
                    "isReady": false,
                }),
                now(),
            );
            session.artifacts.insert(&artifact.name, artifact.clone());
            session.status = SessionStatus::Blocked;
            session.current_index = i;
            return MessageExecutionRecord {
                index: i,
                execution_id,
                status: RecordStatus::Blocked,
                started_at,
                completed_at: Some(now()),
                inputs: input.clone(),
                outputs: vec![artifact],
                logs: Vec::new(),
                error: None,
            };
        }

        if !message.content.is_object() {
            warn!("message typed harmony-script carries no script body");
            session.status = SessionStatus::Failed;
            let err = harmony_exec::ExecutionError::MissingScript;
            return failed_record(i, started_at, err.code(), err.to_string(), execution_id);
        }

        let script = match Script::from_content(&message.content) {
            Ok(script) => script,
            Err(e) => {
                let err = harmony_exec::ExecutionError::decode_failed(e.to_string());
                warn!(error = %err, "harmony-script decode failed");
                session.status = SessionStatus::Failed;
                return failed_record(i, started_at, err.code(), err.to_string(), execution_id);
            }
        };

        let mut vars = session.vars.clone();
        for (k, v) in &script.vars {
            if vars.get(k).is_none() {
                vars.insert(k, v.clone());
            }
        }
        let input_map: harmony_core::CiMap<Value> = match input.as_object() {
            Some(obj) => obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => harmony_core::CiMap::new(),
        };
        let mut ctx = EvalContext::new(vars, input_map);

        let mut chat_history: Vec<ChatHistoryEntry> = session
            .transcript
            .iter()
            .filter(|entry| !entry.content.is_empty())
            .map(|entry| ChatHistoryEntry {
                role: entry.role.clone(),
                content: entry.content.clone(),
                channel: None,
                content_type: None,
                recipient: None,
                termination: None,
                source_index: entry.source_index,
            })
            .filter(default_chat_filter)
            .collect();

        let sink = CollectingSink::default();
        let recording = RecordingToolService::new(self.tools.as_ref(), &sink);

        let outcome = run_script(&script, &mut ctx, &mut chat_history, self.chat.as_ref(), &recording).await;

        let mut outputs = Vec::new();
        let mut logs = Vec::new();
        for trace in sink.traces.into_inner().expect("trace sink poisoned") {
            let summary = tool_summary(&trace.recipient, trace.succeeded, Some(trace.duration_ms()));
            session.transcript.push(ChatEntry {
                role: "system".to_string(),
                content: summary.clone(),
                timestamp: now(),
                source_index: Some(i),
            });
            logs.push(summary);
            let artifact = Artifact::new(
                format!("tool:{}", trace.recipient),
                ArtifactContentType::ToolTrace,
                serde_json::json!({
                    "recipient": trace.recipient,
                    "args": trace.args,
                    "startedAtMs": trace.started_at_ms,
                    "completedAtMs": trace.completed_at_ms,
                    "succeeded": trace.succeeded,
                    "result": trace.result,
                    "errorKind": trace.error_kind,
                    "errorMessage": trace.error_message,
                }),
                now(),
            )
            .with_producer(trace.recipient.clone());
            session.artifacts.insert("last_tool_trace", artifact.clone());
            outputs.push(artifact);
        }

        match outcome {
            Ok(result) => {
                session.vars = ctx.vars;
                if let Some(final_text) = &result.final_text {
                    if !final_text.is_empty() {
                        let artifact =
                            Artifact::new("final", ArtifactContentType::Text, Value::String(final_text.clone()), now());
                        session.artifacts.insert(&artifact.name, artifact.clone());
                        session.transcript.push(ChatEntry {
                            role: "assistant".to_string(),
                            content: final_text.clone(),
                            timestamp: now(),
                            source_index: Some(i),
                        });
                        outputs.push(artifact);
                    }
                }
                session.current_index = i + 1;
                session.status = SessionStatus::Completed;
                MessageExecutionRecord {
                    index: i,
                    execution_id,
                    status: RecordStatus::Succeeded,
                    started_at,
                    completed_at: Some(now()),
                    inputs: input.clone(),
                    outputs,
                    logs,
                    error: None,
                }
            }
            Err(e) => {
                session.vars = ctx.vars;
                session.status = SessionStatus::Failed;
                MessageExecutionRecord {
                    index: i,
                    execution_id,
                    status: RecordStatus::Failed,
                    started_at,
                    completed_at: Some(now()),
                    inputs: input.clone(),
                    outputs,
                    logs,
                    error: Some(StructuredError { code: e.code().to_string(), message: e.to_string() }),
                }
            }
        }
    }

    async fn finish(
        &self,
        mut session: Session,
        record: MessageExecutionRecord,
        execution_id: Option<String>,
        cancel: Option<CancellationToken>,
    ) -> Result<ExecuteResponse> {
        // Cancellation arriving before storeSave must not persist the
        // mutated in-memory session (§5).
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(SessionError::Cancelled);
        }

        session.updated_at = now();
        let i = record.index;
        if let Some(exec_id) = execution_id {
            session.execution_id_index.insert(&exec_id, session.history.len());
        }
        session.history.push(record.clone());

        self.sessions.save(&session).await?;
        self.index.touch(&session.session_id, &session.script_id, &session.updated_at).await?;

        info!(session_id = %session.session_id, index = i, status = ?record.status, "message executed");
        Ok(project(&session, i, record))
    }

    pub async fn get_status(&self, session_id: &SessionId) -> Result<StatusResponse> {
        let session = self.load(session_id).await?;
        Ok(StatusResponse {
            session_id: session.session_id.clone(),
            script_id: session.script_id.clone(),
            current_index: session.current_index,
            status: session.status,
            created_at: session.created_at.clone(),
            updated_at: session.updated_at.clone(),
            history_count: session.history.len(),
            artifact_count: session.artifacts.len(),
            metadata: session.metadata.clone(),
        })
    }

    pub async fn get_history(&self, session_id: &SessionId) -> Result<HistoryResponse> {
        let session = self.load(session_id).await?;
        Ok(HistoryResponse {
            session_id: session.session_id.clone(),
            script_id: session.script_id.clone(),
            current_index: session.current_index,
            status: session.status,
            history: session.history.clone(),
        })
    }

    pub async fn get_history_item(&self, session_id: &SessionId, index: usize) -> Result<HistoryItemResponse> {
        let session = self.load(session_id).await?;
        let record = session.history.iter().find(|r| r.index == index).cloned();
        Ok(HistoryItemResponse {
            session_id: session.session_id.clone(),
            script_id: session.script_id.clone(),
            index,
            record,
        })
    }

    pub async fn list_sessions(&self, script_id: Option<&ScriptId>, page: PageRequest) -> Result<SessionListResponse> {
        let limit = page.clamped_limit();
        let offset = parse_continuation_token(page.continuation_token.as_deref());
        let (session_ids, total) = self.index.list(script_id, limit, offset).await?;
        let next_offset = offset + session_ids.len();
        let continuation_token = if next_offset < total { Some(encode_continuation_token(next_offset)) } else { None };
        Ok(SessionListResponse { script_id: script_id.cloned(), session_ids, continuation_token })
    }

    pub async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        self.sessions.delete(session_id).await?;
        self.index.remove(session_id).await?;
        Ok(())
    }

    async fn load(&self, session_id: &SessionId) -> Result<Session> {
        self.sessions.load(session_id).await?.ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }
}

fn project(session: &Session, executed_index: usize, record: MessageExecutionRecord) -> ExecuteResponse {
    let outputs = serde_json::to_value(&record.outputs).unwrap_or(Value::Null);
    ExecuteResponse {
        session_id: session.session_id.clone(),
        script_id: session.script_id.clone(),
        executed_index,
        next_index: session.current_index,
        session_status: session.status.as_str().to_string(),
        record,
        outputs,
        vars: session.vars.clone(),
    }
}

fn skipped_record(index: usize, execution_id: Option<String>) -> MessageExecutionRecord {
    MessageExecutionRecord {
        index,
        execution_id,
        status: RecordStatus::Skipped,
        started_at: now(),
        completed_at: Some(now()),
        inputs: Value::Null,
        outputs: Vec::new(),
        logs: Vec::new(),
        error: None,
    }
}

fn advance_skip(session: &mut Session, i: usize, started_at: String, execution_id: Option<String>) -> MessageExecutionRecord {
    session.current_index = i + 1;
    MessageExecutionRecord {
        index: i,
        execution_id,
        status: RecordStatus::Skipped,
        started_at,
        completed_at: Some(now()),
        inputs: Value::Null,
        outputs: Vec::new(),
        logs: Vec::new(),
        error: None,
    }
}

fn failed_record(
    index: usize,
    started_at: String,
    code: &str,
    message: String,
    execution_id: Option<String>,
) -> MessageExecutionRecord {
    MessageExecutionRecord {
        index,
        execution_id,
        status: RecordStatus::Failed,
        started_at,
        completed_at: Some(now()),
        inputs: Value::Null,
        outputs: Vec::new(),
        logs: Vec::new(),
        error: Some(StructuredError { code: code.to_string(), message }),
    }
}
