//! Step interpreter (C5, §4.4). Executes a [`Script`]'s steps sequentially
//! against an [`EvalContext`], driving the tool and chat collaborators.
//! Grounded in the teacher's `tool_loop::run_tool_loop` shape (iterate,
//! dispatch, feed results back) generalized from a fixed provider loop to an
//! arbitrary typed step tree.

use harmony_core::{Channel, ChatHistoryEntry, ChatService, Script, Step, ToolService};
use harmony_eval::{eval_condition, eval_expr, render_template, validate_expression_syntax, EvalContext};
use serde_json::Value;

use crate::error::ExecutionError;

/// Result of running a script to completion (or to a `halt`).
pub struct InterpreterOutcome {
    pub final_text: Option<String>,
    pub halted: bool,
    pub chat_history: Vec<ChatHistoryEntry>,
}

/// Run a script's steps, mutating `ctx.vars` as extract-input/tool-call
/// steps assign into it, and appending to `chat_history` as assistant
/// messages are emitted. `chat_history` is seeded by the caller from the
/// session transcript (§4.8 step 5).
pub async fn run_script(
    script: &Script,
    ctx: &mut EvalContext,
    chat_history: &mut Vec<ChatHistoryEntry>,
    chat: &dyn ChatService,
    tools: &dyn ToolService,
) -> Result<InterpreterOutcome, ExecutionError> {
    if script.steps.is_empty() {
        return Err(ExecutionError::NoSteps);
    }

    let mut final_text: Option<String> = None;
    let halted = run_steps(&script.steps, ctx, chat_history, chat, tools, &mut final_text).await?;

    if final_text.is_none() && !halted {
        chat_history.push(ChatHistoryEntry {
            role: "system".to_string(),
            content: "summarize the results of this conversation for the user.".to_string(),
            channel: None,
            content_type: None,
            recipient: None,
            termination: None,
            source_index: None,
        });
        let reply = request_assistant_reply(chat, chat_history).await?;
        final_text = Some(reply);
    }

    Ok(InterpreterOutcome {
        final_text,
        halted,
        chat_history: chat_history.clone(),
    })
}

/// Execute one step list (a script body, or an `if` branch), returning
/// `Ok(true)` the moment a `halt` is reached so the caller can propagate it
/// up through nested branches.
async fn run_steps(
    steps: &[Step],
    ctx: &mut EvalContext,
    chat_history: &mut Vec<ChatHistoryEntry>,
    chat: &dyn ChatService,
    tools: &dyn ToolService,
    final_text: &mut Option<String>,
) -> Result<bool, ExecutionError> {
    for step in steps {
        match step {
            Step::ExtractInput { vars } => {
                for (name, expr) in vars {
                    validate_expression_syntax(expr).map_err(ExecutionError::from)?;
                    let value = eval_expr(ctx, expr);
                    ctx.vars.insert(name, value);
                }
            }
            Step::ToolCall { recipient, channel, args, save_as } => {
                if channel != "commentary" {
                    return Err(ExecutionError::channel_violation("commentary"));
                }
                let mut evaluated = serde_json::Map::new();
                for (key, value) in args {
                    let resolved = match value.as_str() {
                        Some(s) if s.starts_with('$') => eval_expr(ctx, s),
                        _ => value.clone(),
                    };
                    evaluated.insert(key.clone(), resolved);
                }
                let result = tools
                    .invoke(recipient, &Value::Object(evaluated))
                    .await
                    .map_err(|e| ExecutionError::tool_failed(recipient, e.0))?;
                ctx.vars.insert(save_as, result);
            }
            Step::If { condition, then, else_ } => {
                validate_expression_syntax(condition).map_err(ExecutionError::from)?;
                let branch: &[Step] = if eval_condition(ctx, condition) { then } else { else_ };
                let halted =
                    Box::pin(run_steps(branch, ctx, chat_history, chat, tools, final_text)).await?;
                if halted {
                    return Ok(true);
                }
            }
            Step::AssistantMessage { channel, content, content_template } => {
                let parsed_channel = Channel::parse(channel)
                    .filter(|c| matches!(c, Channel::Analysis | Channel::Final))
                    .ok_or_else(|| ExecutionError::channel_violation("analysis or final"))?;

                let rendered = match content_template {
                    Some(template) => render_template(ctx, template),
                    None => value_to_text(content.as_ref().unwrap_or(&Value::Null)),
                };

                match parsed_channel {
                    Channel::Analysis => {
                        chat_history.push(ChatHistoryEntry {
                            role: "assistant".to_string(),
                            content: rendered,
                            channel: Some("analysis".to_string()),
                            content_type: None,
                            recipient: None,
                            termination: None,
                            source_index: None,
                        });
                    }
                    Channel::Final => {
                        let text = if !rendered.is_empty() && rendered != "." {
                            rendered
                        } else {
                            request_assistant_reply(chat, chat_history).await?
                        };
                        chat_history.push(ChatHistoryEntry {
                            role: "assistant".to_string(),
                            content: text.clone(),
                            channel: Some("final".to_string()),
                            content_type: None,
                            recipient: None,
                            termination: None,
                            source_index: None,
                        });
                        *final_text = Some(text);
                    }
                    Channel::Commentary => unreachable!("filtered above"),
                }
            }
            Step::Halt => return Ok(true),
        }
    }
    Ok(false)
}

async fn request_assistant_reply(
    chat: &dyn ChatService,
    chat_history: &[ChatHistoryEntry],
) -> Result<String, ExecutionError> {
    let filtered: Vec<ChatHistoryEntry> = chat_history
        .iter()
        .filter(|entry| harmony_core::default_chat_filter(entry))
        .cloned()
        .collect();
    chat.get_assistant_reply(&filtered)
        .await
        .map_err(|e| ExecutionError::chat_failed(e.0))
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use harmony_core::{CiMap, ChatError, ToolError};
    use std::sync::Mutex;

    struct StubChat {
        reply: String,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl ChatService for StubChat {
        async fn get_assistant_reply(&self, _history: &[ChatHistoryEntry]) -> Result<String, ChatError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.reply.clone())
        }
    }

    struct StubTools;

    #[async_trait]
    impl ToolService for StubTools {
        async fn invoke(&self, _recipient: &str, args: &Value) -> Result<Value, ToolError> {
            Ok(args.clone())
        }
    }

    struct FailingTools;

    #[async_trait]
    impl ToolService for FailingTools {
        async fn invoke(&self, recipient: &str, _args: &Value) -> Result<Value, ToolError> {
            Err(ToolError(format!("{recipient} unavailable")))
        }
    }

    fn ctx() -> EvalContext {
        EvalContext::new(CiMap::new(), CiMap::new())
    }

    #[tokio::test]
    async fn happy_path_script_sets_final_text_and_tool_result() {
        let script: Script = serde_json::from_value(serde_json::json!({
            "vars": {},
            "steps": [
                {"type": "tool-call", "recipient": "demo.echo", "channel": "commentary",
                 "args": {"text": "hello from tool"}, "save_as": "toolResult"},
                {"type": "assistant-message", "channel": "final", "content": "."}
            ]
        }))
        .unwrap();

        let mut c = ctx();
        let mut history = Vec::new();
        let chat = StubChat { reply: "Final answer from LLM.".to_string(), calls: Mutex::new(0) };
        let tools = StubTools;

        let outcome = run_script(&script, &mut c, &mut history, &chat, &tools).await.unwrap();
        assert_eq!(outcome.final_text.as_deref(), Some("Final answer from LLM."));
        assert_eq!(c.vars.get("toolResult"), Some(&serde_json::json!({"text": "hello from tool"})));
        assert_eq!(*chat.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn no_final_text_triggers_summarize_fallback() {
        let script: Script = serde_json::from_value(serde_json::json!({
            "vars": {},
            "steps": [{"type": "extract-input", "vars": {"x": "$input.x"}}]
        }))
        .unwrap();

        let mut c = ctx();
        c.input.insert("x", serde_json::json!(1));
        let mut history = Vec::new();
        let chat = StubChat { reply: "summary text".to_string(), calls: Mutex::new(0) };
        let tools = StubTools;

        let outcome = run_script(&script, &mut c, &mut history, &chat, &tools).await.unwrap();
        assert_eq!(outcome.final_text.as_deref(), Some("summary text"));
        assert_eq!(*chat.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn halt_step_stops_execution_immediately() {
        let script: Script = serde_json::from_value(serde_json::json!({
            "vars": {},
            "steps": [
                {"type": "halt"},
                {"type": "assistant-message", "channel": "final", "content": "unreachable"}
            ]
        }))
        .unwrap();

        let mut c = ctx();
        let mut history = Vec::new();
        let chat = StubChat { reply: "never".to_string(), calls: Mutex::new(0) };
        let tools = StubTools;

        let outcome = run_script(&script, &mut c, &mut history, &chat, &tools).await.unwrap();
        assert!(outcome.halted);
        assert!(outcome.final_text.is_none());
        assert_eq!(*chat.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn tool_call_outside_commentary_channel_is_rejected() {
        let script: Script = serde_json::from_value(serde_json::json!({
            "vars": {},
            "steps": [
                {"type": "tool-call", "recipient": "demo.echo", "channel": "final",
                 "args": {}, "save_as": "r"}
            ]
        }))
        .unwrap();

        let mut c = ctx();
        let mut history = Vec::new();
        let chat = StubChat { reply: "x".to_string(), calls: Mutex::new(0) };
        let tools = StubTools;

        let err = run_script(&script, &mut c, &mut history, &chat, &tools).await.unwrap_err();
        assert_eq!(err.code(), "HRF_EXECUTION_ERROR");
    }

    #[tokio::test]
    async fn tool_failure_propagates_as_execution_error() {
        let script: Script = serde_json::from_value(serde_json::json!({
            "vars": {},
            "steps": [
                {"type": "tool-call", "recipient": "demo.search", "channel": "commentary",
                 "args": {}, "save_as": "r"}
            ]
        }))
        .unwrap();

        let mut c = ctx();
        let mut history = Vec::new();
        let chat = StubChat { reply: "x".to_string(), calls: Mutex::new(0) };
        let tools = FailingTools;

        let err = run_script(&script, &mut c, &mut history, &chat, &tools).await.unwrap_err();
        assert_eq!(err.code(), "HRF_EXECUTION_ERROR");
    }

    #[tokio::test]
    async fn if_step_selects_then_branch_on_truthy_condition() {
        let script: Script = serde_json::from_value(serde_json::json!({
            "vars": {"flag": true},
            "steps": [
                {"type": "if", "condition": "$vars.flag",
                 "then": [{"type": "assistant-message", "channel": "final", "content": "yes"}],
                 "else": [{"type": "assistant-message", "channel": "final", "content": "no"}]}
            ]
        }))
        .unwrap();

        let mut c = ctx();
        c.vars.insert("flag", serde_json::json!(true));
        let mut history = Vec::new();
        let chat = StubChat { reply: "x".to_string(), calls: Mutex::new(0) };
        let tools = StubTools;

        let outcome = run_script(&script, &mut c, &mut history, &chat, &tools).await.unwrap();
        assert_eq!(outcome.final_text.as_deref(), Some("yes"));
    }
}
