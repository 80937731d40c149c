use std::sync::Arc;

use harmony_core::{CiMap, ChatService, ToolService};
use serde_json::Value;

/// Evaluation context for a single script run: the `vars`/`input` bags the
/// expression language resolves paths against, plus read-only references to
/// the chat/tool collaborators (§4.3) for future expression forms that may
/// need them — the built-in forms (`$vars`, `$input`, `$len`, `$map`) never
/// dereference them.
pub struct EvalContext {
    pub vars: CiMap<Value>,
    pub input: CiMap<Value>,
    /// Free-form JSON options token threaded through by the caller.
    pub options: Value,
    pub chat: Option<Arc<dyn ChatService>>,
    pub tools: Option<Arc<dyn ToolService>>,
}

impl EvalContext {
    pub fn new(vars: CiMap<Value>, input: CiMap<Value>) -> Self {
        Self {
            vars,
            input,
            options: Value::Null,
            chat: None,
            tools: None,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    pub fn with_collaborators(
        mut self,
        chat: Option<Arc<dyn ChatService>>,
        tools: Option<Arc<dyn ToolService>>,
    ) -> Self {
        self.chat = chat;
        self.tools = tools;
        self
    }
}
