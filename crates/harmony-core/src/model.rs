//! Envelope/Message/Script/Step types (§3). Immutable once an envelope is
//! registered under a `ScriptId`; sessions reference a script only by id.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque script identifier — a newtype so call sites can't accidentally
/// swap it for a `SessionId`, matching the teacher's `UserId`/`AgentId`/
/// `SessionKey` newtype idiom.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScriptId(pub String);

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ScriptId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ScriptId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// `role ∈ {system, developer, user, assistant, tool-name}`. Any role other
/// than the four fixed ones is a tool-recipient role carried verbatim.
///
/// Serializes/deserializes as a plain lower-case string — not as a tagged
/// enum — since `Role::Tool("demo.echo")` must round-trip as `"demo.echo"`,
/// not as a wrapped variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool(String),
}

impl Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Role::normalize(&raw))
    }
}

impl Role {
    /// Normalize raw wire/JSON text into a `Role`: lower-case, trimmed,
    /// mapped onto the four fixed variants or carried as `Role::Tool`.
    pub fn normalize(raw: &str) -> Role {
        match raw.trim().to_ascii_lowercase().as_str() {
            "system" => Role::System,
            "developer" => Role::Developer,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            other => Role::Tool(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::Developer => "developer",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool(name) => name.as_str(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Analysis,
    Commentary,
    Final,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Analysis => "analysis",
            Channel::Commentary => "commentary",
            Channel::Final => "final",
        }
    }

    pub fn parse(raw: &str) -> Option<Channel> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "analysis" => Some(Channel::Analysis),
            "commentary" => Some(Channel::Commentary),
            "final" => Some(Channel::Final),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Text,
    Json,
    HarmonyScript,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Json => "json",
            ContentType::HarmonyScript => "harmony-script",
        }
    }

    pub fn parse(raw: &str) -> Option<ContentType> {
        match raw.trim() {
            "text" => Some(ContentType::Text),
            "json" => Some(ContentType::Json),
            "harmony-script" => Some(ContentType::HarmonyScript),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Termination {
    Call,
    Return,
    End,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Call => "call",
            Termination::Return => "return",
            Termination::End => "end",
        }
    }
}

/// One message in an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
    pub content: serde_json::Value,
}

impl Message {
    /// True for `role=assistant ∧ channel=commentary`, the only shape for
    /// which `recipient`/`termination` are meaningful per §3.
    pub fn is_assistant_commentary(&self) -> bool {
        self.role == Role::Assistant && self.channel == Some(Channel::Commentary)
    }
}

/// Ordered, immutable sequence of messages defining a run template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub format_version: u32,
    pub messages: Vec<Message>,
}

/// `extract-input`/`tool-call` argument value: either a `$`-prefixed
/// expression string or a verbatim JSON literal.
pub type ArgMap = BTreeMap<String, serde_json::Value>;

/// A typed step in a harmony-script. Tagged by `type` in JSON, matching
/// spec.md §3's step variants exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Step {
    ExtractInput {
        /// varName -> expression, evaluated and assigned in declaration order.
        #[serde(with = "extract_input_shim")]
        vars: Vec<(String, String)>,
    },
    ToolCall {
        recipient: String,
        channel: String,
        args: ArgMap,
        save_as: String,
    },
    If {
        condition: String,
        #[serde(default)]
        then: Vec<Step>,
        #[serde(default, rename = "else")]
        else_: Vec<Step>,
    },
    AssistantMessage {
        channel: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<serde_json::Value>,
        #[serde(
            default,
            rename = "contentTemplate",
            skip_serializing_if = "Option::is_none"
        )]
        content_template: Option<String>,
    },
    Halt,
}

/// A `harmony-script` content payload.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Script {
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
    pub steps: Vec<Step>,
}

impl Script {
    /// Decode a `harmony-script` message body into a `Script`.
    pub fn from_content(content: &serde_json::Value) -> Result<Script, serde_json::Error> {
        serde_json::from_value(content.clone())
    }
}

/// Because `(vars, String)` pairs don't round-trip through `extract-input`'s
/// `{ "vars": { "name": "expr" } }` object shape via the derived `Vec<(String,String)>`
/// (serde_json only maps JSON objects onto `BTreeMap`/`HashMap` by default),
/// `ExtractInput` is parsed through an intermediate ordered-map shim so field
/// order from the wire is preserved for deterministic evaluation order.
pub(crate) mod extract_input_shim {
    use serde::de::Deserializer;
    use serde::ser::Serializer;
    use serde_json::Value;

    pub fn serialize<S: Serializer>(vars: &[(String, String)], ser: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = ser.serialize_map(Some(vars.len()))?;
        for (k, v) in vars {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<(String, String)>, D::Error> {
        let value = Value::deserialize(de)?;
        let obj = value
            .as_object()
            .ok_or_else(|| serde::de::Error::custom("extract-input.vars must be an object"))?;
        let mut out = Vec::with_capacity(obj.len());
        for (k, v) in obj {
            let expr = v
                .as_str()
                .ok_or_else(|| serde::de::Error::custom("extract-input.vars values must be strings"))?;
            out.push((k.clone(), expr.to_string()));
        }
        Ok(out)
    }
}
