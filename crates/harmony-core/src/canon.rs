//! Canonicalizer / JSON round-trip (§4.2). Normalizes an [`Envelope`] into
//! the canonical JSON shape §6 describes, and validates either direction
//! through an injected [`SchemaValidator`] — a black box per spec.md's
//! framing, not a concrete JSON-Schema dependency (see DESIGN.md).

use serde_json::Value;

use crate::error::SchemaError;
use crate::model::{Channel, ContentType, Envelope, Message, Role};

/// Injected schema validator. Returns `None` on success, `Some(error)` on
/// failure — mirrors the teacher's `{code, message}` collaborator contract.
pub trait SchemaValidator: Send + Sync {
    fn validate_envelope(&self, json_text: &str) -> Option<SchemaError>;
    fn validate_script(&self, script_node: &Value) -> Option<SchemaError>;
}

/// Reference validator implementing the structural rules §4.2/§6 name
/// directly, since none of the reference collaborators in scope depend on
/// an external JSON-Schema crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralValidator;

impl SchemaValidator for StructuralValidator {
    fn validate_envelope(&self, json_text: &str) -> Option<SchemaError> {
        let value: Value = match serde_json::from_str(json_text) {
            Ok(v) => v,
            Err(e) => return Some(SchemaError::envelope_failed(format!("invalid JSON: {e}"))),
        };

        let obj = match value.as_object() {
            Some(o) => o,
            None => return Some(SchemaError::envelope_failed("root must be an object")),
        };
        if obj.len() != 1 || !obj.contains_key("messages") {
            return Some(SchemaError::envelope_failed(
                "root object must have exactly one property: messages",
            ));
        }
        let messages = match obj.get("messages").and_then(Value::as_array) {
            Some(m) => m,
            None => return Some(SchemaError::envelope_failed("messages must be an array")),
        };

        for (i, msg) in messages.iter().enumerate() {
            if let Some(err) = validate_message_shape(msg) {
                return Some(
                    err.with_details(serde_json::json!({ "index": i })),
                );
            }
        }
        None
    }

    fn validate_script(&self, script_node: &Value) -> Option<SchemaError> {
        let obj = script_node.as_object()?;
        if !obj.contains_key("steps") {
            return Some(SchemaError::script_failed("script must have a steps array"));
        }
        let steps = obj.get("steps").and_then(Value::as_array)?;
        if steps.is_empty() {
            // Empty-steps is a semantic (NO_HARMONY_STEPS) error, not schema.
            return None;
        }
        for (i, step) in steps.iter().enumerate() {
            let Some(step_obj) = step.as_object() else {
                return Some(
                    SchemaError::script_failed("step must be an object")
                        .with_details(serde_json::json!({ "index": i })),
                );
            };
            if !step_obj.contains_key("type") {
                return Some(
                    SchemaError::script_failed("step is missing required 'type'")
                        .with_details(serde_json::json!({ "index": i })),
                );
            }
        }
        None
    }
}

fn validate_message_shape(msg: &Value) -> Option<SchemaError> {
    let obj = msg.as_object()?;
    for required in ["role", "channel", "contentType"] {
        if !obj.contains_key(required) {
            return Some(SchemaError::envelope_failed(format!(
                "message missing required property: {required}"
            )));
        }
    }
    let role = obj.get("role").and_then(Value::as_str).unwrap_or("");
    let channel = obj.get("channel").and_then(Value::as_str).unwrap_or("");
    let is_assistant_commentary = role == "assistant" && channel == "commentary";

    let has_recipient = obj.get("recipient").map(|v| !v.is_null()).unwrap_or(false);
    let has_termination = obj.get("termination").map(|v| !v.is_null()).unwrap_or(false);

    if is_assistant_commentary && (!has_recipient || !has_termination) {
        return Some(SchemaError::envelope_failed(
            "assistant+commentary messages require recipient and termination",
        ));
    }
    if !is_assistant_commentary && (has_recipient || has_termination) {
        return Some(SchemaError::envelope_failed(
            "recipient/termination are only valid for assistant+commentary messages",
        ));
    }
    None
}

/// Normalize an [`Envelope`] into the canonical JSON instance (§6).
pub fn to_canonical_json(envelope: &Envelope) -> Value {
    let messages: Vec<Value> = envelope.messages.iter().map(message_to_canonical).collect();
    serde_json::json!({ "messages": messages })
}

fn message_to_canonical(msg: &Message) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("role".to_string(), Value::String(msg.role.as_str().to_string()));
    obj.insert(
        "channel".to_string(),
        msg.channel.map(|c| Value::String(c.as_str().to_string())).unwrap_or(Value::Null),
    );
    obj.insert(
        "contentType".to_string(),
        Value::String(msg.content_type.as_str().to_string()),
    );
    obj.insert(
        "content".to_string(),
        match msg.content_type {
            ContentType::Text => Value::String(
                msg.content
                    .as_str()
                    .map(|s| s.trim_matches(|c| c == '\r' || c == '\n').to_string())
                    .unwrap_or_default(),
            ),
            ContentType::Json | ContentType::HarmonyScript => msg.content.clone(),
        },
    );
    if msg.is_assistant_commentary() {
        obj.insert(
            "recipient".to_string(),
            msg.recipient.clone().map(Value::String).unwrap_or(Value::Null),
        );
        obj.insert(
            "termination".to_string(),
            msg.termination
                .map(|t| Value::String(t.as_str().to_string()))
                .unwrap_or(Value::Null),
        );
    }
    Value::Object(obj)
}

/// Parse a canonical JSON envelope back into structured [`Envelope`] form.
/// Does not itself run schema validation — call [`SchemaValidator::validate_envelope`]
/// first (the engine always does, per §7).
pub fn from_canonical_json(value: &Value, format_version: u32) -> Result<Envelope, SchemaError> {
    let obj = value
        .as_object()
        .ok_or_else(|| SchemaError::envelope_failed("root must be an object"))?;
    let messages = obj
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| SchemaError::envelope_failed("messages must be an array"))?;

    let mut out = Vec::with_capacity(messages.len());
    for m in messages {
        out.push(message_from_canonical(m)?);
    }
    Ok(Envelope {
        format_version,
        messages: out,
    })
}

fn message_from_canonical(value: &Value) -> Result<Message, SchemaError> {
    let obj = value
        .as_object()
        .ok_or_else(|| SchemaError::envelope_failed("message must be an object"))?;

    let role_raw = obj
        .get("role")
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaError::envelope_failed("message missing role"))?;
    let role = Role::normalize(role_raw);

    let channel = obj
        .get("channel")
        .and_then(Value::as_str)
        .and_then(Channel::parse);

    let content_type_raw = obj
        .get("contentType")
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaError::envelope_failed("message missing contentType"))?;
    let content_type = ContentType::parse(content_type_raw)
        .ok_or_else(|| SchemaError::envelope_failed(format!("unknown contentType: {content_type_raw}")))?;

    let content = obj.get("content").cloned().unwrap_or(Value::Null);
    let content = match content_type {
        ContentType::Text => Value::String(
            content
                .as_str()
                .map(|s| s.trim_matches(|c| c == '\r' || c == '\n').to_string())
                .unwrap_or_default(),
        ),
        _ => content,
    };

    let recipient = obj
        .get("recipient")
        .and_then(Value::as_str)
        .map(|s| s.to_string());
    let termination = obj
        .get("termination")
        .and_then(Value::as_str)
        .and_then(|s| match s {
            "call" => Some(crate::model::Termination::Call),
            "return" => Some(crate::model::Termination::Return),
            "end" => Some(crate::model::Termination::End),
            _ => None,
        });

    let is_assistant_commentary = role == Role::Assistant && channel == Some(Channel::Commentary);
    if is_assistant_commentary && (recipient.is_none() || termination.is_none()) {
        return Err(SchemaError::envelope_failed(
            "assistant+commentary messages require recipient and termination",
        ));
    }

    Ok(Message {
        role,
        channel,
        recipient: if is_assistant_commentary { recipient } else { None },
        content_type,
        termination: if is_assistant_commentary { termination } else { None },
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::parse_envelope;

    #[test]
    fn round_trip_through_canonical_json() {
        let wire = "<|start|>system<|message|>hello<|end|>";
        let envelope = parse_envelope(wire, 1).unwrap();
        let json = to_canonical_json(&envelope);
        let validator = StructuralValidator;
        assert!(validator.validate_envelope(&json.to_string()).is_none());
        let back = from_canonical_json(&json, 1).unwrap();
        assert_eq!(back.messages[0].role, Role::System);
        assert_eq!(back.messages[0].content, serde_json::Value::String("hello".to_string()));
    }

    #[test]
    fn rejects_extra_root_properties() {
        let json = serde_json::json!({ "messages": [], "extra": true });
        let validator = StructuralValidator;
        assert!(validator.validate_envelope(&json.to_string()).is_some());
    }

    #[test]
    fn rejects_commentary_missing_recipient() {
        let json = serde_json::json!({
            "messages": [{
                "role": "assistant",
                "channel": "commentary",
                "contentType": "json",
                "content": {},
                "termination": "call"
            }]
        });
        let validator = StructuralValidator;
        assert!(validator.validate_envelope(&json.to_string()).is_some());
    }
}
