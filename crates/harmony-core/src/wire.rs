//! Token-delimited wire parser (§4.1). Turns `<|start|> HEADER <|message|>
//! BODY TERMINATOR` frames into a structured [`Envelope`].

use tracing::{debug, trace};

use crate::error::{ParseError, ParseResult};
use crate::model::{Channel, ContentType, Envelope, Message, Role, Termination};

const TOK_START: &str = "<|start|>";
const TOK_MESSAGE: &str = "<|message|>";
const TOK_CHANNEL: &str = "<|channel|>";
const TOK_CONSTRAIN: &str = "<|constrain|>";
const TOK_END: &str = "<|end|>";
const TOK_CALL: &str = "<|call|>";
const TOK_RETURN: &str = "<|return|>";

/// Parse one or more concatenated frames into an [`Envelope`].
///
/// `format_version` is not carried on the wire; callers supply it (the
/// canonical JSON form is the only place it's persisted).
pub fn parse_envelope(text: &str, format_version: u32) -> ParseResult<Envelope> {
    let mut messages = Vec::new();
    let mut pos = 0usize;

    loop {
        let Some(start_rel) = text[pos..].find(TOK_START) else {
            break;
        };
        let frame_start = pos + start_rel + TOK_START.len();
        let (message, next_pos) = parse_frame(text, frame_start)?;
        messages.push(message);
        pos = next_pos;
    }

    if messages.is_empty() && !text.trim().is_empty() {
        return Err(ParseError::NoFrameStart);
    }

    debug!(count = messages.len(), "parsed envelope from wire text");
    Ok(Envelope {
        format_version,
        messages,
    })
}

/// Parse a single frame starting right after its `<|start|>` token.
/// Returns the decoded message and the byte offset to resume scanning from.
fn parse_frame(text: &str, header_start: usize) -> ParseResult<(Message, usize)> {
    let message_rel = text[header_start..]
        .find(TOK_MESSAGE)
        .ok_or(ParseError::MissingMessageToken)?;
    let header = &text[header_start..header_start + message_rel];
    let body_start = header_start + message_rel + TOK_MESSAGE.len();

    let (raw_role, raw_channel, raw_recipient, raw_constrain) = parse_header(header);

    let role_text = raw_role.trim();
    if role_text.is_empty() {
        return Err(ParseError::EmptyRole);
    }
    let role = Role::normalize(role_text);

    // Find the earliest terminator in the body.
    let rest = &text[body_start..];
    let candidates = [
        (TOK_END, Termination::End),
        (TOK_CALL, Termination::Call),
        (TOK_RETURN, Termination::Return),
    ];
    let mut earliest: Option<(usize, &str, Termination)> = None;
    for (tok, term) in candidates {
        if let Some(rel) = rest.find(tok) {
            if earliest.map(|(e, ..)| rel < e).unwrap_or(true) {
                earliest = Some((rel, tok, term));
            }
        }
    }
    let (body_end_rel, term_tok, raw_termination) = earliest.ok_or(ParseError::MissingTerminator)?;
    let body_raw = &rest[..body_end_rel];
    let body = body_raw.trim_matches(|c| c == '\r' || c == '\n');
    let next_pos = body_start + body_end_rel + term_tok.len();

    let channel = raw_channel.and_then(|c| Channel::parse(c));
    let explicit_constrain = raw_constrain.and_then(ContentType::parse);

    // Channel resolution for assistant messages with no explicit channel:
    // default to `final` unless the body looks like a tool call.
    let resolved_channel = if channel.is_none() && role == Role::Assistant {
        if looks_like_tool_call(body) {
            Some(Channel::Commentary)
        } else {
            Some(Channel::Final)
        }
    } else {
        channel
    };

    let content_type = explicit_constrain.unwrap_or_else(|| {
        infer_content_type(&role, resolved_channel, raw_termination, body)
    });

    let content = match content_type {
        ContentType::Json | ContentType::HarmonyScript => serde_json::from_str(body)
            .map_err(|e| ParseError::InvalidJson(e.to_string()))?,
        ContentType::Text => serde_json::Value::String(body.to_string()),
    };

    // Termination is only meaningful for assistant+commentary messages.
    let termination = if role == Role::Assistant && resolved_channel == Some(Channel::Commentary) {
        Some(raw_termination)
    } else {
        None
    };

    let recipient = raw_recipient.map(|s| s.to_string());

    trace!(role = %role, channel = ?resolved_channel, content_type = content_type.as_str(), "parsed frame");

    Ok((
        Message {
            role,
            channel: resolved_channel,
            recipient,
            content_type,
            termination,
            content,
        },
        next_pos,
    ))
}

/// Split a header into `(role, channel, recipient, constrain)`.
fn parse_header(header: &str) -> (&str, Option<&str>, Option<&str>, Option<&str>) {
    let channel_idx = header.find(TOK_CHANNEL);
    let constrain_idx = header.find(TOK_CONSTRAIN);

    let role_end = [channel_idx, constrain_idx]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(header.len());
    let role = &header[..role_end];

    let mut channel = None;
    let mut recipient = None;
    if let Some(ci) = channel_idx {
        let after = &header[ci + TOK_CHANNEL.len()..];
        let after_end = constrain_idx.map(|c| c - (ci + TOK_CHANNEL.len())).unwrap_or(after.len());
        let segment = after[..after_end.min(after.len())].trim();
        // segment is `channelName [to=recipient]`
        if let Some(to_idx) = segment.find("to=") {
            channel = Some(segment[..to_idx].trim());
            recipient = Some(segment[to_idx + 3..].trim());
        } else {
            channel = Some(segment.trim());
        }
    }

    let mut constrain = None;
    if let Some(ki) = constrain_idx {
        let after = &header[ki + TOK_CONSTRAIN.len()..];
        constrain = Some(after.trim());
    }

    (role, channel, recipient, constrain)
}

fn looks_like_tool_call(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with('{')
}

/// Infer `contentType` when the header carried no `<|constrain|>` (§4.1).
fn infer_content_type(
    role: &Role,
    channel: Option<Channel>,
    termination: Termination,
    body: &str,
) -> ContentType {
    if *role == Role::Assistant && channel == Some(Channel::Commentary) {
        match termination {
            Termination::Call | Termination::Return => return ContentType::Json,
            Termination::End => {
                let trimmed = body.trim_start();
                if trimmed.starts_with('{') {
                    if contains_steps_key(trimmed) {
                        return ContentType::HarmonyScript;
                    }
                    return ContentType::Json;
                }
                return ContentType::Text;
            }
        }
    }
    ContentType::Text
}

/// Cheap structural check for `"steps"` as a top-level key without a full
/// JSON parse — good enough to disambiguate `json` from `harmony-script`
/// before the real `serde_json::from_str` call validates the body.
fn contains_steps_key(body: &str) -> bool {
    body.contains("\"steps\"")
}
