//! Preflight analyzer (C6, §4.5): gathers required tool recipients from an
//! envelope before execution and checks their availability.

use std::collections::BTreeSet;

use harmony_core::{CiMap, ContentType, Envelope, Script, Step, Termination};

#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    pub required_recipients: Vec<String>,
    pub missing_recipients: Vec<String>,
}

impl PreflightReport {
    pub fn is_ready(&self) -> bool {
        self.missing_recipients.is_empty()
    }
}

/// Collect every tool recipient an envelope could invoke, deduplicated
/// case-insensitively, preserving first-seen order.
pub fn required_recipients(envelope: &Envelope) -> Vec<String> {
    let mut seen: CiMap<()> = CiMap::new();
    let mut out = Vec::new();

    for message in &envelope.messages {
        if message.is_assistant_commentary() && message.termination == Some(Termination::Call) {
            if let Some(recipient) = &message.recipient {
                push_unique(&mut seen, &mut out, recipient);
            }
        }
        if message.content_type == ContentType::HarmonyScript {
            if let Ok(script) = Script::from_content(&message.content) {
                collect_from_steps(&script.steps, &mut seen, &mut out);
            }
        }
    }

    out
}

fn collect_from_steps(steps: &[Step], seen: &mut CiMap<()>, out: &mut Vec<String>) {
    for step in steps {
        match step {
            Step::ToolCall { recipient, .. } => push_unique(seen, out, recipient),
            Step::If { then, else_, .. } => {
                collect_from_steps(then, seen, out);
                collect_from_steps(else_, seen, out);
            }
            _ => {}
        }
    }
}

fn push_unique(seen: &mut CiMap<()>, out: &mut Vec<String>, recipient: &str) {
    if seen.get(recipient).is_none() {
        seen.insert(recipient, ());
        out.push(recipient.to_string());
    }
}

/// Run preflight against an availability collaborator.
pub async fn run_preflight(
    envelope: &Envelope,
    availability: &dyn harmony_core::ToolAvailability,
) -> PreflightReport {
    let required = required_recipients(envelope);
    let mut missing = BTreeSet::new();
    for recipient in &required {
        if !availability.is_available(recipient).await {
            missing.insert(recipient.clone());
        }
    }
    PreflightReport {
        required_recipients: required,
        missing_recipients: missing.into_iter().collect(),
    }
}
