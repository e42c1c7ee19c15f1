use serde::{Deserialize, Serialize};

/// Speaker of a message sent to a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Join all system messages into one block of instructions.
pub fn system_text(messages: &[Message]) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// Flatten the non-system messages into a single prompt for single-turn CLIs.
///
/// A lone user message is passed through untouched; longer conversations are
/// labelled by speaker so the backend can follow the exchange.
pub fn render_transcript(messages: &[Message]) -> String {
    let turns: Vec<&Message> = messages.iter().filter(|m| m.role != Role::System).collect();

    if let [only] = turns.as_slice() {
        if only.role == Role::User {
            return only.content.clone();
        }
    }

    turns
        .iter()
        .map(|m| match m.role {
            Role::User => format!("## User\n{}", m.content),
            Role::Assistant => format!("## Assistant\n{}", m.content),
            Role::System => unreachable!("system messages are filtered above"),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Instruction appended to a prompt when the caller requests structured output
/// from a backend that has no native schema support.
pub fn schema_hint(schema: &serde_json::Value) -> String {
    let pretty = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "\n\nRespond with JSON that conforms to this schema:\n```json\n{}\n```",
        pretty
    )
}
