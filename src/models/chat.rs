use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

/// Speaker of a conversation turn.
///
/// Roles arrive as free text; anything other than `user` or `assistant` (matched
/// case-insensitively) is kept as [`ChatRole::Unrecognized`] and dropped when prompts are built.
/// A missing or `null` role is unrecognized too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum ChatRole {
    /// Human asking questions.
    User,
    /// Model answers from earlier turns.
    Assistant,
    /// Any other role string, preserved verbatim.
    Unrecognized(String),
}

impl From<String> for ChatRole {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<Option<String>> for ChatRole {
    fn from(value: Option<String>) -> Self {
        value.unwrap_or_default().into()
    }
}

impl Default for ChatRole {
    fn default() -> Self {
        Self::Unrecognized(String::new())
    }
}

impl From<ChatRole> for String {
    fn from(role: ChatRole) -> Self {
        match role {
            ChatRole::User => "user".into(),
            ChatRole::Assistant => "assistant".into(),
            ChatRole::Unrecognized(other) => other,
        }
    }
}

/// One prior message supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Who said it.
    #[serde(default, alias = "Role")]
    pub role: ChatRole,
    /// What was said.
    #[serde(default, alias = "Content", deserialize_with = "null_as_empty")]
    pub content: String,
    /// When it was said; absent or `null` means now.
    #[serde(
        default = "now_utc",
        alias = "Timestamp",
        serialize_with = "time::serde::rfc3339::serialize",
        deserialize_with = "timestamp_or_now"
    )]
    pub timestamp: OffsetDateTime,
}

impl ChatTurn {
    /// Build a turn stamped with the current time.
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: now_utc(),
        }
    }
}

fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn timestamp_or_now<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(time::serde::rfc3339::option::deserialize(deserializer)?.unwrap_or_else(now_utc))
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    /// Question for this turn.
    #[serde(default, alias = "Message")]
    pub message: String,
    /// Earlier turns, oldest first. The server keeps no conversation state.
    #[serde(default, alias = "History")]
    pub history: Vec<ChatTurn>,
}

/// Retrieved posting surfaced alongside a chat answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSource {
    /// Document key.
    pub id: String,
    /// Job title.
    pub title: String,
    /// Company name.
    pub company: String,
    /// Location, empty when the posting had none.
    pub location: String,
    /// Description truncated for display.
    pub excerpt: String,
    /// Relevance score reported by the index.
    pub score: f64,
}

/// Body returned by `POST /chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Answer text.
    pub response: String,
    /// Documents retrieved for this turn, even if the model did not use them.
    pub sources: Vec<DocumentSource>,
    /// Identifier of this turn, also used as the log correlation id.
    pub conversation_id: String,
}
