//! Prompt assembly for grounded answers.

use crate::llm::PromptMessage;
use crate::models::{ChatRole, ChatTurn, DocumentSource};

/// Instruction placed first in every conversation.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions about job descriptions. \
Use the provided job description context to answer the user's question. \
If the context doesn't contain relevant information, say so politely. \
Always be specific and reference the job titles and companies when relevant. \
Keep your responses concise and helpful.";

/// Context used when retrieval produced nothing.
pub const NO_RESULTS_CONTEXT: &str = "No relevant job descriptions found.";

/// Answer returned when generation fails.
pub const FALLBACK_ANSWER: &str =
    "I'm sorry, I encountered an error while processing your question. Please try again.";

/// Maximum excerpt length in characters, marker included.
pub const EXCERPT_MAX_CHARS: usize = 200;

const ELLIPSIS: &str = "...";

/// Shorten `text` to [`EXCERPT_MAX_CHARS`] characters, ending in `...` when cut.
pub fn truncate_excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_MAX_CHARS {
        return text.to_string();
    }
    let keep = EXCERPT_MAX_CHARS - ELLIPSIS.len();
    let mut excerpt: String = text.chars().take(keep).collect();
    excerpt.push_str(ELLIPSIS);
    excerpt
}

/// Render retrieved sources as the grounding block.
pub fn build_context(sources: &[DocumentSource]) -> String {
    if sources.is_empty() {
        return NO_RESULTS_CONTEXT.to_string();
    }

    let mut context = String::new();
    for (position, source) in sources.iter().enumerate() {
        context.push_str(&format!("Job {}:\n", position + 1));
        context.push_str(&format!("Title: {}\n", source.title));
        context.push_str(&format!("Company: {}\n", source.company));
        context.push_str(&format!("Location: {}\n", source.location));
        context.push_str(&format!("Description: {}\n", source.excerpt));
        context.push('\n');
    }
    context
}

/// System prompt, then history in order, then the grounded question.
///
/// Turns with unrecognized roles are dropped.
pub fn compose_messages(question: &str, history: &[ChatTurn], context: &str) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::system(SYSTEM_PROMPT));
    messages.extend(history.iter().filter_map(|turn| match &turn.role {
        ChatRole::User => Some(PromptMessage::user(turn.content.clone())),
        ChatRole::Assistant => Some(PromptMessage::assistant(turn.content.clone())),
        ChatRole::Unrecognized(role) => {
            tracing::debug!(role = %role, "Dropping history turn with unrecognized role");
            None
        }
    }));
    messages.push(PromptMessage::user(format!(
        "Context from job descriptions:\n{context}\n\nUser question: {question}"
    )));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::PromptRole;

    fn source(title: &str) -> DocumentSource {
        DocumentSource {
            id: "doc".into(),
            title: title.into(),
            company: "Contoso".into(),
            location: "Berlin".into(),
            excerpt: "Build APIs.".into(),
            score: 1.0,
        }
    }

    #[test]
    fn long_text_is_cut_to_two_hundred_characters() {
        let text = "a".repeat(250);
        let excerpt = truncate_excerpt(&text);
        assert_eq!(excerpt.chars().count(), 200);
        assert!(excerpt.starts_with(&"a".repeat(197)));
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn short_text_is_unchanged() {
        let text = "b".repeat(150);
        assert_eq!(truncate_excerpt(&text), text);
        assert_eq!(truncate_excerpt(&"c".repeat(200)), "c".repeat(200));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let text = "é".repeat(201);
        let excerpt = truncate_excerpt(&text);
        assert_eq!(excerpt.chars().count(), 200);
    }

    #[test]
    fn empty_sources_use_sentinel() {
        assert_eq!(build_context(&[]), NO_RESULTS_CONTEXT);
    }

    #[test]
    fn context_enumerates_sources() {
        let context = build_context(&[source("Engineer"), source("Designer")]);
        assert_eq!(
            context,
            "Job 1:\nTitle: Engineer\nCompany: Contoso\nLocation: Berlin\nDescription: Build APIs.\n\n\
             Job 2:\nTitle: Designer\nCompany: Contoso\nLocation: Berlin\nDescription: Build APIs.\n\n"
        );
    }

    #[test]
    fn history_is_kept_in_order_and_unknown_roles_dropped() {
        let history = vec![
            ChatTurn::new(ChatRole::User, "Any remote jobs?"),
            ChatTurn::new(ChatRole::Unrecognized("tool".into()), "ignored"),
            ChatTurn::new(ChatRole::Assistant, "Two of them."),
        ];
        let messages = compose_messages("Which pays more?", &history, "ctx");

        let roles: Vec<_> = messages.iter().map(|message| message.role).collect();
        assert_eq!(
            roles,
            vec![
                PromptRole::System,
                PromptRole::User,
                PromptRole::Assistant,
                PromptRole::User
            ]
        );
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert_eq!(
            messages[3].content,
            "Context from job descriptions:\nctx\n\nUser question: Which pays more?"
        );
    }
}
