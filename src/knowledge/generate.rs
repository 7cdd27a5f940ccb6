//! Chat transcript construction for answer, revise, and continue.

use crate::error::{GrokError, Result};
use crate::provider::{ChatMessage, ModelProvider};

pub const SYSMSG_CHAT: &str = "You are an expert knowledgable in the provided context.  I will provide you with context, then you will respond with an acknowledgement, then I will ask you a question about the context, then you will provide me with an answer.";

pub const SYSMSG_REVISE: &str = "You are an expert knowledgable in the provided context.  I will provide you with context, then you will respond with an acknowledgement, then I will provide you with a block of text.  You will revise the block of text based on the information in the context, maintaining the same style, vocabulary, and reading level.";

pub const SYSMSG_CONTINUE: &str = "You are an expert knowledgable in the provided context.  I will provide you with context, then you will respond with an acknowledgement, then I will provide you with a block of text.  You will continue the block of text based on the information in the context, maintaining the same style, vocabulary, and reading level.";

pub const CONTEXT_ACK: &str = "Great! I've read the context.";

/// Ask `question` with retrieved `context`.
///
/// With `global`, the model first answers the question from its own
/// knowledge and that reply stays in the transcript ahead of the context.
pub fn generate(
    provider: &dyn ModelProvider,
    model: &str,
    sysmsg: &str,
    question: &str,
    context: &str,
    global: bool,
) -> Result<String> {
    let mut messages = vec![ChatMessage::system(sysmsg)];

    if global {
        messages.push(ChatMessage::user(question));
        let reply = provider.chat(model, &messages)?;
        messages.push(ChatMessage::assistant(reply));
    }

    messages.extend(context_messages(context));
    messages.push(ChatMessage::user(question));

    tracing::debug!(
        model,
        messages = messages.len(),
        context_bytes = context.len(),
        "generating"
    );
    provider
        .chat(model, &messages)
        .map_err(|e| GrokError::Provider(e.context(format!("context length: {}", context.len()))))
}

fn context_messages(context: &str) -> Vec<ChatMessage> {
    if context.is_empty() {
        return Vec::new();
    }
    vec![
        ChatMessage::user(format!("Context:\n\n{context}")),
        ChatMessage::assistant(CONTEXT_ACK),
    ]
}

/// Split revise input whose first paragraph is its own system message.
pub fn split_sysmsg(input: &str) -> Result<&str> {
    match input.split_once("\n\n") {
        Some((sysmsg, _)) => Ok(sysmsg),
        None => Err(GrokError::Input(
            "input must contain at least two paragraphs".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Role;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Transcripts {
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ModelProvider for Transcripts {
        fn create_embeddings(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            unreachable!()
        }

        fn chat(&self, _model: &str, messages: &[ChatMessage]) -> anyhow::Result<String> {
            let mut seen = self.seen.lock().unwrap();
            seen.push(messages.to_vec());
            Ok(format!("reply {}", seen.len()))
        }
    }

    fn roles(messages: &[ChatMessage]) -> Vec<Role> {
        messages.iter().map(|m| m.role).collect()
    }

    #[test]
    fn test_local_with_context() {
        let provider = Transcripts::default();
        let out = generate(&provider, "m", SYSMSG_CHAT, "why?", "facts", false).unwrap();
        assert_eq!(out, "reply 1");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let msgs = &seen[0];
        assert_eq!(
            roles(msgs),
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(msgs[1].content, "Context:\n\nfacts");
        assert_eq!(msgs[2].content, CONTEXT_ACK);
        assert_eq!(msgs[3].content, "why?");
    }

    #[test]
    fn test_empty_context_is_omitted() {
        let provider = Transcripts::default();
        generate(&provider, "m", SYSMSG_CHAT, "why?", "", false).unwrap();
        let seen = provider.seen.lock().unwrap();
        assert_eq!(roles(&seen[0]), vec![Role::System, Role::User]);
    }

    #[test]
    fn test_global_asks_twice() {
        let provider = Transcripts::default();
        let out = generate(&provider, "m", SYSMSG_CHAT, "why?", "facts", true).unwrap();
        assert_eq!(out, "reply 2");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(roles(&seen[0]), vec![Role::System, Role::User]);
        let second = &seen[1];
        assert_eq!(second[2].role, Role::Assistant);
        assert_eq!(second[2].content, "reply 1");
        assert_eq!(second.len(), 6);
    }

    #[test]
    fn test_split_sysmsg() {
        assert_eq!(split_sysmsg("be terse\n\nbody\n\nmore").unwrap(), "be terse");
        assert!(matches!(split_sysmsg("one paragraph"), Err(GrokError::Input(_))));
    }
}
