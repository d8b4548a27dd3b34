use std::sync::Arc;

use crate::providers::{ChatMessage, ChatModel};

/// Longest title kept as-is; anything longer is cut and given an ellipsis.
const MAX_TITLE_LEN: usize = 50;
const TRUNCATED_LEN: usize = 47;
/// How much of each message is quoted in the prompt.
const PROMPT_EXCERPT: usize = 500;
/// Words taken from the user message when generation fails.
const FALLBACK_WORDS: usize = 5;

const DEFAULT_TITLE: &str = "New Chat";

/// Names a conversation from its first exchange.
pub struct TitleGenerator {
    model: Arc<dyn ChatModel>,
}

impl TitleGenerator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        TitleGenerator { model }
    }

    /// Ask the model for a short title. Never fails: a model error falls
    /// back to the opening words of the user message.
    pub async fn title(&self, user_message: &str, ai_response: &str) -> String {
        let prompt = format!(
            "Based on this conversation, generate a very short, concise title (3-6 words max).\nThe title should capture the main topic or question being discussed.\nDo NOT include quotes, periods, or any punctuation at the end.\nJust return the title text, nothing else.\n\nUser: {}\nAssistant: {}\n\nTitle:",
            truncate_chars(user_message, PROMPT_EXCERPT),
            truncate_chars(ai_response, PROMPT_EXCERPT)
        );

        let messages = [ChatMessage::user(prompt)];
        match self.model.complete(&messages).await {
            Ok(raw) => clean_title(&raw),
            Err(_) => fallback_title(user_message),
        }
    }
}

/// Strip the decorations models like to add, then cap the length.
fn clean_title(raw: &str) -> String {
    let title = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim_matches('.');

    if title.chars().count() > MAX_TITLE_LEN {
        let truncated: String = title.chars().take(TRUNCATED_LEN).collect();
        return format!("{}...", truncated);
    }

    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title.to_string()
    }
}

fn fallback_title(user_message: &str) -> String {
    let words: Vec<&str> = user_message.split_whitespace().take(FALLBACK_WORDS).collect();
    let title = truncate_chars(&words.join(" "), MAX_TITLE_LEN);
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;

    struct FixedModel {
        reply: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    impl FixedModel {
        fn new(reply: &'static str) -> Arc<Self> {
            Arc::new(FixedModel {
                reply,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for FixedModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push(messages[0].content.clone());
            Ok(self.reply.to_string())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            Err(anyhow::anyhow!("model unavailable"))
        }
    }

    #[tokio::test]
    async fn test_strips_quotes_and_trailing_period() {
        let generator = TitleGenerator::new(FixedModel::new("\"RAG Explained.\""));
        let title = generator.title("What is RAG?", "It stands for...").await;
        assert_eq!(title, "RAG Explained");
    }

    #[tokio::test]
    async fn test_long_titles_are_truncated() {
        let long: &'static str =
            "This generated title is much longer than anyone would ever want to read";
        let generator = TitleGenerator::new(FixedModel::new(long));
        let title = generator.title("question", "answer").await;

        assert_eq!(title.chars().count(), MAX_TITLE_LEN);
        assert!(title.ends_with("..."));
        assert!(long.starts_with(title.trim_end_matches("...")));
    }

    #[tokio::test]
    async fn test_empty_output_becomes_default() {
        let generator = TitleGenerator::new(FixedModel::new("  \"\"  "));
        let title = generator.title("question", "answer").await;
        assert_eq!(title, DEFAULT_TITLE);
    }

    #[tokio::test]
    async fn test_fallback_takes_first_words() {
        let generator = TitleGenerator::new(Arc::new(FailingModel));
        let title = generator
            .title("How do I configure the database connection pool", "...")
            .await;
        assert_eq!(title, "How do I configure the");
    }

    #[tokio::test]
    async fn test_fallback_empty_message_becomes_default() {
        let generator = TitleGenerator::new(Arc::new(FailingModel));
        let title = generator.title("   ", "...").await;
        assert_eq!(title, DEFAULT_TITLE);
    }

    #[tokio::test]
    async fn test_prompt_quotes_truncated_excerpts() {
        let model = FixedModel::new("Title");
        let generator = TitleGenerator::new(model.clone());

        let long_message: String = "x".repeat(600);
        generator.title(&long_message, "short").await;

        let prompt = model.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains(&"x".repeat(PROMPT_EXCERPT)));
        assert!(!prompt.contains(&"x".repeat(PROMPT_EXCERPT + 1)));
        assert!(prompt.ends_with("\n\nTitle:"));
    }
}
