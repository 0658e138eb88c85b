//! Telegram delivery backend.
//!
//! Wraps a teloxide `Bot` behind [`DeliveryBackend`] so the engine can be
//! driven against a recording backend in tests. Send-only: there is no
//! dispatcher or polling loop, each run is a short-lived process.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, PollType, Recipient};
use tracing::debug;

use orbit_core::config::TelegramConfig;

use crate::error::TelegramError;

/// Telegram caps quiz questions at 300 characters; keep a margin.
const POLL_QUESTION_MAX: usize = 290;
/// Option limit is 100 characters.
const POLL_OPTION_MAX: usize = 97;
/// Explanation limit is 200 characters.
const POLL_EXPLANATION_MAX: usize = 190;

/// A quiz poll with Telegram's length limits already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollMessage {
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: u8,
    pub explanation: String,
}

impl PollMessage {
    /// Build a quiz poll, truncating every field to the transport limits.
    pub fn quiz(
        question: &str,
        options: &[String],
        correct_index: u8,
        explanation: &str,
    ) -> Self {
        Self {
            question: truncate_chars(question, POLL_QUESTION_MAX),
            options: options
                .iter()
                .map(|o| truncate_chars(o, POLL_OPTION_MAX))
                .collect(),
            correct_index,
            explanation: truncate_chars(explanation, POLL_EXPLANATION_MAX),
        }
    }
}

/// Cut `text` to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Outbound surface used by the delivery layer. One call is one API request.
#[async_trait]
pub trait DeliveryBackend: Send + Sync {
    /// Send `text` to `destination`, as HTML when `rich` is set.
    async fn send_message(
        &self,
        destination: &str,
        text: &str,
        rich: bool,
    ) -> Result<(), TelegramError>;

    /// Send a quiz-style poll to `destination`.
    async fn send_poll(&self, destination: &str, poll: &PollMessage) -> Result<(), TelegramError>;
}

/// Bot API backend.
pub struct TelegramBackend {
    bot: Bot,
}

impl TelegramBackend {
    pub fn new(config: &TelegramConfig) -> Result<Self, TelegramError> {
        let token = config.bot_token.trim();
        if token.is_empty() {
            return Err(TelegramError::NoToken);
        }
        Ok(Self {
            bot: Bot::new(token),
        })
    }
}

/// Numeric chat IDs (channels usually start with -100) or `@channelusername`.
fn recipient(destination: &str) -> Result<Recipient, TelegramError> {
    let destination = destination.trim();
    if let Ok(id) = destination.parse::<i64>() {
        return Ok(Recipient::Id(ChatId(id)));
    }
    if destination.len() > 1 && destination.starts_with('@') {
        return Ok(Recipient::ChannelUsername(destination.to_string()));
    }
    Err(TelegramError::InvalidDestination(destination.to_string()))
}

#[async_trait]
impl DeliveryBackend for TelegramBackend {
    async fn send_message(
        &self,
        destination: &str,
        text: &str,
        rich: bool,
    ) -> Result<(), TelegramError> {
        let chat = recipient(destination)?;
        let request = self.bot.send_message(chat, text);
        if rich {
            request.parse_mode(ParseMode::Html).await?;
        } else {
            request.await?;
        }
        debug!(destination, chars = text.len(), rich, "telegram: message sent");
        Ok(())
    }

    async fn send_poll(&self, destination: &str, poll: &PollMessage) -> Result<(), TelegramError> {
        let chat = recipient(destination)?;
        self.bot
            .send_poll(chat, poll.question.clone(), poll.options.clone())
            .type_(PollType::Quiz)
            .correct_option_id(poll.correct_index)
            .explanation(poll.explanation.clone())
            .await?;
        debug!(destination, "telegram: poll sent");
        Ok(())
    }
}
