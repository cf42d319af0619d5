use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::{info, warn};

use common::Notifier;

/// Telegram messages carry at most this many characters.
const MAX_MESSAGE_CHARS: usize = 4096;

/// Sends every notification to the configured Telegram chats.
///
/// Delivery failures are logged per chat and never reach the caller.
pub struct TelegramNotifier {
    bot: Bot,
    chat_ids: Vec<ChatId>,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_ids: &[i64]) -> Self {
        info!(chats = chat_ids.len(), "Telegram notifier configured");
        Self {
            bot: Bot::new(token),
            chat_ids: chat_ids.iter().copied().map(ChatId).collect(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) {
        for chunk in chunks(text, MAX_MESSAGE_CHARS) {
            for &chat_id in &self.chat_ids {
                if let Err(e) = self.bot.send_message(chat_id, chunk.clone()).await {
                    warn!(chat_id = ?chat_id, error = %e, "Failed to send Telegram message");
                }
            }
        }
    }
}

/// Split on character boundaries so no piece exceeds `max` characters.
fn chunks(text: &str, max: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}
