//! Telegram transport — long-polls the Bot API for updates and delivers
//! outgoing messages, implementing the `Messenger` capability.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tracing::{info, warn};

use crate::error::MessengerError;
use crate::flows::Event;
use crate::messenger::{InlineKeyboard, Messenger};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Legacy Markdown: tolerant, used for composed conversational replies.
const PARSE_MODE_MARKDOWN: &str = "Markdown";
/// MarkdownV2: strict mode matching the `escape_markdown` character set;
/// text escaped with it must be sent in this mode or the backslashes
/// render literally.
const PARSE_MODE_MARKDOWN_V2: &str = "MarkdownV2";

/// One inbound update, reduced to what the router needs.
#[derive(Debug, Clone)]
pub struct TelegramUpdate {
    pub user_id: String,
    pub event: Event,
}

pub type UpdateStream = Pin<Box<dyn Stream<Item = TelegramUpdate> + Send>>;

/// Telegram bot client over the HTTP Bot API.
pub struct TelegramBot {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramBot {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    /// Start long-polling and return the stream of inbound updates.
    ///
    /// Text messages become `Event::Text`; callback queries are answered
    /// immediately (to stop the client spinner) and become `Event::Choice`.
    pub fn updates(&self) -> UpdateStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            info!("Telegram transport listening for updates...");

            loop {
                let url = format!("https://api.telegram.org/bot{bot_token}/getUpdates");
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                if let Some(results) = data.get("result").and_then(serde_json::Value::as_array) {
                    for update in results {
                        // Advance offset past this update
                        if let Some(uid) =
                            update.get("update_id").and_then(serde_json::Value::as_i64)
                        {
                            offset = uid + 1;
                        }

                        let Some(parsed) = parse_update(update) else {
                            continue;
                        };

                        // Acknowledge button presses so the client stops
                        // showing a spinner.
                        if let Some(callback_id) =
                            update.get("callback_query").and_then(|q| q.get("id"))
                        {
                            let _ = client
                                .post(format!(
                                    "https://api.telegram.org/bot{bot_token}/answerCallbackQuery"
                                ))
                                .json(&serde_json::json!({ "callback_query_id": callback_id }))
                                .send()
                                .await;
                        }

                        if tx.send(parsed).is_err() {
                            info!("Telegram update channel closed");
                            return;
                        }
                    }
                }
            }
        });

        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        }))
    }

    /// Send a text message in the given parse mode with plain text
    /// fallback. Splits messages that exceed Telegram's 4096 char limit.
    async fn send_text(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), MessengerError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.iter().enumerate() {
            // The keyboard rides on the final chunk only.
            let kb = if i == last { keyboard } else { None };
            self.send_chunk(chat_id, chunk, parse_mode, kb).await?;
        }
        Ok(())
    }

    /// Send a single chunk (≤4096 chars), markup-first with fallback.
    async fn send_chunk(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), MessengerError> {
        let markup_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&message_body(chat_id, text, Some(parse_mode), keyboard))
            .send()
            .await
            .map_err(|e| MessengerError::SendFailed {
                recipient: chat_id.to_string(),
                reason: e.to_string(),
            })?;

        if markup_resp.status().is_success() {
            return Ok(());
        }
        if markup_resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MessengerError::RateLimited {
                recipient: chat_id.to_string(),
            });
        }

        let markup_status = markup_resp.status();
        warn!(
            status = ?markup_status,
            parse_mode,
            "Telegram sendMessage with markup failed; retrying without parse_mode"
        );

        // Retry without parse_mode
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&message_body(chat_id, text, None, keyboard))
            .send()
            .await
            .map_err(|e| MessengerError::SendFailed {
                recipient: chat_id.to_string(),
                reason: e.to_string(),
            })?;

        if plain_resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MessengerError::RateLimited {
                recipient: chat_id.to_string(),
            });
        }
        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(MessengerError::SendFailed {
                recipient: chat_id.to_string(),
                reason: format!(
                    "sendMessage failed (markup: {markup_status}, plain: {plain_err})"
                ),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Messenger for TelegramBot {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), MessengerError> {
        self.send_text(recipient, text, PARSE_MODE_MARKDOWN, None).await
    }

    async fn send_with_keyboard(
        &self,
        recipient: &str,
        text: &str,
        keyboard: &InlineKeyboard,
    ) -> Result<(), MessengerError> {
        self.send_text(recipient, text, PARSE_MODE_MARKDOWN, Some(keyboard))
            .await
    }

    /// Escaped text targets MarkdownV2; sending it in legacy Markdown
    /// would show the escape backslashes to the recipient.
    async fn send_formatted(
        &self,
        recipient: &str,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), MessengerError> {
        self.send_text(recipient, text, PARSE_MODE_MARKDOWN_V2, keyboard)
            .await
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Reduce a raw getUpdates entry to a routed update. Returns `None` for
/// update kinds the bot does not handle.
fn parse_update(update: &serde_json::Value) -> Option<TelegramUpdate> {
    if let Some(message) = update.get("message") {
        let text = message.get("text").and_then(serde_json::Value::as_str)?;
        let user_id = message
            .get("from")
            .and_then(|f| f.get("id"))
            .and_then(serde_json::Value::as_i64)?;
        return Some(TelegramUpdate {
            user_id: user_id.to_string(),
            event: Event::Text(text.to_string()),
        });
    }

    if let Some(query) = update.get("callback_query") {
        let data = query.get("data").and_then(serde_json::Value::as_str)?;
        let user_id = query
            .get("from")
            .and_then(|f| f.get("id"))
            .and_then(serde_json::Value::as_i64)?;
        return Some(TelegramUpdate {
            user_id: user_id.to_string(),
            event: Event::Choice(data.to_string()),
        });
    }

    None
}

/// Build a sendMessage payload.
fn message_body(
    chat_id: &str,
    text: &str,
    parse_mode: Option<&str>,
    keyboard: Option<&InlineKeyboard>,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "chat_id": chat_id,
        "text": text,
    });
    if let Some(mode) = parse_mode {
        body["parse_mode"] = serde_json::Value::String(mode.to_string());
    }
    if let Some(kb) = keyboard {
        body["reply_markup"] = keyboard_json(kb);
    }
    body
}

/// Serialize an inline keyboard into Telegram's reply_markup shape.
fn keyboard_json(keyboard: &InlineKeyboard) -> serde_json::Value {
    let rows: Vec<Vec<serde_json::Value>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| {
                    serde_json::json!({
                        "text": b.label,
                        "callback_data": b.data,
                    })
                })
                .collect()
        })
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts at a char
/// boundary (messages here are mostly Arabic, so byte offsets may not
/// be boundaries).
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let boundary = floor_char_boundary(remaining, max_len);
        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(boundary);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { boundary } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

/// Largest char boundary at or below `index`.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::Button;

    #[test]
    fn api_url_embeds_token_and_method() {
        let bot = TelegramBot::new("123:ABC".into());
        assert_eq!(
            bot.api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
        assert_eq!(
            bot.api_url("sendMessage"),
            "https://api.telegram.org/bot123:ABC/sendMessage"
        );
    }

    // ── Update parsing ──────────────────────────────────────────────

    #[test]
    fn parse_update_text_message() {
        let update = serde_json::json!({
            "update_id": 1,
            "message": {
                "from": { "id": 123456789 },
                "chat": { "id": 123456789 },
                "text": "hello"
            }
        });
        let parsed = parse_update(&update).unwrap();
        assert_eq!(parsed.user_id, "123456789");
        assert_eq!(parsed.event, Event::Text("hello".into()));
    }

    #[test]
    fn parse_update_callback_query() {
        let update = serde_json::json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb1",
                "from": { "id": 42 },
                "data": "year:2 متوسط"
            }
        });
        let parsed = parse_update(&update).unwrap();
        assert_eq!(parsed.user_id, "42");
        assert_eq!(parsed.event, Event::Choice("year:2 متوسط".into()));
    }

    #[test]
    fn parse_update_ignores_non_text_messages() {
        let update = serde_json::json!({
            "update_id": 3,
            "message": {
                "from": { "id": 7 },
                "sticker": { "file_id": "abc" }
            }
        });
        assert!(parse_update(&update).is_none());
    }

    #[test]
    fn parse_update_ignores_unknown_kinds() {
        let update = serde_json::json!({ "update_id": 4, "edited_message": {} });
        assert!(parse_update(&update).is_none());
    }

    // ── Payload construction ────────────────────────────────────────

    #[test]
    fn message_body_parse_modes() {
        let plain = message_body("42", "hi", None, None);
        assert!(plain.get("parse_mode").is_none());

        let legacy = message_body("42", "hi", Some(PARSE_MODE_MARKDOWN), None);
        assert_eq!(legacy["parse_mode"], "Markdown");

        let strict = message_body("42", "1\\. hi\\!", Some(PARSE_MODE_MARKDOWN_V2), None);
        assert_eq!(strict["parse_mode"], "MarkdownV2");
        assert_eq!(strict["text"], "1\\. hi\\!");
    }

    #[test]
    fn message_body_attaches_keyboard() {
        let kb = InlineKeyboard::new(vec![vec![Button::new("تأكيد", "bc:confirm")]]);
        let body = message_body("42", "hi", Some(PARSE_MODE_MARKDOWN), Some(&kb));
        assert_eq!(
            body["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "bc:confirm"
        );
    }

    // ── Keyboard serialization ──────────────────────────────────────

    #[test]
    fn keyboard_json_shape() {
        let kb = InlineKeyboard::new(vec![
            vec![Button::new("طالب", "role:student")],
            vec![Button::new("ولي أمر", "role:parent")],
        ]);
        let json = keyboard_json(&kb);
        assert_eq!(json["inline_keyboard"][0][0]["text"], "طالب");
        assert_eq!(json["inline_keyboard"][0][0]["callback_data"], "role:student");
        assert_eq!(json["inline_keyboard"][1][0]["callback_data"], "role:parent");
    }

    // ── Message splitting ───────────────────────────────────────────

    #[test]
    fn split_message_short() {
        let chunks = split_message("Hello", 4096);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(2000));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_respects_char_boundaries() {
        // Arabic chars are 2 bytes; an odd byte limit falls mid-char.
        let msg = "م".repeat(50);
        let chunks = split_message(&msg, 17);
        assert!(chunks.iter().all(|c| c.len() <= 17));
        assert_eq!(chunks.concat(), msg);
    }
}
