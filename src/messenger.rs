//! Outbound delivery abstraction and inline keyboard value types.

use async_trait::async_trait;

use crate::error::MessengerError;

/// A single inline keyboard button: visible label plus callback data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Rows of inline buttons attached to an outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<Button>>,
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }

    pub fn push_row(&mut self, row: Vec<Button>) {
        self.rows.push(row);
    }

    /// Flattened iterator over all buttons, row by row.
    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }
}

/// Delivers one text message to one recipient identifier.
///
/// Conversational replies use `send` / `send_with_keyboard`; text that has
/// been escaped with [`crate::validation::escape_markdown`] goes through
/// `send_formatted`, which real transports deliver in the strict markup
/// mode the escape set targets.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, recipient: &str, text: &str) -> Result<(), MessengerError>;

    async fn send_with_keyboard(
        &self,
        recipient: &str,
        text: &str,
        keyboard: &InlineKeyboard,
    ) -> Result<(), MessengerError>;

    /// Deliver pre-escaped markup text. The default falls back to the
    /// plain send paths for transports without a markup mode.
    async fn send_formatted(
        &self,
        recipient: &str,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), MessengerError> {
        match keyboard {
            Some(kb) => self.send_with_keyboard(recipient, text, kb).await,
            None => self.send(recipient, text).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Recording messenger used by flow and router tests.

    use std::sync::Mutex;

    use super::*;

    /// One recorded outbound message.
    #[derive(Debug, Clone)]
    pub struct SentMessage {
        pub recipient: String,
        pub text: String,
        pub keyboard: Option<InlineKeyboard>,
        /// Whether the message went through the escaped-markup path.
        pub formatted: bool,
    }

    /// What a scripted send should do.
    #[derive(Debug, Clone, Copy)]
    pub enum SendScript {
        Ok,
        Fail,
        RateLimited,
    }

    /// Messenger that records every send and can fail on demand.
    ///
    /// `script` entries apply to successive `send` calls; once exhausted,
    /// sends succeed.
    #[derive(Default)]
    pub struct RecordingMessenger {
        pub sent: Mutex<Vec<SentMessage>>,
        pub script: Mutex<Vec<SendScript>>,
    }

    impl RecordingMessenger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_script(script: Vec<SendScript>) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                script: Mutex::new(script),
            }
        }

        pub fn sent_messages(&self) -> Vec<SentMessage> {
            self.sent.lock().unwrap().clone()
        }

        /// All recorded texts sent to a given recipient.
        pub fn texts_to(&self, recipient: &str) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.recipient == recipient)
                .map(|m| m.text.clone())
                .collect()
        }

        fn next_script(&self) -> SendScript {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                SendScript::Ok
            } else {
                script.remove(0)
            }
        }

        fn record(
            &self,
            recipient: &str,
            text: &str,
            keyboard: Option<&InlineKeyboard>,
            formatted: bool,
        ) {
            self.sent.lock().unwrap().push(SentMessage {
                recipient: recipient.to_string(),
                text: text.to_string(),
                keyboard: keyboard.cloned(),
                formatted,
            });
        }

        fn scripted_result(&self, recipient: &str) -> Result<(), MessengerError> {
            match self.next_script() {
                SendScript::Ok => Ok(()),
                SendScript::Fail => Err(MessengerError::SendFailed {
                    recipient: recipient.to_string(),
                    reason: "scripted failure".into(),
                }),
                SendScript::RateLimited => Err(MessengerError::RateLimited {
                    recipient: recipient.to_string(),
                }),
            }
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send(&self, recipient: &str, text: &str) -> Result<(), MessengerError> {
            self.record(recipient, text, None, false);
            self.scripted_result(recipient)
        }

        async fn send_with_keyboard(
            &self,
            recipient: &str,
            text: &str,
            keyboard: &InlineKeyboard,
        ) -> Result<(), MessengerError> {
            self.record(recipient, text, Some(keyboard), false);
            Ok(())
        }

        async fn send_formatted(
            &self,
            recipient: &str,
            text: &str,
            keyboard: Option<&InlineKeyboard>,
        ) -> Result<(), MessengerError> {
            self.record(recipient, text, keyboard, true);
            if keyboard.is_some() {
                return Ok(());
            }
            self.scripted_result(recipient)
        }
    }
}
