use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};

use crate::config::TelegramConfig;
use crate::domain::port::Notifier;

/// Telegram bot sink. Fire-and-forget: unconfigured credentials make it a
/// silent no-op, and delivery failures are logged and swallowed so they can
/// never stall or fail an update pass.
pub struct TelegramNotifier {
    client: reqwest::Client,
    credentials: Option<(String, String)>,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        let credentials = match (&config.bot_token, &config.chat_id) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Some((token.clone(), chat.clone()))
            }
            _ => None,
        };
        TelegramNotifier {
            client: reqwest::Client::new(),
            credentials,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) {
        let Some((token, chat_id)) = &self.credentials else {
            debug!("Notification sink not configured, dropping: {message}");
            return;
        };
        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let params = [
            ("chat_id", chat_id.as_str()),
            ("text", message),
            ("parse_mode", "Markdown"),
        ];
        let request = self
            .client
            .post(&url)
            .form(&params)
            .timeout(Duration::from_secs(10));
        match request.send().await {
            Ok(response) if !response.status().is_success() => {
                error!("Telegram rejected notification: {}", response.status());
            }
            Ok(_) => {}
            Err(e) => error!("Telegram notification failed: {e}"),
        }
    }
}
