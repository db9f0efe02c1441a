//! Message sink backed by the Telegram Bot API.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use tracing::debug;
use war_core::{Notifier, NotifyError};

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_notification: bool,
}

pub struct TelegramNotifier {
    http: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(
        base_url: &str,
        bot_token: &str,
        chat_id: &str,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| NotifyError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            endpoint: send_message_url(base_url, bot_token),
            chat_id: chat_id.to_string(),
        })
    }
}

fn send_message_url(base_url: &str, bot_token: &str) -> String {
    format!("{}/bot{}/sendMessage", base_url.trim_end_matches('/'), bot_token)
}

impl Notifier for TelegramNotifier {
    fn send(&self, text: &str, silent: bool) -> Result<(), NotifyError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
                parse_mode: "HTML",
                disable_notification: silent,
            })
            .send()
            .map_err(|err| NotifyError::Transport(err.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            let snippet: String = body.chars().take(256).collect();
            return Err(NotifyError::Rejected(format!("{status}: {snippet}")));
        }
        debug!(target: "war_monitor::http", silent, "sink.delivered");
        Ok(())
    }
}
