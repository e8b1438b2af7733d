//! Delivery of client and provider messages through a bot-style chat API.

use std::time::Duration;

use async_trait::async_trait;
use lineup_core::config::MessengerConfig;
use lineup_core::{Notification, Notifier, NoopNotifier, NotifyError};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

/// POSTs `{chat_id, text}` to `{api_base_url}/bot{token}/sendMessage`.
#[derive(Clone)]
pub struct MessengerNotifier {
    client: Client,
    api_base_url: String,
    bot_token: SecretString,
}

impl MessengerNotifier {
    pub fn new(config: &MessengerConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base_url, self.bot_token.expose_secret())
    }
}

#[async_trait]
impl Notifier for MessengerNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let text = notification.text();
        let response = self
            .client
            .post(self.endpoint())
            .json(&SendMessage { chat_id: notification.recipient.0, text: &text })
            .send()
            .await
            // without_url keeps the bot token out of logged errors
            .map_err(|error| NotifyError::Transport(error.without_url().to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            // chat not found / bot blocked by the user
            StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN => {
                Err(NotifyError::Unreachable(notification.recipient))
            }
            status => Err(NotifyError::Transport(format!("messenger API returned {status}"))),
        }
    }
}

/// The notifier the server wires in, chosen from `messenger.enabled`.
#[derive(Clone)]
pub enum OutboundNotifier {
    Messenger(MessengerNotifier),
    Disabled(NoopNotifier),
}

impl OutboundNotifier {
    pub fn from_config(config: &MessengerConfig) -> Result<Self, reqwest::Error> {
        if config.enabled {
            Ok(Self::Messenger(MessengerNotifier::new(config)?))
        } else {
            Ok(Self::Disabled(NoopNotifier))
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::Messenger(_) => "messenger",
            Self::Disabled(_) => "disabled",
        }
    }
}

#[async_trait]
impl Notifier for OutboundNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        match self {
            Self::Messenger(notifier) => notifier.deliver(notification).await,
            Self::Disabled(notifier) => notifier.deliver(notification).await,
        }
    }
}
