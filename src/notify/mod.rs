// src/notify/mod.rs
//! Outbound notifications: a channel-neutral message, the `Notifier` trait,
//! and a multiplexer over the configured webhook channels.

pub mod discord;
pub mod message;
pub mod slack;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::config::TrackerConfig;
use discord::DiscordNotifier;
use slack::SlackNotifier;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationField {
    pub name: String,
    pub value: String,
}

/// Structured message: rendered as an embed on Discord, as text on Slack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationMessage {
    pub title: String,
    pub color: u32,
    pub fields: Vec<NotificationField>,
    pub footer: Option<String>,
}

impl NotificationMessage {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            color,
            fields: Vec::new(),
            footer: None,
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(NotificationField {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(text.into());
        self
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, msg: &NotificationMessage) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Fans a message out to every channel. Succeeds when at least one channel
/// accepted it; each failing channel is logged.
pub struct NotifierMux {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn from_config(cfg: &TrackerConfig) -> Self {
        let mut channels: Vec<Box<dyn Notifier>> = vec![Box::new(
            DiscordNotifier::new(cfg.discord_webhook_url.to_string())
                .with_timeout(cfg.http_timeout.as_secs().max(1))
                .with_thumbnail(cfg.embed_thumbnail_url.as_ref().map(|u| u.to_string())),
        )];
        if let Some(url) = &cfg.slack_webhook_url {
            channels.push(Box::new(SlackNotifier::new(url.to_string())));
        }
        Self::new(channels)
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }
}

#[async_trait]
impl Notifier for NotifierMux {
    async fn send(&self, msg: &NotificationMessage) -> Result<()> {
        if self.channels.is_empty() {
            tracing::debug!(title = %msg.title, "no notification channel configured");
            return Ok(());
        }

        let mut delivered = 0usize;
        let mut last_err = None;
        for ch in &self.channels {
            match ch.send(msg).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(channel = ch.name(), error = %format!("{e:#}"), "notification failed");
                    last_err = Some(e);
                }
            }
        }

        match (delivered, last_err) {
            (0, Some(e)) => Err(e.context("every notification channel failed")),
            (0, None) => Err(anyhow!("no notification channel delivered")),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "mux"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        ok: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Notifier for Fixed {
        async fn send(&self, _msg: &NotificationMessage) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.ok {
                Ok(())
            } else {
                Err(anyhow!("boom"))
            }
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn mux(results: &[bool]) -> (NotifierMux, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let channels = results
            .iter()
            .map(|&ok| {
                Box::new(Fixed {
                    ok,
                    calls: calls.clone(),
                }) as Box<dyn Notifier>
            })
            .collect();
        (NotifierMux::new(channels), calls)
    }

    #[tokio::test]
    async fn one_delivery_is_enough() {
        let msg = NotificationMessage::new("t", 0);
        let (m, calls) = mux(&[false, true]);
        assert!(m.send(&msg).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn all_failing_is_an_error() {
        let msg = NotificationMessage::new("t", 0);
        let (m, _) = mux(&[false, false]);
        let err = m.send(&msg).await.unwrap_err();
        assert!(format!("{err:#}").contains("boom"));
    }
}
