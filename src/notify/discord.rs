use super::{NotificationMessage, Notifier};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

// Discord webhook limits
const MAX_FIELDS_PER_EMBED: usize = 25;
const MAX_EMBEDS_PER_MESSAGE: usize = 10;
const MAX_TITLE: usize = 256;
const MAX_FOOTER: usize = 2048;
const MAX_FIELD_NAME: usize = 256;
const MAX_FIELD_VALUE: usize = 1024;
/// Title, field and footer text summed over every embed of one message.
const MAX_MESSAGE_CHARS: usize = 6000;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    thumbnail: Option<String>,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
            thumbnail: None,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    /// Image shown in the corner of every embed (e.g. the portal logo).
    pub fn with_thumbnail(mut self, url: Option<String>) -> Self {
        self.thumbnail = url;
        self
    }

    /// POST one payload. Transport errors, 429 and 5xx are retried with
    /// 500ms, 1s, 2s... backoff; any other status fails at once.
    async fn post(&self, payload: &DiscordWebhookPayload) -> Result<()> {
        let mut attempt: u8 = 1;
        loop {
            let (err, retryable) = match self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await
            {
                Ok(rsp) if rsp.status().is_success() => return Ok(()),
                Ok(rsp) => {
                    let status = rsp.status();
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    (anyhow!("Discord webhook HTTP error: {status}"), retryable)
                }
                Err(e) => (anyhow!("Discord webhook request failed: {e}"), true),
            };

            if !retryable || attempt >= self.max_retries {
                return Err(err);
            }
            tracing::debug!(attempt, error = %err, "retrying Discord webhook");
            tokio::time::sleep(backoff(attempt)).await;
            attempt += 1;
        }
    }
}

fn backoff(attempt: u8) -> Duration {
    Duration::from_millis(500u64 << (attempt.saturating_sub(1)).min(6))
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, msg: &NotificationMessage) -> Result<()> {
        let payloads = DiscordWebhookPayload::from_message(msg, self.thumbnail.as_deref());
        for (i, payload) in payloads.iter().enumerate() {
            self.post(payload)
                .await
                .with_context(|| format!("Discord message {}/{}", i + 1, payloads.len()))?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[derive(Debug, Clone, Serialize)]
struct DiscordEmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Clone, Serialize)]
struct DiscordEmbedFooter {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
struct DiscordEmbedThumbnail {
    url: String,
}

#[derive(Debug, Clone, Serialize)]
struct DiscordEmbed {
    title: String,
    color: u32,
    fields: Vec<DiscordEmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<DiscordEmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<DiscordEmbedThumbnail>,
}

#[derive(Debug, Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    /// Packs fields greedily. A new embed starts at 25 fields; a new webhook
    /// call starts at 10 embeds or when the next field would push the
    /// message past 6000 characters. Every embed repeats title and footer.
    fn from_message(msg: &NotificationMessage, thumbnail: Option<&str>) -> Vec<Self> {
        let blank = DiscordEmbed {
            title: truncate(&msg.title, MAX_TITLE),
            color: msg.color,
            fields: Vec::new(),
            footer: msg.footer.as_ref().map(|text| DiscordEmbedFooter {
                text: truncate(text, MAX_FOOTER),
            }),
            thumbnail: thumbnail.map(|url| DiscordEmbedThumbnail { url: url.to_string() }),
        };
        let header = blank.title.chars().count()
            + blank.footer.as_ref().map_or(0, |f| f.text.chars().count());

        let mut payloads = Vec::new();
        let mut embeds = vec![blank.clone()];
        let mut used = header;

        for f in &msg.fields {
            let field = DiscordEmbedField {
                name: truncate(&f.name, MAX_FIELD_NAME),
                value: truncate(&f.value, MAX_FIELD_VALUE),
                inline: false,
            };
            let cost = field.name.chars().count() + field.value.chars().count();

            let embed_full = embeds
                .last()
                .map_or(true, |e| e.fields.len() >= MAX_FIELDS_PER_EMBED);
            if embed_full || used + cost > MAX_MESSAGE_CHARS {
                if embeds.len() >= MAX_EMBEDS_PER_MESSAGE || used + header + cost > MAX_MESSAGE_CHARS {
                    payloads.push(Self {
                        content: None,
                        embeds: std::mem::take(&mut embeds),
                    });
                    used = 0;
                }
                embeds.push(blank.clone());
                used += header;
            }

            if let Some(embed) = embeds.last_mut() {
                embed.fields.push(field);
            }
            used += cost;
        }

        payloads.push(Self {
            content: None,
            embeds,
        });
        payloads
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grades::tests::grade;
    use crate::grades::FingerprintedGrade;
    use crate::notify::message;

    fn message_with(n: usize) -> NotificationMessage {
        (0..n).fold(NotificationMessage::new("New", 0x06d6a0).footer("f"), |m, i| {
            m.field(format!("name {i}"), "value")
        })
    }

    #[test]
    fn small_message_is_one_embed() {
        let payloads = DiscordWebhookPayload::from_message(&message_with(3), None);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].embeds.len(), 1);
        assert_eq!(payloads[0].embeds[0].fields.len(), 3);

        let json = serde_json::to_value(&payloads[0]).unwrap();
        assert_eq!(json["embeds"][0]["color"], 0x06d6a0);
        assert_eq!(json["embeds"][0]["footer"]["text"], "f");
    }

    #[test]
    fn fields_are_split_by_discord_limits() {
        let payloads = DiscordWebhookPayload::from_message(&message_with(26), None);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].embeds.len(), 2);
        assert_eq!(payloads[0].embeds[1].fields.len(), 1);

        let payloads = DiscordWebhookPayload::from_message(&message_with(25 * 10 + 1), None);
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[1].embeds.len(), 1);
    }

    #[test]
    fn message_without_fields_still_posts_one_embed() {
        let payloads = DiscordWebhookPayload::from_message(&message_with(0), None);
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].embeds[0].fields.is_empty());
    }

    fn message_chars(payload: &DiscordWebhookPayload) -> usize {
        payload
            .embeds
            .iter()
            .map(|e| {
                e.title.chars().count()
                    + e.footer.as_ref().map_or(0, |f| f.text.chars().count())
                    + e.fields
                        .iter()
                        .map(|f| f.name.chars().count() + f.value.chars().count())
                        .sum::<usize>()
            })
            .sum()
    }

    #[test]
    fn a_semester_of_grades_stays_under_the_message_size_cap() {
        let grades: Vec<FingerprintedGrade> = (0..100)
            .map(|i| {
                let mut g = grade(&i.to_string(), Some(11.25));
                g.evaluation = format!("Contrôle continu n°{i} - travaux pratiques");
                g.comment = "Bon travail, attention à la rédaction des réponses".into();
                FingerprintedGrade::new(g)
            })
            .collect();
        let payloads = DiscordWebhookPayload::from_message(&message::new_grades(&grades), None);

        assert!(payloads.len() > 1);
        for (i, p) in payloads.iter().enumerate() {
            let chars = message_chars(p);
            assert!(chars <= MAX_MESSAGE_CHARS, "payload {i} has {chars} chars");
            assert!(p.embeds.len() <= MAX_EMBEDS_PER_MESSAGE);
            assert!(p.embeds.iter().all(|e| !e.fields.is_empty()
                && e.fields.len() <= MAX_FIELDS_PER_EMBED));
        }

        // nothing dropped, order kept
        let sent: Vec<&str> = payloads
            .iter()
            .flat_map(|p| &p.embeds)
            .flat_map(|e| &e.fields)
            .map(|f| f.value.as_str())
            .collect();
        assert_eq!(sent.len(), 100);
        assert!(sent[0].contains("n°0 "));
        assert!(sent[99].contains("n°99 "));
    }

    #[test]
    fn oversized_fields_spill_into_a_second_message() {
        let msg = (0..5).fold(NotificationMessage::new("t", 0), |m, i| {
            m.field(format!("{i}").repeat(300), "v".repeat(2000))
        });
        let payloads = DiscordWebhookPayload::from_message(&msg, None);
        // 1280 chars per field after truncation: four fit in 6000, the fifth spills
        assert_eq!(payloads.len(), 2);
        assert!(payloads.iter().all(|p| message_chars(p) <= MAX_MESSAGE_CHARS));
    }

    #[test]
    fn thumbnail_is_attached_to_every_embed() {
        let payloads =
            DiscordWebhookPayload::from_message(&message_with(30), Some("https://portal/logo.png"));
        let json = serde_json::to_value(&payloads[0]).unwrap();
        assert_eq!(json["embeds"][0]["thumbnail"]["url"], "https://portal/logo.png");
        assert_eq!(json["embeds"][1]["thumbnail"]["url"], "https://portal/logo.png");

        let json = serde_json::to_value(&DiscordWebhookPayload::from_message(&message_with(1), None)[0])
            .unwrap();
        assert!(json["embeds"][0].get("thumbnail").is_none());
    }

    #[test]
    fn backoff_doubles_from_half_a_second() {
        assert_eq!(backoff(1), Duration::from_millis(500));
        assert_eq!(backoff(3), Duration::from_secs(2));
    }

    #[test]
    fn long_values_are_truncated() {
        let long = "x".repeat(2000);
        let out = truncate(&long, MAX_FIELD_VALUE);
        assert_eq!(out.chars().count(), MAX_FIELD_VALUE);
        assert!(out.ends_with('…'));
    }
}
