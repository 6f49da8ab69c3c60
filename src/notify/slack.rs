use anyhow::{Context, Result};
use reqwest::Client;

use super::{NotificationMessage, Notifier};

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
}

impl SlackNotifier {
    pub fn new(url: String) -> Self {
        Self {
            webhook_url: url,
            client: Client::new(),
        }
    }
}

/// Plain mrkdwn rendering: bold title, one bullet per field, footer in italics.
pub(crate) fn render_text(msg: &NotificationMessage) -> String {
    let mut text = format!("*{}*", msg.title);
    for f in &msg.fields {
        text.push_str(&format!("\n• *{}*\n{}", f.name, f.value));
    }
    if let Some(footer) = &msg.footer {
        text.push_str(&format!("\n_{footer}_"));
    }
    text
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, msg: &NotificationMessage) -> Result<()> {
        let body = serde_json::json!({ "text": render_text(msg) });

        self.client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_title_fields_and_footer() {
        let msg = NotificationMessage::new("Bad news!", 0xed1c24)
            .field("Error", "portal down")
            .footer("Grades Tracker");
        assert_eq!(
            render_text(&msg),
            "*Bad news!*\n• *Error*\nportal down\n_Grades Tracker_"
        );
    }
}
