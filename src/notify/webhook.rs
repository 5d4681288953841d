//! Discord-compatible webhook notifier.
//!
//! POSTs `{"content": text}` to the configured URL. Messages longer than
//! the webhook limit are truncated. Failures are logged and dropped.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Notification, Notifier};

/// Discord rejects `content` longer than this.
const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

pub struct WebhookNotifier {
    http: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build webhook HTTP client: {e}"))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    async fn post(&self, content: &str) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(&self.url)
            .json(&WebhookPayload { content })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned {status}: {body}");
        }
        Ok(())
    }
}

/// Cut to the webhook limit on a char boundary.
fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_CONTENT_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_CONTENT_CHARS - 1).collect();
    out.push('…');
    out
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: Notification) {
        let text = clip(&notification.render());
        match self.post(&text).await {
            Ok(()) => debug!(kind = notification.kind(), "Webhook delivered"),
            Err(e) => warn!(kind = notification.kind(), error = %e, "Webhook delivery failed"),
        }
    }
}
