//! Group-chat webhook delivery

use super::AlertSink;
use crate::error::MonitorResult;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Robot message body: markdown content, nobody mentioned
#[derive(Debug, Serialize)]
pub struct AlertPayload<'a> {
    pub msgtype: &'static str,
    pub markdown: MarkdownBody<'a>,
    pub at: Mentions,
}

#[derive(Debug, Serialize)]
pub struct MarkdownBody<'a> {
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub struct Mentions {
    #[serde(rename = "isAtAll")]
    pub is_at_all: bool,
}

impl<'a> AlertPayload<'a> {
    pub fn markdown(content: &'a str) -> Self {
        Self {
            msgtype: "markdown",
            markdown: MarkdownBody { content },
            at: Mentions { is_at_all: false },
        }
    }
}

/// Posts alerts to a single webhook URL. An empty URL disables delivery.
pub struct WebhookSink {
    url: String,
    client: Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> MonitorResult<Self> {
        let client = Client::builder().timeout(DELIVERY_TIMEOUT).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn is_disabled(&self) -> bool {
        self.url.trim().is_empty()
    }

    async fn post(&self, content: &str) -> MonitorResult<(StatusCode, String)> {
        let response = self
            .client
            .post(&self.url)
            .json(&AlertPayload::markdown(content))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok((status, body))
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn deliver(&self, content: &str) -> bool {
        if self.is_disabled() {
            warn!("webhook not configured, alert not sent");
            return true;
        }

        match self.post(content).await {
            Ok((StatusCode::OK, _)) => {
                info!("✅ alert delivered");
                true
            }
            Ok((status, body)) => {
                error!(status = %status, body = %body, "webhook rejected alert");
                false
            }
            Err(e) => {
                error!(error = %e, "webhook delivery failed");
                false
            }
        }
    }
}
