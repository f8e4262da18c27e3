use anyhow::{Context, Result};
use serde_json::json;
use std::time::Duration;

use crate::alert::config::AlertChannelConfig;
use crate::alert::dispatch::AlertChannel;
use crate::alert::message::AlertMessage;

const CHANNEL_ID: &str = "webhook";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Posts alerts as JSON to a URL taken from the channel config document.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    http: reqwest::Client,
}

impl WebhookChannel {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build webhook http client")?;
        Ok(Self { http })
    }

    fn url_from(config: &AlertChannelConfig) -> Result<&str> {
        config
            .config
            .get("url")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .context("webhook config is missing a url")
    }
}

#[async_trait::async_trait]
impl AlertChannel for WebhookChannel {
    fn channel_id(&self) -> &str {
        CHANNEL_ID
    }

    async fn deliver(&self, config: &AlertChannelConfig, message: &AlertMessage) -> Result<()> {
        let url = Self::url_from(config)?;

        let res = self
            .http
            .post(url)
            .json(&json!({
                "subject": message.subject,
                "body": message.body,
            }))
            .send()
            .await
            .context("webhook request failed")?;

        let status = res.status();
        anyhow::ensure!(status.is_success(), "webhook HTTP {status}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn config(doc: serde_json::Value) -> AlertChannelConfig {
        AlertChannelConfig {
            id: Uuid::new_v4(),
            channel_id: CHANNEL_ID.to_string(),
            enabled: true,
            threshold: 50.0,
            config: doc,
        }
    }

    #[test]
    fn extracts_url_from_config_document() {
        let c = config(json!({"url": "https://hooks.example.com/risk"}));
        assert_eq!(
            WebhookChannel::url_from(&c).unwrap(),
            "https://hooks.example.com/risk"
        );
    }

    #[test]
    fn missing_or_blank_url_is_an_error() {
        assert!(WebhookChannel::url_from(&config(json!({}))).is_err());
        assert!(WebhookChannel::url_from(&config(json!({"url": "  "}))).is_err());
        assert!(WebhookChannel::url_from(&config(json!({"url": 7}))).is_err());
    }
}
