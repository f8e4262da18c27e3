//! Alert delivery across configured channels.
//!
//! Dispatch never short-circuits: one failing channel is logged and the
//! rest still receive the alert.

use anyhow::Result;

use crate::alert::config::AlertChannelConfig;
use crate::alert::message::AlertMessage;

#[async_trait::async_trait]
pub trait AlertChannel: Send + Sync {
    fn channel_id(&self) -> &str;

    async fn deliver(&self, config: &AlertChannelConfig, message: &AlertMessage) -> Result<()>;
}

/// Whether a channel should fire for the given composite score.
pub fn should_fire(config: &AlertChannelConfig, score: f64) -> bool {
    config.enabled && config.validate().is_ok() && score >= config.threshold
}

/// Deliver `message` to every configured channel whose threshold is met.
/// Returns the channel_ids that were delivered successfully.
pub async fn dispatch(
    channels: &[Box<dyn AlertChannel>],
    configs: &[AlertChannelConfig],
    score: f64,
    message: &AlertMessage,
) -> Vec<String> {
    let mut delivered = Vec::new();

    for config in configs {
        if !should_fire(config, score) {
            continue;
        }

        let Some(channel) = channels.iter().find(|c| c.channel_id() == config.channel_id) else {
            tracing::warn!(channel_id = %config.channel_id, "no channel registered for config");
            continue;
        };

        match channel.deliver(config, message).await {
            Ok(()) => {
                tracing::info!(channel_id = %config.channel_id, score, "alert delivered");
                delivered.push(config.channel_id.clone());
            }
            Err(err) => {
                tracing::error!(channel_id = %config.channel_id, error = %err, "alert delivery failed");
            }
        }
    }

    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    struct RecordingChannel {
        id: &'static str,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl AlertChannel for RecordingChannel {
        fn channel_id(&self) -> &str {
            self.id
        }

        async fn deliver(&self, _: &AlertChannelConfig, _: &AlertMessage) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("delivery refused");
            }
            Ok(())
        }
    }

    fn config(channel_id: &str, enabled: bool, threshold: f64) -> AlertChannelConfig {
        AlertChannelConfig {
            id: Uuid::new_v4(),
            channel_id: channel_id.to_string(),
            enabled,
            threshold,
            config: json!({}),
        }
    }

    fn message() -> AlertMessage {
        AlertMessage {
            subject: "s".to_string(),
            body: "b".to_string(),
        }
    }

    #[test]
    fn fires_at_threshold_but_not_below() {
        let c = config("webhook", true, 70.0);
        assert!(should_fire(&c, 70.0));
        assert!(should_fire(&c, 85.0));
        assert!(!should_fire(&c, 69.99));
    }

    #[test]
    fn disabled_or_invalid_configs_never_fire() {
        assert!(!should_fire(&config("webhook", false, 10.0), 99.0));
        assert!(!should_fire(&config("   ", true, 10.0), 99.0));
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_block_the_rest() {
        let failing_calls = Arc::new(AtomicUsize::new(0));
        let healthy_calls = Arc::new(AtomicUsize::new(0));
        let channels: Vec<Box<dyn AlertChannel>> = vec![
            Box::new(RecordingChannel {
                id: "broken",
                calls: failing_calls.clone(),
                fail: true,
            }),
            Box::new(RecordingChannel {
                id: "healthy",
                calls: healthy_calls.clone(),
                fail: false,
            }),
        ];
        let configs = vec![config("broken", true, 50.0), config("healthy", true, 50.0)];

        let delivered = dispatch(&channels, &configs, 75.0, &message()).await;

        assert_eq!(delivered, vec!["healthy".to_string()]);
        assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn below_threshold_channels_are_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let channels: Vec<Box<dyn AlertChannel>> = vec![Box::new(RecordingChannel {
            id: "webhook",
            calls: calls.clone(),
            fail: false,
        })];
        let configs = vec![config("webhook", true, 80.0)];

        let delivered = dispatch(&channels, &configs, 60.0, &message()).await;

        assert!(delivered.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_channel_id_is_ignored() {
        let channels: Vec<Box<dyn AlertChannel>> = Vec::new();
        let configs = vec![config("missing", true, 10.0)];
        let delivered = dispatch(&channels, &configs, 90.0, &message()).await;
        assert!(delivered.is_empty());
    }
}
