use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One configured delivery channel with its firing threshold. The
/// channel-specific settings (webhook URL, recipients, ...) live in the
/// opaque `config` document and are interpreted by the channel itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertChannelConfig {
    pub id: Uuid,
    pub channel_id: String,
    pub enabled: bool,
    /// Composite score at or above which this channel fires, in [0, 100].
    pub threshold: f64,
    #[serde(default)]
    pub config: Value,
}

impl AlertChannelConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.channel_id.trim().is_empty(),
            "channel_id must be non-empty"
        );
        ensure!(
            self.threshold.is_finite() && (0.0..=100.0).contains(&self.threshold),
            "threshold must be within [0, 100], got {}",
            self.threshold
        );
        Ok(())
    }
}
