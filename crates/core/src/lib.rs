pub mod alert;
pub mod collect;
pub mod domain;
pub mod engine;
pub mod ml;
pub mod resilience;
pub mod risk;
pub mod storage;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    const DEFAULT_MODEL_DIR: &str = "models";
    const DEFAULT_INTERVAL_SECS: u64 = 60;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub data_provider_base_url: Option<String>,
        pub data_provider_api_key: Option<String>,
        pub model_dir: Option<String>,
        pub monitoring_interval_secs: Option<u64>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                data_provider_base_url: std::env::var("DATA_PROVIDER_BASE_URL").ok(),
                data_provider_api_key: std::env::var("DATA_PROVIDER_API_KEY").ok(),
                model_dir: std::env::var("MODEL_DIR").ok(),
                monitoring_interval_secs: std::env::var("MONITORING_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok()),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_data_provider_base_url(&self) -> anyhow::Result<&str> {
            self.data_provider_base_url
                .as_deref()
                .context("DATA_PROVIDER_BASE_URL is required")
        }

        pub fn model_dir(&self) -> PathBuf {
            PathBuf::from(
                self.model_dir
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(DEFAULT_MODEL_DIR),
            )
        }

        pub fn monitoring_interval_secs(&self) -> u64 {
            self.monitoring_interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS)
        }
    }
}
