use crate::config::Settings;
use crate::domain::snapshot::{RawMarketSnapshot, RawSentimentSnapshot};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MARKET_PATH: &str = "/v1/market_snapshot";
const DEFAULT_SENTIMENT_PATH: &str = "/v1/sentiment_snapshot";
const DEFAULT_RETRIES: u32 = 3;

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_market(&self) -> Result<RawMarketSnapshot>;
}

#[async_trait::async_trait]
pub trait SentimentDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_sentiment(&self) -> Result<RawSentimentSnapshot>;
}

/// Pulls both snapshot kinds from a JSON HTTP endpoint. Missing indicators
/// deserialize to `None`; the structs tolerate unknown fields so provider
/// additions do not break a cycle.
#[derive(Debug, Clone)]
pub struct HttpJsonProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    market_path: String,
    sentiment_path: String,
    retries: u32,
}

impl HttpJsonProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_data_provider_base_url()?.to_string();
        let api_key = settings.data_provider_api_key.clone();

        let timeout_secs = std::env::var("DATA_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("DATA_PROVIDER_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES);

        let market_path = std::env::var("DATA_PROVIDER_MARKET_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MARKET_PATH.to_string());

        let sentiment_path = std::env::var("DATA_PROVIDER_SENTIMENT_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SENTIMENT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build data provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            market_path,
            sentiment_path,
            retries,
        })
    }

    fn url(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let headers = self.headers()?;

        let res = self
            .http
            .get(&url)
            .headers(headers)
            .send()
            .await
            .with_context(|| format!("data provider request to {path} failed"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read provider response")?;

        if !status.is_success() {
            anyhow::bail!("data provider HTTP {status}: {text}");
        }

        serde_json::from_str::<T>(&text)
            .with_context(|| format!("failed to parse provider response from {path}"))
    }

    async fn fetch_with_retry<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_json::<T>(path).await {
                Ok(parsed) => return Ok(parsed),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, path, ?backoff, error = %err, "provider fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for HttpJsonProvider {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_market(&self) -> Result<RawMarketSnapshot> {
        let path = self.market_path.clone();
        self.fetch_with_retry(&path).await
    }
}

#[async_trait::async_trait]
impl SentimentDataProvider for HttpJsonProvider {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_sentiment(&self) -> Result<RawSentimentSnapshot> {
        let path = self.sentiment_path.clone();
        self.fetch_with_retry(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_partial_market_payload() {
        let v = json!({
            "spy": 441.3,
            "vix": 19.8,
            "put_call_ratio": 0.95,
            "timestamp": "2026-08-29T12:00:00Z"
        });

        let parsed: RawMarketSnapshot = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.spy, Some(441.3));
        assert_eq!(parsed.dxy, None);
        assert_eq!(parsed.put_call_ratio, Some(0.95));
    }

    #[test]
    fn parses_sentiment_payload_with_extra_fields() {
        let v = json!({
            "reddit": -0.12,
            "news": 0.04,
            "sample_count": 532,
            "timestamp": "2026-08-29T12:00:00Z"
        });

        let parsed: RawSentimentSnapshot = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.reddit, Some(-0.12));
        assert_eq!(parsed.twitter, None);
        assert_eq!(parsed.news, Some(0.04));
    }
}
