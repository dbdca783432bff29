//! HTTP provider feeds

use std::time::Duration;

use async_trait::async_trait;
use fleetsync_core::{Normalizer, PositionRecord, RawPosition};
use fleetsync_engine::{PositionSource, SyncError};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ProviderConfig;

/// Feed bodies come either bare or wrapped
#[derive(Deserialize)]
#[serde(untagged)]
enum FeedBody {
    List(Vec<RawPosition>),
    Wrapped { positions: Vec<RawPosition> },
}

impl FeedBody {
    fn into_positions(self) -> Vec<RawPosition> {
        match self {
            Self::List(positions) | Self::Wrapped { positions } => positions,
        }
    }
}

/// A provider polled over HTTP GET
#[derive(Debug)]
pub struct HttpFeed {
    name: String,
    url: String,
    client: Client,
    normalizer: Normalizer,
}

impl HttpFeed {
    pub fn from_config(config: &ProviderConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| anyhow::anyhow!("Invalid auth token for '{}': {}", config.name, e))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(headers)
            .build()?;

        let clock = config.clock().ok_or_else(|| {
            anyhow::anyhow!("provider '{}': invalid utc_offset_minutes", config.name)
        })?;
        let mut normalizer = Normalizer::new(clock);
        if let Some(class) = config.entity_class {
            normalizer = normalizer.with_default_class(class);
        }

        Ok(Self {
            name: config.name.clone(),
            url: config.url.clone(),
            client,
            normalizer,
        })
    }

    fn failed(&self, message: impl std::fmt::Display) -> SyncError {
        SyncError::source_failed(&self.name, message.to_string())
    }
}

#[async_trait]
impl PositionSource for HttpFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> fleetsync_engine::Result<Vec<PositionRecord>> {
        debug!(provider = %self.name, url = %self.url, "Fetching feed");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.failed(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.failed(format!("HTTP {}", status)));
        }

        let body: FeedBody = response.json().await.map_err(|e| self.failed(e))?;
        let (records, rejected) = self.normalizer.normalize_all(body.into_positions());
        info!(
            provider = %self.name,
            accepted = records.len(),
            rejected,
            "Fetched provider feed"
        );
        Ok(records)
    }
}
