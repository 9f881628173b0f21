//! Serper web search client

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::cache::SearchCache;
use crate::config::Config;

const SERPER_SEARCH_URL: &str = "https://google.serper.dev/search";

#[derive(Clone)]
pub struct SerperClient {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    cache: SearchCache,
}

impl SerperClient {
    pub fn new(api_key: Option<&str>, timeout: Duration, cache: SearchCache) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: api_key.map(|s| s.to_string()),
            endpoint: SERPER_SEARCH_URL.to_string(),
            cache,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.serper_api_key.as_deref(),
            config.http_timeout,
            SearchCache::new(config.search_cache_ttl_secs, config.search_cache_enabled),
        )
    }

    /// Point the client at a different endpoint
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn cache(&self) -> &SearchCache {
        &self.cache
    }

    /// Run a search and return the raw JSON response body
    pub async fn search(&self, query: &str) -> Result<String> {
        let key = SearchCache::compute_key(query);
        if let Some(body) = self.cache.get(&key).await {
            return Ok(body);
        }

        let api_key = self
            .api_key
            .as_deref()
            .context("SERPER_API_KEY not set")?;

        debug!("Searching: {}", query);
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", api_key)
            .json(&json!({ "q": query }))
            .send()
            .await
            .context("Failed to reach search API")?;

        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            self.cache.set(&key, body.clone()).await;
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_an_error() {
        let client = SerperClient::new(None, Duration::from_secs(1), SearchCache::new(60, true));
        let err = client.search("anything").await.unwrap_err();
        assert!(err.to_string().contains("SERPER_API_KEY"));
    }

    #[tokio::test]
    async fn test_cached_body_served_without_key() {
        let cache = SearchCache::new(60, true);
        cache
            .set(&SearchCache::compute_key("cached query"), "{\"ok\":true}".to_string())
            .await;
        let client = SerperClient::new(None, Duration::from_secs(1), cache);
        assert_eq!(client.search("Cached Query").await.unwrap(), "{\"ok\":true}");
    }
}
