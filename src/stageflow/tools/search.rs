// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

use crate::adk::error::{Result, StageflowError};
use crate::stageflow::config::ResearchSettings;

const TAVILY_BASE_URL: &str = "https://api.tavily.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    /// Snippet returned with the hit
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub url: String,
    pub raw_content: String,
}

/// Web search and extraction port
#[async_trait]
pub trait SearchPort: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    /// Extract page contents; pages the provider could not fetch are omitted
    async fn fetch(&self, urls: &[String]) -> Result<Vec<PageContent>>;
}

/// Tavily search/extract client
pub struct TavilySearch {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    search_depth: String,
    extract_timeout: Duration,
}

impl TavilySearch {
    /// Build from `TAVILY_API_KEY` and the research settings
    ///
    /// A missing key is reported on the first request, so graphs can be
    /// built and inspected without credentials.
    pub fn from_env(settings: &ResearchSettings) -> Self {
        Self::with_key(env::var("TAVILY_API_KEY").ok(), settings)
    }

    pub fn new(api_key: impl Into<String>, settings: &ResearchSettings) -> Self {
        Self::with_key(Some(api_key.into()), settings)
    }

    fn with_key(api_key: Option<String>, settings: &ResearchSettings) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: TAVILY_BASE_URL.to_string(),
            search_depth: settings.search_depth.clone(),
            extract_timeout: Duration::from_secs(settings.extract_timeout_secs),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post(&self, path: &str, body: Value, timeout: Option<Duration>) -> Result<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| StageflowError::config("TAVILY_API_KEY must be set"))?;
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let mut request = self.client.post(&url).bearer_auth(api_key).json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(StageflowError::api(
                "tavily",
                format!("{} returned {}: {}", path, status, text),
            ));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl SearchPort for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        log::debug!("Tavily search: {}", query);
        let body = json!({
            "query": query,
            "search_depth": self.search_depth,
            "max_results": max_results,
        });
        let response = self.post("search", body, None).await?;
        parse_search_response(&response)
    }

    async fn fetch(&self, urls: &[String]) -> Result<Vec<PageContent>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        log::debug!("Tavily extract: {} urls", urls.len());
        let body = json!({
            "urls": urls,
            "format": "markdown",
            "timeout": self.extract_timeout.as_secs(),
        });
        // Local timeout outlasts the provider-side one
        let response = self
            .post("extract", body, Some(self.extract_timeout + Duration::from_secs(10)))
            .await?;
        parse_extract_response(&response)
    }
}

fn parse_search_response(body: &Value) -> Result<Vec<SearchHit>> {
    let results = body
        .get("results")
        .ok_or_else(|| StageflowError::api("tavily", "Invalid response format: missing results"))?;
    Ok(serde_json::from_value(results.clone())?)
}

fn parse_extract_response(body: &Value) -> Result<Vec<PageContent>> {
    let results = body
        .get("results")
        .ok_or_else(|| StageflowError::api("tavily", "Invalid response format: missing results"))?;

    if let Some(failed) = body.get("failed_results").and_then(Value::as_array) {
        for entry in failed {
            log::warn!(
                "Extraction failed for {}",
                entry.get("url").and_then(Value::as_str).unwrap_or("<unknown>")
            );
        }
    }
    Ok(serde_json::from_value(results.clone())?)
}
