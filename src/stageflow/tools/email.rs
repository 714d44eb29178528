// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::adk::error::{Result, StageflowError};
use crate::stageflow::config::SecuritySettings;

const SENDGRID_BASE_URL: &str = "https://api.sendgrid.com";

/// Outgoing HTML email port
#[async_trait]
pub trait EmailSink: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()>;
}

/// SendGrid v3 mail client
pub struct SendGridEmail {
    client: Client,
    api_key: Option<String>,
    from: Option<String>,
    base_url: String,
}

impl SendGridEmail {
    /// Build from `SENDGRID_API_KEY` and `security.email_from`
    ///
    /// Missing credentials surface when a message is sent.
    pub fn from_env(settings: &SecuritySettings) -> Self {
        Self {
            client: Client::new(),
            api_key: env::var("SENDGRID_API_KEY").ok(),
            from: settings.email_from.clone(),
            base_url: SENDGRID_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl EmailSink for SendGridEmail {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| StageflowError::config("SENDGRID_API_KEY must be set"))?;
        let from = self
            .from
            .as_deref()
            .ok_or_else(|| StageflowError::config("security.email_from must be set"))?;

        let body = json!({
            "personalizations": [{"to": [{"email": to}]}],
            "from": {"email": from},
            "subject": subject,
            "content": [{"type": "text/html", "value": html_body}],
        });
        let url = format!("{}/v3/mail/send", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        log::info!("Email to {} answered {}", to, status);
        if !status.is_success() {
            let text = resp.text().await?;
            return Err(StageflowError::api(
                "sendgrid",
                format!("mail/send returned {}: {}", status, text),
            ));
        }
        Ok(())
    }
}

/// An email held by [`MemoryEmailSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Records emails instead of sending them
#[derive(Debug, Clone, Default)]
pub struct MemoryEmailSink {
    sent: Arc<RwLock<Vec<SentEmail>>>,
}

impl MemoryEmailSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentEmail> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl EmailSink for MemoryEmailSink {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        self.sent.write().await.push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
        });
        Ok(())
    }
}
