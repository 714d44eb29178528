// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::adk::error::Result;

const MAX_FILENAME_LEN: usize = 100;

/// Rendering of a stored report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Markdown,
    Html,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Html => "html",
        }
    }
}

/// Destination for finished reports
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Store `content` under a name derived from `name`; returns its location
    async fn write(&self, name: &str, format: ReportFormat, content: &str) -> Result<String>;
}

/// Filesystem-safe file stem: lowercase, whitespace runs to `_`, only
/// `[a-z0-9_-]`, at most 100 chars, then `_<timestamp>`
pub fn safe_filename(name: &str, timestamp: i64) -> String {
    let lowered = name.to_lowercase();
    let mut stem = String::with_capacity(lowered.len());
    let mut in_whitespace = false;
    for c in lowered.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                stem.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
            stem.push(c);
        }
    }

    if stem.len() > MAX_FILENAME_LEN {
        // stem is ASCII, so byte truncation is safe
        stem.truncate(MAX_FILENAME_LEN);
        stem = stem.trim_matches('_').to_string();
    }

    format!("{}_{}", stem, timestamp)
}

/// Writes reports into a directory, one file per format
#[derive(Debug, Clone)]
pub struct FsReportSink {
    dir: PathBuf,
}

impl FsReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ReportSink for FsReportSink {
    async fn write(&self, name: &str, format: ReportFormat, content: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let filename = format!(
            "{}.{}",
            safe_filename(name, chrono::Utc::now().timestamp()),
            format.extension()
        );
        let path = self.dir.join(filename);
        tokio::fs::write(&path, content).await?;
        log::info!("Report written to {}", path.display());
        Ok(path.display().to_string())
    }
}

/// A report held by [`MemoryReportSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReport {
    pub name: String,
    pub format: ReportFormat,
    pub content: String,
}

/// Keeps reports in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryReportSink {
    reports: Arc<RwLock<Vec<StoredReport>>>,
}

impl MemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports in write order
    pub async fn reports(&self) -> Vec<StoredReport> {
        self.reports.read().await.clone()
    }
}

#[async_trait]
impl ReportSink for MemoryReportSink {
    async fn write(&self, name: &str, format: ReportFormat, content: &str) -> Result<String> {
        let mut reports = self.reports.write().await;
        reports.push(StoredReport {
            name: name.to_string(),
            format,
            content: content.to_string(),
        });
        Ok(format!("memory://{}", reports.len() - 1))
    }
}
