// SPDX-License-Identifier: MIT

//! External ports used by the bundled pipelines
//!
//! - `search` - web search and page extraction (Tavily)
//! - `report` - where finished reports are written
//! - `email` - delivery of reports by email (SendGrid)

pub mod email;
pub mod report;
pub mod search;

pub use email::{EmailSink, MemoryEmailSink, SendGridEmail, SentEmail};
pub use report::{safe_filename, FsReportSink, MemoryReportSink, ReportFormat, ReportSink, StoredReport};
pub use search::{PageContent, SearchHit, SearchPort, TavilySearch};
