// SPDX-License-Identifier: MIT

//! URL security pipeline
//!
//! ```text
//! validate_input -> plan_checks -> run_checks -> write_report
//!     email    -> deliver_report -> END
//!     no email -> END
//! ```
//!
//! `run_checks` fans out one task per planned check. Each task searches the
//! web for evidence, asks two checkers concurrently and lets an adjudicator
//! keep the better answer; a check whose search, checkers or adjudicator
//! fail is dropped from the report.
//!
//! A failed email delivery does not fail the run; it is reported in
//! `delivery_status`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

use super::{agents, render_html, PipelineDeps};
use crate::adk::agent::{run_structured, Agent};
use crate::adk::error::{Result, StageflowError, WorkflowError};
use crate::stageflow::tools::{ReportFormat, SearchHit, SearchPort};
use crate::stageflow::workflow::fanout::run_pair;
use crate::stageflow::workflow::graph::{
    StageContext, StageGraph, StageGraphBuilder, StageHandler, StageOutput, END,
};
use crate::stageflow::workflow::state::{StateSchema, StateUpdate, WorkflowState};

pub const WORKFLOW: &str = "security";

pub const URL_REJECTED: &str = "URL validation failed.";
pub const EMAIL_REJECTED: &str = "Email validation failed.";

pub mod stages {
    pub const VALIDATE_INPUT: &str = "validate_input";
    pub const PLAN_CHECKS: &str = "plan_checks";
    pub const RUN_CHECKS: &str = "run_checks";
    pub const WRITE_REPORT: &str = "write_report";
    pub const DELIVER_REPORT: &str = "deliver_report";
}

pub mod fields {
    pub const URL: &str = "url";
    pub const EMAIL: &str = "email";
    pub const NUM_CHECKS: &str = "num_checks";
    pub const CHECKS: &str = "checks";
    pub const FINDINGS: &str = "findings";
    pub const CHECKS_ATTEMPTED: &str = "checks_attempted";
    pub const CHECKS_SUCCEEDED: &str = "checks_succeeded";
    pub const SUMMARY: &str = "summary";
    pub const FOLLOW_UP_CHECKS: &str = "follow_up_checks";
    pub const REPORT: &str = "report";
    pub const REPORT_LOCATION: &str = "report_location";
    pub const DELIVERY_STATUS: &str = "delivery_status";
}

/// Seed state for a URL check
pub fn seed(url: &str, email: Option<&str>) -> Map<String, Value> {
    let mut seed = Map::new();
    seed.insert(fields::URL.to_string(), json!(url));
    if let Some(email) = email {
        seed.insert(fields::EMAIL.to_string(), json!(email));
    }
    seed
}

/// Build the security graph over shared collaborators
pub fn graph(deps: Arc<PipelineDeps>) -> std::result::Result<StageGraph, WorkflowError> {
    let schema = StateSchema::new()
        .default_value(fields::NUM_CHECKS, json!(deps.security.num_checks));

    StageGraphBuilder::new(WORKFLOW)
        .schema(schema)
        .add_stage(stages::VALIDATE_INPUT, Arc::new(ValidateInput))
        .add_stage(stages::PLAN_CHECKS, Arc::new(PlanChecks(deps.clone())))
        .add_stage(stages::RUN_CHECKS, Arc::new(RunChecks(deps.clone())))
        .add_stage(stages::WRITE_REPORT, Arc::new(WriteReport(deps.clone())))
        .add_stage(stages::DELIVER_REPORT, Arc::new(DeliverReport(deps)))
        .add_edge(stages::VALIDATE_INPUT, stages::PLAN_CHECKS)
        .add_edge(stages::PLAN_CHECKS, stages::RUN_CHECKS)
        .add_edge(stages::RUN_CHECKS, stages::WRITE_REPORT)
        .add_conditional_edge(
            stages::WRITE_REPORT,
            delivery_route,
            &[("email", stages::DELIVER_REPORT), ("skip", END)],
        )
        .add_edge(stages::DELIVER_REPORT, END)
        .set_entry(stages::VALIDATE_INPUT)
        .build()
}

/// Email the report only when the caller gave an address
fn delivery_route(state: &WorkflowState) -> String {
    match state.get_str(fields::EMAIL) {
        Some(email) if !email.trim().is_empty() => "email".to_string(),
        _ => "skip".to_string(),
    }
}

/// Host part of `url`, or the whole string when it has none
fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// Absolute http(s) URL with a host
pub fn is_valid_url(raw: &str) -> bool {
    match Url::parse(raw.trim()) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().map(|h| !h.is_empty()).unwrap_or(false)
        }
        Err(_) => false,
    }
}

/// Structural email check: one `@`, a local part, a dotted domain
pub fn is_valid_email(raw: &str) -> bool {
    let raw = raw.trim();
    if raw.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

/// Reasons the input is unacceptable; empty when it passes
pub fn guardrail_reasons(url: &str, email: Option<&str>) -> Vec<String> {
    let mut reasons = Vec::new();
    if !is_valid_url(url) {
        reasons.push(URL_REJECTED.to_string());
    }
    if let Some(email) = email {
        if !is_valid_email(email) {
            reasons.push(EMAIL_REJECTED.to_string());
        }
    }
    reasons
}

/// One check as proposed by the planner, before validation
#[derive(Debug, Clone, Deserialize)]
pub struct PlannedCheck {
    #[serde(default)]
    pub check: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct CheckPlan {
    checks: Vec<PlannedCheck>,
}

/// A validated check ready for fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTask {
    pub check: String,
    pub reason: String,
}

impl CheckTask {
    /// Validate planner output into at most `limit` distinct tasks
    pub fn plan(entries: Vec<PlannedCheck>, limit: usize) -> Result<Vec<CheckTask>> {
        if entries.is_empty() {
            return Err(WorkflowError::InvalidPlan("planner returned no checks".into()).into());
        }
        if entries.len() > limit {
            return Err(WorkflowError::InvalidPlan(format!(
                "planner returned {} checks, limit is {}",
                entries.len(),
                limit
            ))
            .into());
        }

        let mut seen = HashSet::new();
        let mut tasks = Vec::with_capacity(entries.len());
        for (i, entry) in entries.into_iter().enumerate() {
            let check = entry.check.trim().to_string();
            if check.is_empty() {
                return Err(WorkflowError::InvalidPlan(format!("check #{} is empty", i + 1)).into());
            }
            if !seen.insert(check.to_lowercase()) {
                return Err(
                    WorkflowError::InvalidPlan(format!("check '{}' is planned twice", check)).into(),
                );
            }
            tasks.push(CheckTask {
                check,
                reason: entry.reason.trim().to_string(),
            });
        }
        Ok(tasks)
    }

    /// Search query gathering evidence for this check
    fn query(&self, host: &str) -> String {
        format!("{} {}", host, self.check)
    }

    fn prompt(&self, url: &str, evidence: &[SearchHit]) -> String {
        let mut prompt = format!(
            "Url: {}\nCheck: {}\nReason: {}\nEvidence:",
            url, self.check, self.reason
        );
        if evidence.is_empty() {
            prompt.push_str("\n(no search results)");
        }
        for hit in evidence {
            prompt.push_str(&format!("\n- {} ({}): {}", hit.title, hit.url, hit.content));
        }
        prompt
    }
}

/// The adjudicated answer for one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub check: String,
    pub reason: String,
    pub verdict: String,
}

#[derive(Debug, Deserialize)]
struct UrlReport {
    #[serde(default)]
    short_summary: String,
    markdown_report: String,
    #[serde(default)]
    follow_up_checks: Vec<String>,
}

struct ValidateInput;

#[async_trait]
impl StageHandler for ValidateInput {
    async fn run(&self, _ctx: &StageContext, state: &WorkflowState) -> Result<StageOutput> {
        let url: String = state.require(fields::URL)?;
        let email = state.get_str(fields::EMAIL);

        let reasons = guardrail_reasons(&url, email);
        if !reasons.is_empty() {
            log::warn!("Guardrail rejected input: {}", reasons.join(" "));
            return Err(StageflowError::rejected(reasons));
        }
        Ok(StageOutput::update(
            StateUpdate::new().set(fields::URL, url.trim()),
        ))
    }
}

struct PlanChecks(Arc<PipelineDeps>);

#[async_trait]
impl StageHandler for PlanChecks {
    async fn run(&self, _ctx: &StageContext, state: &WorkflowState) -> Result<StageOutput> {
        let url: String = state.require(fields::URL)?;
        let limit: usize = state.require(fields::NUM_CHECKS)?;
        let planner = self.0.agents.require(agents::CHECK_PLANNER).await?;

        let plan: CheckPlan = run_structured(
            planner.as_ref(),
            format!("Url: {}\nNumber of checks: {}", url, limit),
        )
        .await?;
        let tasks = CheckTask::plan(plan.checks, limit)?;
        log::info!("Planned {} checks for {}", tasks.len(), url);

        Ok(StageOutput::update(
            StateUpdate::new().set_serialized(fields::CHECKS, &tasks)?,
        ))
    }
}

struct RunChecks(Arc<PipelineDeps>);

/// Agents and evidence source shared by every check task
#[derive(Clone)]
struct CheckCrew {
    deep: Arc<dyn Agent>,
    basic: Arc<dyn Agent>,
    adjudicator: Arc<dyn Agent>,
    search: Arc<dyn SearchPort>,
    evidence_results: usize,
}

/// Gather evidence, ask both checkers, then keep the adjudicator's pick
async fn adjudicated_check(crew: CheckCrew, url: String, task: CheckTask) -> Result<Finding> {
    let CheckCrew {
        deep,
        basic,
        adjudicator,
        search,
        evidence_results,
    } = crew;

    let evidence = search
        .search(&task.query(&host_of(&url)), evidence_results)
        .await?;
    log::debug!("Check '{}' has {} evidence hits", task.check, evidence.len());
    let prompt = task.prompt(&url, &evidence);

    let verdict = run_pair(deep.run(prompt.clone()), basic.run(prompt), |a, b| {
        let input = format!(
            "Check: {}\nReason: {}\nFeedback from checker 1: {}\nFeedback from checker 2: {}\n\
             Select the single best feedback for this check and return only its text.",
            task.check, task.reason, a, b
        );
        let adjudicator = adjudicator.clone();
        async move { adjudicator.run(input).await }
    })
    .await
    .ok_or_else(|| StageflowError::SubTask(format!("check '{}' produced no verdict", task.check)))?;

    Ok(Finding {
        check: task.check,
        reason: task.reason,
        verdict,
    })
}

#[async_trait]
impl StageHandler for RunChecks {
    async fn run(&self, _ctx: &StageContext, state: &WorkflowState) -> Result<StageOutput> {
        let url: String = state.require(fields::URL)?;
        let tasks: Vec<CheckTask> = state.require(fields::CHECKS)?;

        let resolved = self
            .0
            .agents
            .require_all(&[
                agents::DEEP_CHECKER,
                agents::BASIC_CHECKER,
                agents::CHECK_ADJUDICATOR,
            ])
            .await?;
        let crew = CheckCrew {
            deep: resolved[0].clone(),
            basic: resolved[1].clone(),
            adjudicator: resolved[2].clone(),
            search: self.0.search.clone(),
            evidence_results: self.0.security.evidence_results,
        };

        let result = self
            .0
            .fanout
            .run_all(tasks, |task| adjudicated_check(crew.clone(), url.clone(), task))
            .await;
        log::info!(
            "Finished {} checks, {} produced findings",
            result.completed,
            result.succeeded
        );

        Ok(StageOutput::update(
            StateUpdate::new()
                .set_serialized(fields::FINDINGS, &result.outputs)?
                .set(fields::CHECKS_ATTEMPTED, result.attempted)
                .set(fields::CHECKS_SUCCEEDED, result.succeeded),
        ))
    }
}

struct WriteReport(Arc<PipelineDeps>);

#[async_trait]
impl StageHandler for WriteReport {
    async fn run(&self, _ctx: &StageContext, state: &WorkflowState) -> Result<StageOutput> {
        let url: String = state.require(fields::URL)?;
        let findings: Vec<Finding> = state.require(fields::FINDINGS)?;
        let attempted: usize = state.require(fields::CHECKS_ATTEMPTED)?;
        let succeeded: usize = state.require(fields::CHECKS_SUCCEEDED)?;
        let reporter = self.0.agents.require(agents::SECURITY_REPORTER).await?;

        let input = format!(
            "Original url: {}\nCheck results: {}",
            url,
            serde_json::to_string(&findings)?
        );
        let report: UrlReport = run_structured(reporter.as_ref(), input).await?;

        let mut markdown = report.markdown_report.trim_end().to_string();
        if !report.follow_up_checks.is_empty() {
            markdown.push_str("\n\n## Follow-up checks\n");
            for item in &report.follow_up_checks {
                markdown.push_str(&format!("\n- {}", item));
            }
        }
        markdown.push_str(&format!(
            "\n\n---\n{} of {} planned checks produced findings.\n",
            succeeded, attempted
        ));

        let location = self
            .0
            .reports
            .write(
                &format!("security {}", host_of(&url)),
                ReportFormat::Markdown,
                &markdown,
            )
            .await?;

        Ok(StageOutput::update(
            StateUpdate::new()
                .set(fields::SUMMARY, report.short_summary)
                .set_serialized(fields::FOLLOW_UP_CHECKS, &report.follow_up_checks)?
                .set(fields::REPORT, markdown)
                .set(fields::REPORT_LOCATION, location),
        ))
    }
}

struct DeliverReport(Arc<PipelineDeps>);

impl DeliverReport {
    async fn send(&self, to: &str, subject: &str, markdown: &str) -> Result<()> {
        let html = render_html(&self.0, markdown).await?;
        self.0.email.send(to, subject, &html).await
    }
}

#[async_trait]
impl StageHandler for DeliverReport {
    async fn run(&self, _ctx: &StageContext, state: &WorkflowState) -> Result<StageOutput> {
        let to: String = state.require(fields::EMAIL)?;
        let url: String = state.require(fields::URL)?;
        let markdown: String = state.require(fields::REPORT)?;

        let subject = format!("URL security report for {}", host_of(&url));
        let status = match self.send(to.trim(), &subject, &markdown).await {
            Ok(()) => {
                log::info!("Report for {} emailed to {}", url, to);
                format!("Email sent to {}", to)
            }
            Err(e) => {
                log::warn!("Email delivery to {} failed: {}", to, e);
                format!("Failed to send email to {}: {}", to, e)
            }
        };

        Ok(StageOutput::update(
            StateUpdate::new().set(fields::DELIVERY_STATUS, status),
        ))
    }
}
