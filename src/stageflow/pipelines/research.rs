// SPDX-License-Identifier: MIT

//! Research pipeline
//!
//! ```text
//! generate_queries -> evaluate_queries -> select_top_k -> [approve_queries]
//!     approved -> perform_search -> fetch_page_contents -> produce_report -> END
//!     rejected -> END
//! ```
//!
//! `produce_report` stores the report twice: as markdown and as HTML.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::{agents, render_html, PipelineDeps};
use crate::adk::agent::run_structured;
use crate::adk::error::{ModelError, Result, WorkflowError};
use crate::stageflow::tools::{PageContent, ReportFormat, SearchHit};
use crate::stageflow::workflow::graph::{
    StageContext, StageGraph, StageGraphBuilder, StageHandler, StageOutput, END,
};
use crate::stageflow::workflow::ranker::{
    select_top_k, AgentEvaluator, Candidate, Ranker, ScoredCandidate,
};
use crate::stageflow::workflow::runner::DECISION_FIELD;
use crate::stageflow::workflow::state::{StateSchema, StateUpdate, WorkflowState};
use crate::stageflow::workflow::throttle::Throttle;

pub const WORKFLOW: &str = "research";

pub mod stages {
    pub const GENERATE_QUERIES: &str = "generate_queries";
    pub const EVALUATE_QUERIES: &str = "evaluate_queries";
    pub const SELECT_TOP_K: &str = "select_top_k";
    pub const APPROVE_QUERIES: &str = "approve_queries";
    pub const PERFORM_SEARCH: &str = "perform_search";
    pub const FETCH_PAGE_CONTENTS: &str = "fetch_page_contents";
    pub const PRODUCE_REPORT: &str = "produce_report";
}

pub mod fields {
    pub const TOPIC: &str = "topic";
    pub const REPHRASED_TOPIC: &str = "rephrased_topic";
    pub const NUM_QUERIES: &str = "num_queries";
    pub const TOP_K: &str = "top_k";
    pub const CANDIDATES: &str = "candidates";
    pub const SCORED_QUERIES: &str = "scored_queries";
    pub const SELECTED_QUERIES: &str = "selected_queries";
    pub const QUERIES_APPROVED: &str = "queries_approved";
    pub const SEARCH_RESULTS: &str = "search_results";
    pub const PAGE_CONTENTS: &str = "page_contents";
    pub const REPORT: &str = "report";
    pub const REPORT_LOCATION: &str = "report_location";
    pub const HTML_REPORT_LOCATION: &str = "html_report_location";
}

pub const APPROVAL_PROMPT: &str = "Do you want to approve the search queries?";

/// Seed state for a research run
pub fn seed(topic: &str) -> Map<String, Value> {
    let mut seed = Map::new();
    seed.insert(fields::TOPIC.to_string(), json!(topic));
    seed
}

/// Build the research graph over shared collaborators
pub fn graph(deps: Arc<PipelineDeps>) -> std::result::Result<StageGraph, WorkflowError> {
    let schema = StateSchema::new()
        .default_value(fields::NUM_QUERIES, json!(deps.research.num_queries))
        .default_value(fields::TOP_K, json!(deps.research.top_k));

    StageGraphBuilder::new(WORKFLOW)
        .schema(schema)
        .add_stage(stages::GENERATE_QUERIES, Arc::new(GenerateQueries(deps.clone())))
        .add_stage(stages::EVALUATE_QUERIES, Arc::new(EvaluateQueries(deps.clone())))
        .add_stage(stages::SELECT_TOP_K, Arc::new(SelectTopK))
        .add_interrupt_stage(stages::APPROVE_QUERIES, Arc::new(ApproveQueries))
        .add_stage(stages::PERFORM_SEARCH, Arc::new(PerformSearch(deps.clone())))
        .add_stage(stages::FETCH_PAGE_CONTENTS, Arc::new(FetchPageContents(deps.clone())))
        .add_stage(stages::PRODUCE_REPORT, Arc::new(ProduceReport(deps)))
        .add_edge(stages::GENERATE_QUERIES, stages::EVALUATE_QUERIES)
        .add_edge(stages::EVALUATE_QUERIES, stages::SELECT_TOP_K)
        .add_edge(stages::SELECT_TOP_K, stages::APPROVE_QUERIES)
        .add_conditional_edge(
            stages::APPROVE_QUERIES,
            approval_route,
            &[("approved", stages::PERFORM_SEARCH), ("rejected", END)],
        )
        .add_edge(stages::PERFORM_SEARCH, stages::FETCH_PAGE_CONTENTS)
        .add_edge(stages::FETCH_PAGE_CONTENTS, stages::PRODUCE_REPORT)
        .add_edge(stages::PRODUCE_REPORT, END)
        .set_entry(stages::GENERATE_QUERIES)
        .build()
}

fn approval_route(state: &WorkflowState) -> String {
    if state.get_bool(fields::QUERIES_APPROVED).unwrap_or(false) {
        "approved".to_string()
    } else {
        "rejected".to_string()
    }
}

/// `Source: <url>\n<content>` blocks separated by blank lines
pub fn join_page_contents(pages: &[PageContent]) -> String {
    pages
        .iter()
        .map(|page| format!("Source: {}\n{}", page.url, page.raw_content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Deserialize)]
struct QueryPlan {
    #[serde(default)]
    rephrased_topic: Option<String>,
    items: Vec<PlannedQuery>,
}

#[derive(Debug, Deserialize)]
struct PlannedQuery {
    query: String,
    #[serde(default)]
    reason: String,
}

struct GenerateQueries(Arc<PipelineDeps>);

#[async_trait]
impl StageHandler for GenerateQueries {
    async fn run(&self, _ctx: &StageContext, state: &WorkflowState) -> Result<StageOutput> {
        let topic: String = state.require(fields::TOPIC)?;
        let count: usize = state.require(fields::NUM_QUERIES)?;
        let planner = self.0.agents.require(agents::QUERY_PLANNER).await?;

        let input = format!(
            "Today is {}.\nTopic: {}\nNumber of queries: {}",
            chrono::Utc::now().format("%B %d, %Y"),
            topic,
            count
        );
        let plan: QueryPlan = run_structured(planner.as_ref(), input).await?;

        let mut candidates: Vec<Candidate> = plan
            .items
            .into_iter()
            .filter(|item| !item.query.trim().is_empty())
            .map(|item| Candidate::new(item.query.trim(), item.reason))
            .collect();
        candidates.truncate(count);
        if candidates.is_empty() {
            return Err(ModelError::InvalidResponse("query planner proposed no queries".into()).into());
        }
        log::info!("Generated {} candidate queries for '{}'", candidates.len(), topic);

        let mut update = StateUpdate::new().set_serialized(fields::CANDIDATES, &candidates)?;
        if let Some(rephrased) = plan.rephrased_topic {
            update = update.set(fields::REPHRASED_TOPIC, rephrased);
        }
        Ok(StageOutput::update(update))
    }
}

struct EvaluateQueries(Arc<PipelineDeps>);

#[async_trait]
impl StageHandler for EvaluateQueries {
    async fn run(&self, _ctx: &StageContext, state: &WorkflowState) -> Result<StageOutput> {
        let topic: String = state.require(fields::TOPIC)?;
        let candidates: Vec<Candidate> = state.require(fields::CANDIDATES)?;
        let evaluator = self.0.agents.require(agents::QUERY_EVALUATOR).await?;

        let ranker = Ranker::new(Arc::new(AgentEvaluator::new(
            evaluator,
            format!("Research topic: {}", topic),
        )));
        let scored = ranker.score(&candidates).await?;

        Ok(StageOutput::update(
            StateUpdate::new().set_serialized(fields::SCORED_QUERIES, &scored)?,
        ))
    }
}

struct SelectTopK;

#[async_trait]
impl StageHandler for SelectTopK {
    async fn run(&self, _ctx: &StageContext, state: &WorkflowState) -> Result<StageOutput> {
        let scored: Vec<ScoredCandidate> = state.require(fields::SCORED_QUERIES)?;
        let k: usize = state.require(fields::TOP_K)?;

        let selected = select_top_k(&scored, k);
        log::info!("Selected {} of {} queries", selected.len(), scored.len());
        Ok(StageOutput::update(
            StateUpdate::new().set_serialized(fields::SELECTED_QUERIES, &selected)?,
        ))
    }
}

struct ApproveQueries;

#[async_trait]
impl StageHandler for ApproveQueries {
    async fn run(&self, ctx: &StageContext, state: &WorkflowState) -> Result<StageOutput> {
        if state.contains(DECISION_FIELD) {
            let approved: bool = state.require(DECISION_FIELD)?;
            log::info!(
                "Queries for instance {} {}",
                ctx.instance_id,
                if approved { "approved" } else { "rejected" }
            );
            return Ok(StageOutput::update(
                StateUpdate::new().set(fields::QUERIES_APPROVED, approved),
            ));
        }

        let selected = state
            .get(fields::SELECTED_QUERIES)
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        Ok(StageOutput::interrupt(APPROVAL_PROMPT, selected))
    }
}

struct PerformSearch(Arc<PipelineDeps>);

#[async_trait]
impl StageHandler for PerformSearch {
    async fn run(&self, _ctx: &StageContext, state: &WorkflowState) -> Result<StageOutput> {
        let selected: Vec<ScoredCandidate> = state.require(fields::SELECTED_QUERIES)?;
        let settings = &self.0.research;
        let throttle = Throttle::new(settings.search_delay());

        let mut results: Vec<SearchHit> = Vec::new();
        for query in &selected {
            throttle.wait().await;
            let hits = self
                .0
                .search
                .search(&query.candidate.content, settings.max_results)
                .await?;
            log::info!(
                "Search '{}' returned {} results",
                query.candidate.content,
                hits.len()
            );
            results.extend(hits.into_iter().take(settings.results_per_query));
        }

        Ok(StageOutput::update(
            StateUpdate::new().set_serialized(fields::SEARCH_RESULTS, &results)?,
        ))
    }
}

struct FetchPageContents(Arc<PipelineDeps>);

#[async_trait]
impl StageHandler for FetchPageContents {
    async fn run(&self, _ctx: &StageContext, state: &WorkflowState) -> Result<StageOutput> {
        let results: Vec<SearchHit> = state.require(fields::SEARCH_RESULTS)?;
        let mut urls: Vec<String> = Vec::with_capacity(results.len());
        for hit in results {
            if !urls.contains(&hit.url) {
                urls.push(hit.url);
            }
        }

        let pages = self.0.search.fetch(&urls).await?;
        log::info!("Extracted {} of {} pages", pages.len(), urls.len());
        Ok(StageOutput::update(
            StateUpdate::new().set(fields::PAGE_CONTENTS, join_page_contents(&pages)),
        ))
    }
}

struct ProduceReport(Arc<PipelineDeps>);

#[async_trait]
impl StageHandler for ProduceReport {
    async fn run(&self, _ctx: &StageContext, state: &WorkflowState) -> Result<StageOutput> {
        let topic: String = state.require(fields::TOPIC)?;
        let contents: String = state.require(fields::PAGE_CONTENTS)?;
        let reporter = self.0.agents.require(agents::RESEARCH_REPORTER).await?;

        let report = reporter
            .run(format!("Topic: {}\n\nContext: {}", topic, contents))
            .await?;
        let html = render_html(&self.0, &report).await?;

        let location = self
            .0
            .reports
            .write(&topic, ReportFormat::Markdown, &report)
            .await?;
        let html_location = self.0.reports.write(&topic, ReportFormat::Html, &html).await?;

        Ok(StageOutput::update(
            StateUpdate::new()
                .set(fields::REPORT, report)
                .set(fields::REPORT_LOCATION, location)
                .set(fields::HTML_REPORT_LOCATION, html_location),
        ))
    }
}
