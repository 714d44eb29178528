// SPDX-License-Identifier: MIT

//! Bundled pipelines
//!
//! - `research` - plan, score and approve search queries, then search,
//!   extract and write a report
//! - `security` - validate a URL, plan independent checks, run them
//!   concurrently, write a report from the surviving findings and email it
//!   when an address was given

pub mod research;
pub mod security;

use std::sync::Arc;

use crate::adk::agent::{strip_fence, LLMAgent};
use crate::adk::error::Result;
use crate::adk::model::Model;
use crate::stageflow::config::{ResearchSettings, SecuritySettings, StageflowConfig};
use crate::stageflow::tools::{EmailSink, ReportSink, SearchPort};
use crate::stageflow::workflow::fanout::FanOutExecutor;
use crate::stageflow::workflow::graph::ExecutionEngine;
use crate::stageflow::workflow::registry::AgentRegistry;
use crate::stageflow::workflow::runner::{RunnerSet, WorkflowRunner};
use crate::stageflow::workflow::suspension::SuspensionManager;

/// Agent names the pipelines resolve from the registry
pub mod agents {
    pub const QUERY_PLANNER: &str = "query_planner";
    pub const QUERY_EVALUATOR: &str = "query_evaluator";
    pub const RESEARCH_REPORTER: &str = "research_reporter";
    pub const CHECK_PLANNER: &str = "check_planner";
    pub const DEEP_CHECKER: &str = "deep_checker";
    pub const BASIC_CHECKER: &str = "basic_checker";
    pub const CHECK_ADJUDICATOR: &str = "check_adjudicator";
    pub const SECURITY_REPORTER: &str = "security_reporter";
    pub const HTML_RENDERER: &str = "html_renderer";
}

/// Collaborators shared by every stage of the bundled pipelines
pub struct PipelineDeps {
    pub agents: AgentRegistry,
    pub search: Arc<dyn SearchPort>,
    pub reports: Arc<dyn ReportSink>,
    pub email: Arc<dyn EmailSink>,
    pub research: ResearchSettings,
    pub security: SecuritySettings,
    pub fanout: FanOutExecutor,
}

/// Register the LLM-backed agents both pipelines use
pub async fn register_agents(registry: &AgentRegistry, model: Arc<dyn Model>) {
    let definitions: [(&str, &str, bool); 9] = [
        (
            agents::QUERY_PLANNER,
            "You plan web research. Given a topic and a count, propose that many distinct \
             search queries. Answer with JSON: {\"rephrased_topic\": string or null, \
             \"items\": [{\"query\": string, \"reason\": string}]}.",
            true,
        ),
        (
            agents::QUERY_EVALUATOR,
            "You grade one search query for a research topic. Score relevance, actionability \
             and specificity as integers from 0 to 5. Answer with JSON: {\"relevance\": int, \
             \"actionability\": int, \"specificity\": int, \"critique\": string or null}.",
            true,
        ),
        (
            agents::RESEARCH_REPORTER,
            "You write a detailed markdown research report using only the supplied context. \
             Give it a title, group findings under headings and cite every source URL. \
             If the context is empty, say that no report could be produced.",
            false,
        ),
        (
            agents::CHECK_PLANNER,
            "You plan a security review of a URL. Propose the requested number of distinct \
             aspects to investigate, such as TLS validity, phishing risk, redirects, malware \
             or domain reputation. Answer with JSON: {\"checks\": [{\"check\": string, \
             \"reason\": string}]}.",
            true,
        ),
        (
            agents::DEEP_CHECKER,
            "You are a security analyst. Perform a deep analysis of the given aspect of the \
             URL. Base it on the web evidence supplied with the request, cite the sources \
             you relied on and recommend sites that can verify your conclusion.",
            false,
        ),
        (
            agents::BASIC_CHECKER,
            "You are a security analyst. Perform a basic analysis of the given aspect of the \
             URL using the web evidence supplied with the request and state plainly whether \
             it looks safe.",
            false,
        ),
        (
            agents::CHECK_ADJUDICATOR,
            "You review two analyses of the same security check and return only the text of \
             the single most useful one, unchanged.",
            false,
        ),
        (
            agents::SECURITY_REPORTER,
            "You write a URL security report for a non-technical reader from the supplied \
             findings. Answer with JSON: {\"url\": string, \"short_summary\": string, \
             \"markdown_report\": string, \"follow_up_checks\": [string]}.",
            true,
        ),
        (
            agents::HTML_RENDERER,
            "You turn a markdown report into a professional, well presented HTML document. \
             Output only the HTML, with no other text or explanation.",
            false,
        ),
    ];

    for (name, instruction, json_output) in definitions {
        let agent = LLMAgent::new(name, instruction, model.clone());
        let agent = if json_output {
            agent.with_json_output()
        } else {
            agent
        };
        registry.register(Arc::new(agent)).await;
    }
}

/// Render a markdown report as an HTML document through the renderer agent
pub async fn render_html(deps: &PipelineDeps, markdown: &str) -> Result<String> {
    let renderer = deps.agents.require(agents::HTML_RENDERER).await?;
    let html = renderer.run(format!("Content: {}", markdown)).await?;
    Ok(strip_fence(&html, "html").to_string())
}

/// Build both pipelines over one checkpoint store
pub fn runners(
    config: &StageflowConfig,
    deps: Arc<PipelineDeps>,
    suspension: SuspensionManager,
) -> Result<RunnerSet> {
    let engine = ExecutionEngine::new(suspension.clone())
        .with_retry(config.retry.policy())
        .with_max_steps(config.engine.max_steps);

    let mut set = RunnerSet::new(suspension);
    set.insert(WorkflowRunner::new(
        research::graph(deps.clone())?,
        engine.clone(),
    ));
    set.insert(WorkflowRunner::new(security::graph(deps)?, engine));
    Ok(set)
}
