//! Integration tests for graph execution, suspension and the bundled pipelines
//!
//! These tests drive complete start/resume cycles using mock agents, a mock
//! search port and in-memory stores.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use stageflow_rs::adk::agent::Agent;
use stageflow_rs::adk::error::{Result, StageflowError, WorkflowError};
use stageflow_rs::adk::model::{Content, GenerationConfig, Model, Part};
use stageflow_rs::stageflow::config::{ResearchSettings, SecuritySettings, StageflowConfig};
use stageflow_rs::stageflow::pipelines::{self, agents, research, security, PipelineDeps};
use stageflow_rs::stageflow::tools::{
    EmailSink, MemoryEmailSink, MemoryReportSink, PageContent, ReportFormat, SearchHit, SearchPort,
    SentEmail,
};
use stageflow_rs::stageflow::workflow::fanout::FanOutExecutor;
use stageflow_rs::stageflow::workflow::graph::{
    stage_fn, ExecutionEngine, StageGraphBuilder, StageOutput, END,
};
use stageflow_rs::stageflow::workflow::ranker::{select_top_k, Candidate, ScoredCandidate, Scores};
use stageflow_rs::stageflow::workflow::registry::AgentRegistry;
use stageflow_rs::stageflow::workflow::runner::{RunOutcome, RunnerSet, WorkflowRunner, DECISION_FIELD};
use stageflow_rs::stageflow::workflow::state::StateUpdate;
use stageflow_rs::stageflow::workflow::suspension::{
    FileCheckpointStore, MemoryCheckpointStore, SuspensionManager,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock Components
// ============================================================================

type Script = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Mock agent answering through a closure and counting its calls
struct ScriptedAgent {
    name: String,
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    fn new(name: &str, script: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: String) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(&input)
    }
}

/// Mock search port: two hits per query, one page per url
#[derive(Default)]
struct MockSearch {
    queries: Mutex<Vec<String>>,
    fetched: Mutex<Vec<String>>,
    /// Queries containing this text fail
    fail_matching: Mutex<Option<String>>,
}

#[async_trait]
impl SearchPort for MockSearch {
    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push(query.to_string());
        if let Some(pattern) = self.fail_matching.lock().unwrap().as_deref() {
            if query.contains(pattern) {
                return Err(StageflowError::api("search", "quota exhausted"));
            }
        }
        Ok((1..=2)
            .map(|i| SearchHit {
                title: format!("{} #{}", query, i),
                url: format!("https://{}.example/{}", query, i),
                content: String::new(),
                score: None,
            })
            .collect())
    }

    async fn fetch(&self, urls: &[String]) -> Result<Vec<PageContent>> {
        self.fetched.lock().unwrap().extend(urls.iter().cloned());
        Ok(urls
            .iter()
            .map(|url| PageContent {
                url: url.clone(),
                raw_content: format!("content of {}", url),
            })
            .collect())
    }
}

/// Email sink that always refuses
struct RefusingEmail;

#[async_trait]
impl EmailSink for RefusingEmail {
    async fn send(&self, _to: &str, _subject: &str, _html_body: &str) -> Result<()> {
        Err(StageflowError::api("sendgrid", "403 sender not verified"))
    }
}

/// Mock model that records whether JSON output was requested
struct MockModel {
    json_requests: AtomicUsize,
}

#[async_trait]
impl Model for MockModel {
    async fn generate_content(
        &self,
        _history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content> {
        if config.map(|c| c.json_output).unwrap_or(false) {
            self.json_requests.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Content {
            role: "assistant".to_string(),
            parts: vec![Part::Text("{\"ok\": true}".to_string())],
        })
    }
}

static QUERY_PLAN: Lazy<Value> = Lazy::new(|| {
    json!({
        "rephrased_topic": null,
        "items": (1..=6)
            .map(|n| json!({"query": format!("q{}", n), "reason": format!("angle {}", n)}))
            .collect::<Vec<_>>()
    })
});

static CHECK_PLAN: Lazy<Value> = Lazy::new(|| {
    json!({
        "checks": [
            {"check": "TLS validity", "reason": "transport security"},
            {"check": "Phishing risk", "reason": "credential theft"},
            {"check": "Redirects", "reason": "obfuscated destinations"}
        ]
    })
});

static URL_REPORT: Lazy<Value> = Lazy::new(|| {
    json!({
        "url": "https://example.com",
        "short_summary": "No obvious threats.",
        "markdown_report": "# Security report for https://example.com",
        "follow_up_checks": ["Monitor domain age"]
    })
});

/// q<n> scores n-1 on relevance, so q6, q5, q4 rank highest
fn score_query(input: &str) -> Result<String> {
    let n = (1..=6)
        .find(|n| input.contains(&format!("\"content\":\"q{}\"", n)))
        .ok_or_else(|| StageflowError::Other(format!("unexpected candidate: {}", input)))?;
    Ok(json!({
        "relevance": n - 1,
        "actionability": 1,
        "specificity": 1,
        "critique": null
    })
    .to_string())
}

struct Harness {
    runners: RunnerSet,
    reports: MemoryReportSink,
    search: Arc<MockSearch>,
    planner: Arc<ScriptedAgent>,
}

async fn harness(suspension: SuspensionManager) -> Harness {
    harness_with_email(suspension, Arc::new(MemoryEmailSink::new())).await
}

async fn harness_with_email(suspension: SuspensionManager, email: Arc<dyn EmailSink>) -> Harness {
    let registry = AgentRegistry::new();
    let planner = ScriptedAgent::new(agents::QUERY_PLANNER, |_| Ok(QUERY_PLAN.to_string()));
    registry.register(planner.clone()).await;
    registry
        .register(ScriptedAgent::new(agents::QUERY_EVALUATOR, score_query))
        .await;
    registry
        .register(ScriptedAgent::new(agents::RESEARCH_REPORTER, |input| {
            Ok(format!("# Report\n\n{}", input))
        }))
        .await;
    registry
        .register(ScriptedAgent::new(agents::CHECK_PLANNER, |_| {
            Ok(format!("```json\n{}\n```", *CHECK_PLAN))
        }))
        .await;
    registry
        .register(ScriptedAgent::new(agents::DEEP_CHECKER, |input| {
            Ok(format!("deep analysis of {}", input.lines().nth(1).unwrap_or("")))
        }))
        .await;
    registry
        .register(ScriptedAgent::new(agents::BASIC_CHECKER, |input| {
            if input.contains("Check: Redirects") {
                Err(StageflowError::api("checker", "rate limited"))
            } else {
                Ok("looks fine".to_string())
            }
        }))
        .await;
    registry
        .register(ScriptedAgent::new(agents::CHECK_ADJUDICATOR, |input| {
            let first = input
                .lines()
                .find_map(|l| l.strip_prefix("Feedback from checker 1: "))
                .unwrap_or("");
            Ok(first.to_string())
        }))
        .await;
    registry
        .register(ScriptedAgent::new(agents::SECURITY_REPORTER, |_| {
            Ok(URL_REPORT.to_string())
        }))
        .await;
    registry
        .register(ScriptedAgent::new(agents::HTML_RENDERER, |input| {
            let markdown = input.strip_prefix("Content: ").unwrap_or(input);
            Ok(format!("```html\n<html>{}</html>\n```", markdown))
        }))
        .await;

    let search = Arc::new(MockSearch::default());
    let reports = MemoryReportSink::new();
    let deps = Arc::new(PipelineDeps {
        agents: registry,
        search: search.clone(),
        reports: Arc::new(reports.clone()),
        email,
        research: ResearchSettings {
            num_queries: 6,
            top_k: 3,
            search_delay_ms: 0,
            ..ResearchSettings::default()
        },
        security: SecuritySettings::default(),
        fanout: FanOutExecutor::new(),
    });

    let runners = pipelines::runners(&StageflowConfig::default(), deps, suspension).unwrap();
    Harness {
        runners,
        reports,
        search,
        planner,
    }
}

fn memory_suspension() -> SuspensionManager {
    SuspensionManager::new(Arc::new(MemoryCheckpointStore::new()))
}

fn seed(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

// ============================================================================
// Engine Tests
// ============================================================================

/// A -> B -> [C] -> {approved: D, rejected: END}
fn approval_runner() -> WorkflowRunner {
    let graph = StageGraphBuilder::new("abcd")
        .add_stage(
            "a",
            stage_fn(|_ctx, state| async move {
                let topic = state.get_str("topic").unwrap_or_default().to_string();
                Ok(StageOutput::update(
                    StateUpdate::new().set("normalized", topic.to_uppercase()),
                ))
            }),
        )
        .add_stage(
            "b",
            stage_fn(|_ctx, _state| async {
                Ok(StageOutput::update(
                    StateUpdate::new().set("candidates", json!(["c1", "c2"])),
                ))
            }),
        )
        .add_interrupt_stage(
            "c",
            stage_fn(|_ctx, state| async move {
                match state.get_bool(DECISION_FIELD) {
                    Some(approved) => Ok(StageOutput::update(
                        StateUpdate::new().set("approved", approved),
                    )),
                    None => Ok(StageOutput::interrupt(
                        "Approve candidates?",
                        state.get("candidates").cloned().unwrap_or(Value::Null),
                    )),
                }
            }),
        )
        .add_stage(
            "d",
            stage_fn(|_ctx, _state| async {
                Ok(StageOutput::update(StateUpdate::new().set("d_output", "done")))
            }),
        )
        .add_edge("a", "b")
        .add_edge("b", "c")
        .add_conditional_edge(
            "c",
            |state| {
                if state.get_bool("approved").unwrap_or(false) {
                    "approved".to_string()
                } else {
                    "rejected".to_string()
                }
            },
            &[("approved", "d"), ("rejected", END)],
        )
        .add_edge("d", END)
        .set_entry("a")
        .build()
        .unwrap();

    WorkflowRunner::new(graph, ExecutionEngine::new(memory_suspension()))
}

#[tokio::test]
async fn test_approval_scenario_rejected() {
    let runner = approval_runner();

    let outcome = runner
        .start("t1", seed(&[("topic", json!("x"))]))
        .await
        .unwrap();
    match &outcome {
        RunOutcome::Suspended { stage, data, .. } => {
            assert_eq!(stage, "c");
            assert_eq!(data, &json!(["c1", "c2"]));
        }
        other => panic!("expected suspension, got {:?}", other),
    }

    match runner.resume("t1", json!(false)).await.unwrap() {
        RunOutcome::Completed(state) => {
            assert_eq!(state.get_str("normalized"), Some("X"));
            assert_eq!(state.get_bool("approved"), Some(false));
            assert!(!state.contains("d_output"));
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_approval_scenario_approved() {
    let runner = approval_runner();
    runner
        .start("t2", seed(&[("topic", json!("x"))]))
        .await
        .unwrap();

    match runner.resume("t2", json!(true)).await.unwrap() {
        RunOutcome::Completed(state) => {
            assert_eq!(state.get_str("d_output"), Some("done"));
            assert!(!state.contains(DECISION_FIELD));
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert!(runner.pending("t2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_resume_unknown_instance_is_not_found() {
    let runner = approval_runner();
    match runner.resume("never-started", json!(true)).await {
        Err(StageflowError::CheckpointNotFound { instance_id }) => {
            assert_eq!(instance_id, "never-started")
        }
        other => panic!("expected CheckpointNotFound, got {:?}", other),
    }
}

#[test]
fn test_top_k_over_score_sums() {
    let sums = [5, 5, 4, 4, 4, 3, 2, 2, 1, 0];
    let scored: Vec<ScoredCandidate> = sums
        .iter()
        .enumerate()
        .map(|(i, sum)| ScoredCandidate {
            candidate: Candidate::new(format!("pos{}", i), ""),
            scores: Scores::new(*sum, 0, 0).unwrap(),
            critique: None,
        })
        .collect();

    let top: Vec<String> = select_top_k(&scored, 3)
        .into_iter()
        .map(|s| s.candidate.content)
        .collect();
    assert_eq!(top, vec!["pos0", "pos1", "pos2"]);

    let all = select_top_k(&scored, 50);
    assert_eq!(all.len(), 10);
    assert_eq!(select_top_k(&all, 50), all);
}

#[tokio::test]
async fn test_fan_out_with_one_failure() {
    let result = FanOutExecutor::new()
        .run_all((1..=5).collect(), |item: usize| async move {
            if item == 3 {
                Err(StageflowError::SubTask("item 3 failed".into()))
            } else {
                Ok(item)
            }
        })
        .await;

    assert_eq!(result.outputs.len(), 4);
    assert_eq!(result.attempted, 5);
    assert_eq!(result.completed, 5);
    assert_eq!(result.succeeded, 4);
    assert!(!result.outputs.contains(&3));
}

// ============================================================================
// Research Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_research_pipeline_approved() {
    let h = harness(memory_suspension()).await;
    let runner = h.runners.get(research::WORKFLOW).unwrap();

    let outcome = runner.start("r1", research::seed("rust")).await.unwrap();
    let data = match outcome {
        RunOutcome::Suspended {
            stage,
            prompt,
            data,
            ..
        } => {
            assert_eq!(stage, research::stages::APPROVE_QUERIES);
            assert_eq!(prompt, research::APPROVAL_PROMPT);
            data
        }
        other => panic!("expected suspension, got {:?}", other),
    };
    let selected: Vec<ScoredCandidate> = serde_json::from_value(data).unwrap();
    let queries: Vec<&str> = selected
        .iter()
        .map(|s| s.candidate.content.as_str())
        .collect();
    assert_eq!(queries, vec!["q6", "q5", "q4"]);
    assert!(h.search.queries.lock().unwrap().is_empty());

    let outcome = h.runners.resume("r1", json!(true)).await.unwrap();
    let state = match outcome {
        RunOutcome::Completed(state) => state,
        other => panic!("expected completion, got {:?}", other),
    };

    assert_eq!(*h.search.queries.lock().unwrap(), vec!["q6", "q5", "q4"]);
    let results: Vec<SearchHit> = state.require(research::fields::SEARCH_RESULTS).unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|hit| hit.url.ends_with("/1")));

    let contents = state.get_str(research::fields::PAGE_CONTENTS).unwrap();
    assert!(contents.starts_with("Source: https://q6.example/1\ncontent of https://q6.example/1"));

    let reports = h.reports.reports().await;
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].name, "rust");
    assert_eq!(reports[0].format, ReportFormat::Markdown);
    assert!(reports[0].content.contains("Topic: rust"));
    assert_eq!(reports[1].name, "rust");
    assert_eq!(reports[1].format, ReportFormat::Html);
    assert!(reports[1].content.starts_with("<html># Report"));
    assert!(reports[1].content.ends_with("</html>"));
    assert_eq!(
        state.get_str(research::fields::REPORT_LOCATION),
        Some("memory://0")
    );
    assert_eq!(
        state.get_str(research::fields::HTML_REPORT_LOCATION),
        Some("memory://1")
    );
}

#[tokio::test]
async fn test_research_resume_with_bad_decision_keeps_checkpoint() {
    let h = harness(memory_suspension()).await;
    h.runners
        .get(research::WORKFLOW)
        .unwrap()
        .start("r5", research::seed("rust"))
        .await
        .unwrap();

    match h.runners.resume("r5", json!("yes please")).await {
        Err(StageflowError::InvalidField { field, .. }) => assert_eq!(field, DECISION_FIELD),
        other => panic!("expected InvalidField, got {:?}", other),
    }
    assert!(h.runners.pending("r5").await.unwrap().is_some());
    assert!(h.search.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_research_pipeline_rejected_skips_search() {
    let h = harness(memory_suspension()).await;
    h.runners
        .get(research::WORKFLOW)
        .unwrap()
        .start("r2", research::seed("rust"))
        .await
        .unwrap();

    match h.runners.resume("r2", json!(false)).await.unwrap() {
        RunOutcome::Completed(state) => {
            assert_eq!(state.get_bool(research::fields::QUERIES_APPROVED), Some(false));
            assert!(!state.contains(research::fields::SEARCH_RESULTS));
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert!(h.search.queries.lock().unwrap().is_empty());
    assert!(h.reports.reports().await.is_empty());
}

#[tokio::test]
async fn test_research_start_twice_conflicts() {
    let h = harness(memory_suspension()).await;
    let runner = h.runners.get(research::WORKFLOW).unwrap();
    runner.start("r3", research::seed("rust")).await.unwrap();

    assert!(matches!(
        runner.start("r3", research::seed("rust")).await,
        Err(StageflowError::PendingCheckpoint { .. })
    ));
    assert_eq!(h.planner.calls(), 1);

    h.runners.discard("r3").await.unwrap();
    assert!(runner.start("r3", research::seed("rust")).await.is_ok());
}

#[tokio::test]
async fn test_resume_across_processes_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let file_suspension =
        || SuspensionManager::new(Arc::new(FileCheckpointStore::new(dir.path().to_path_buf())));

    {
        let first = harness(file_suspension()).await;
        let outcome = first
            .runners
            .get(research::WORKFLOW)
            .unwrap()
            .start("r4", research::seed("persistence"))
            .await
            .unwrap();
        assert!(outcome.is_suspended());
    }

    let second = harness(file_suspension()).await;
    let checkpoint = second.runners.pending("r4").await.unwrap().unwrap();
    assert_eq!(checkpoint.workflow, research::WORKFLOW);

    let outcome = second.runners.resume("r4", json!(true)).await.unwrap();
    assert!(!outcome.is_suspended());
    assert_eq!(second.planner.calls(), 0);
    assert_eq!(second.search.queries.lock().unwrap().len(), 3);
    assert!(second.runners.pending("r4").await.unwrap().is_none());
}

// ============================================================================
// Security Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_security_pipeline_drops_failed_check() {
    let emails = MemoryEmailSink::new();
    let h = harness_with_email(memory_suspension(), Arc::new(emails.clone())).await;

    let outcome = h
        .runners
        .get(security::WORKFLOW)
        .unwrap()
        .start(
            "s1",
            security::seed("https://example.com", Some("alice@example.com")),
        )
        .await
        .unwrap();
    let state = match outcome {
        RunOutcome::Completed(state) => state,
        other => panic!("expected completion, got {:?}", other),
    };

    assert_eq!(state.get(security::fields::CHECKS_ATTEMPTED), Some(&json!(3)));
    assert_eq!(state.get(security::fields::CHECKS_SUCCEEDED), Some(&json!(2)));

    let findings: Vec<security::Finding> = state.require(security::fields::FINDINGS).unwrap();
    let mut checks: Vec<&str> = findings.iter().map(|f| f.check.as_str()).collect();
    checks.sort();
    assert_eq!(checks, vec!["Phishing risk", "TLS validity"]);
    assert!(findings
        .iter()
        .all(|f| f.verdict == format!("deep analysis of Check: {}", f.check)));

    let mut queries = h.search.queries.lock().unwrap().clone();
    queries.sort();
    assert_eq!(
        queries,
        vec![
            "example.com Phishing risk",
            "example.com Redirects",
            "example.com TLS validity"
        ]
    );

    let reports = h.reports.reports().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].name, "security example.com");
    assert!(reports[0].content.starts_with("# Security report"));
    assert!(reports[0].content.contains("- Monitor domain age"));
    assert!(reports[0]
        .content
        .contains("2 of 3 planned checks produced findings."));
    assert_eq!(
        state.get_str(security::fields::SUMMARY),
        Some("No obvious threats.")
    );

    let sent = emails.sent().await;
    assert_eq!(sent.len(), 1);
    let SentEmail {
        to,
        subject,
        html_body,
    } = &sent[0];
    assert_eq!(to, "alice@example.com");
    assert_eq!(subject, "URL security report for example.com");
    assert!(html_body.starts_with("<html># Security report"));
    assert_eq!(
        state.get_str(security::fields::DELIVERY_STATUS),
        Some("Email sent to alice@example.com")
    );
}

#[tokio::test]
async fn test_security_evidence_search_failure_drops_only_that_check() {
    let h = harness(memory_suspension()).await;
    *h.search.fail_matching.lock().unwrap() = Some("Phishing".to_string());

    let outcome = h
        .runners
        .get(security::WORKFLOW)
        .unwrap()
        .start("s4", security::seed("https://example.com", None))
        .await
        .unwrap();
    let state = match outcome {
        RunOutcome::Completed(state) => state,
        other => panic!("expected completion, got {:?}", other),
    };

    // Redirects fails in the basic checker, Phishing risk in its search
    let findings: Vec<security::Finding> = state.require(security::fields::FINDINGS).unwrap();
    let checks: Vec<&str> = findings.iter().map(|f| f.check.as_str()).collect();
    assert_eq!(checks, vec!["TLS validity"]);
    assert_eq!(state.get(security::fields::CHECKS_ATTEMPTED), Some(&json!(3)));
    assert_eq!(state.get(security::fields::CHECKS_SUCCEEDED), Some(&json!(1)));

    // No address, so nothing is delivered
    assert!(!state.contains(security::fields::DELIVERY_STATUS));
    assert_eq!(h.reports.reports().await.len(), 1);
}

#[tokio::test]
async fn test_security_email_failure_still_completes() {
    let h = harness_with_email(memory_suspension(), Arc::new(RefusingEmail)).await;

    let outcome = h
        .runners
        .get(security::WORKFLOW)
        .unwrap()
        .start(
            "s5",
            security::seed("https://example.com", Some("bob@example.com")),
        )
        .await
        .unwrap();
    let state = match outcome {
        RunOutcome::Completed(state) => state,
        other => panic!("expected completion, got {:?}", other),
    };

    let status = state.get_str(security::fields::DELIVERY_STATUS).unwrap();
    assert!(status.starts_with("Failed to send email to bob@example.com"));
    assert!(status.contains("sender not verified"));
    assert_eq!(
        state.get_str(security::fields::REPORT_LOCATION),
        Some("memory://0")
    );
    assert!(h.runners.pending("s5").await.unwrap().is_none());
}

#[tokio::test]
async fn test_security_guardrail_rejects_before_planning() {
    let h = harness(memory_suspension()).await;
    let runner = h.runners.get(security::WORKFLOW).unwrap();

    match runner
        .start("s2", security::seed("not a url", Some("nobody")))
        .await
    {
        Err(StageflowError::Guardrail(rejection)) => assert_eq!(
            rejection.reasons,
            vec![security::URL_REJECTED, security::EMAIL_REJECTED]
        ),
        other => panic!("expected guardrail rejection, got {:?}", other),
    }
    assert!(h.reports.reports().await.is_empty());
    assert!(runner.pending("s2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_security_pipeline_fails_loudly_on_missing_agent() {
    let registry = AgentRegistry::new();
    registry
        .register(ScriptedAgent::new(agents::CHECK_PLANNER, |_| {
            Ok(CHECK_PLAN.to_string())
        }))
        .await;
    let deps = Arc::new(PipelineDeps {
        agents: registry,
        search: Arc::new(MockSearch::default()),
        reports: Arc::new(MemoryReportSink::new()),
        email: Arc::new(MemoryEmailSink::new()),
        research: ResearchSettings::default(),
        security: SecuritySettings::default(),
        fanout: FanOutExecutor::new(),
    });
    let runners = pipelines::runners(&StageflowConfig::default(), deps, memory_suspension()).unwrap();

    let result = runners
        .get(security::WORKFLOW)
        .unwrap()
        .start("s3", security::seed("https://example.com", None))
        .await;
    assert!(matches!(
        result,
        Err(StageflowError::Workflow(WorkflowError::UnknownAgent(ref name)))
            if name == agents::DEEP_CHECKER
    ));
}

// ============================================================================
// Wiring Tests
// ============================================================================

#[tokio::test]
async fn test_register_agents_wires_every_pipeline_agent() {
    let model = Arc::new(MockModel {
        json_requests: AtomicUsize::new(0),
    });
    let registry = AgentRegistry::new();
    pipelines::register_agents(&registry, model.clone()).await;

    let names = registry.names().await;
    assert_eq!(names.len(), 9);
    assert!(names.contains(&agents::CHECK_ADJUDICATOR.to_string()));
    assert!(names.contains(&agents::HTML_RENDERER.to_string()));

    let planner = registry.require(agents::QUERY_PLANNER).await.unwrap();
    assert_eq!(planner.run("topic".into()).await.unwrap(), "{\"ok\": true}");
    assert_eq!(model.json_requests.load(Ordering::SeqCst), 1);

    let checker = registry.require(agents::BASIC_CHECKER).await.unwrap();
    checker.run("check".into()).await.unwrap();
    assert_eq!(model.json_requests.load(Ordering::SeqCst), 1);
}

#[test]
fn test_graphs_render_as_mermaid() {
    let deps = Arc::new(PipelineDeps {
        agents: AgentRegistry::new(),
        search: Arc::new(MockSearch::default()),
        reports: Arc::new(MemoryReportSink::new()),
        email: Arc::new(MemoryEmailSink::new()),
        research: ResearchSettings::default(),
        security: SecuritySettings::default(),
        fanout: FanOutExecutor::new(),
    });

    let research_graph = research::graph(deps.clone()).unwrap().to_mermaid();
    assert!(research_graph.contains("approve_queries{{approve_queries}}"));
    assert!(research_graph.contains("approve_queries -- approved --> perform_search"));
    assert!(research_graph.contains("approve_queries -- rejected --> __end__"));

    let security_graph = security::graph(deps).unwrap().to_mermaid();
    assert!(security_graph.contains("plan_checks --> run_checks"));
    assert!(security_graph.contains("write_report -- email --> deliver_report"));
    assert!(security_graph.contains("write_report -- skip --> __end__"));
}
