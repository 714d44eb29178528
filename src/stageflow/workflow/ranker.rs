// SPDX-License-Identifier: MIT

//! Candidate scoring and top-K selection
//!
//! Every candidate gets three 0-5 criteria scores from an evaluator;
//! [`select_top_k`] keeps the best by total, ties in evaluation order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::adk::agent::{run_structured, Agent};
use crate::adk::error::{Result, StageflowError};

/// Highest value any criterion may take
pub const MAX_SCORE: u8 = 5;

/// An item proposed by one stage for a later stage to act on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// The payload, e.g. a search query
    pub content: String,
    /// Why the candidate was proposed
    #[serde(default)]
    pub reason: String,
}

impl Candidate {
    pub fn new(content: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reason: reason.into(),
        }
    }
}

/// The three criteria, always populated together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawScores")]
pub struct Scores {
    relevance: u8,
    actionability: u8,
    specificity: u8,
}

#[derive(Deserialize)]
struct RawScores {
    relevance: i64,
    actionability: i64,
    specificity: i64,
}

impl TryFrom<RawScores> for Scores {
    type Error = StageflowError;

    fn try_from(raw: RawScores) -> Result<Self> {
        Scores::new(raw.relevance, raw.actionability, raw.specificity)
    }
}

impl Scores {
    /// Validate each criterion into 0..=5
    pub fn new(relevance: i64, actionability: i64, specificity: i64) -> Result<Self> {
        Ok(Self {
            relevance: criterion("relevance", relevance)?,
            actionability: criterion("actionability", actionability)?,
            specificity: criterion("specificity", specificity)?,
        })
    }

    pub fn relevance(&self) -> u8 {
        self.relevance
    }

    pub fn actionability(&self) -> u8 {
        self.actionability
    }

    pub fn specificity(&self) -> u8 {
        self.specificity
    }

    pub fn total(&self) -> u32 {
        u32::from(self.relevance) + u32::from(self.actionability) + u32::from(self.specificity)
    }
}

fn criterion(name: &str, value: i64) -> Result<u8> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= MAX_SCORE)
        .ok_or_else(|| StageflowError::InvalidField {
            field: name.to_string(),
            reason: format!("score {} is outside 0..={}", value, MAX_SCORE),
        })
}

/// A candidate with its evaluation attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub scores: Scores,
    pub critique: Option<String>,
}

impl ScoredCandidate {
    pub fn total(&self) -> u32 {
        self.scores.total()
    }
}

/// What an evaluator says about one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(flatten)]
    pub scores: Scores,
    #[serde(default)]
    pub critique: Option<String>,
}

/// External collaborator that scores candidates
#[async_trait]
pub trait CandidateEvaluator: Send + Sync {
    async fn evaluate(&self, candidate: &Candidate) -> Result<Evaluation>;
}

/// Evaluator backed by an agent answering in JSON
pub struct AgentEvaluator {
    agent: Arc<dyn Agent>,
    context: String,
}

impl AgentEvaluator {
    /// `context` is prepended to every request, e.g. the research topic
    pub fn new(agent: Arc<dyn Agent>, context: impl Into<String>) -> Self {
        Self {
            agent,
            context: context.into(),
        }
    }
}

#[async_trait]
impl CandidateEvaluator for AgentEvaluator {
    async fn evaluate(&self, candidate: &Candidate) -> Result<Evaluation> {
        let input = format!(
            "{}\n\nCandidate: {}",
            self.context,
            serde_json::to_string(candidate)?
        );
        run_structured(self.agent.as_ref(), input).await
    }
}

/// Scores candidates one at a time through an evaluator
pub struct Ranker {
    evaluator: Arc<dyn CandidateEvaluator>,
}

impl Ranker {
    pub fn new(evaluator: Arc<dyn CandidateEvaluator>) -> Self {
        Self { evaluator }
    }

    /// Score every candidate, preserving input order
    ///
    /// An evaluator failure fails the whole call; partially scored
    /// lists are never returned.
    pub async fn score(&self, candidates: &[Candidate]) -> Result<Vec<ScoredCandidate>> {
        let mut scored = Vec::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            let evaluation = self.evaluator.evaluate(candidate).await?;
            log::debug!(
                "Scored candidate {}/{} '{}': {}",
                i + 1,
                candidates.len(),
                candidate.content,
                evaluation.scores.total()
            );
            scored.push(ScoredCandidate {
                candidate: candidate.clone(),
                scores: evaluation.scores,
                critique: evaluation.critique,
            });
        }
        log::info!("Scored {} candidates", scored.len());
        Ok(scored)
    }
}

/// The `k` best candidates by total score, ties in input order
pub fn select_top_k(scored: &[ScoredCandidate], k: usize) -> Vec<ScoredCandidate> {
    let mut ranked = scored.to_vec();
    // sort_by is stable
    ranked.sort_by(|a, b| b.total().cmp(&a.total()));
    ranked.truncate(k);
    ranked
}
