//! Sequential negotiation between the arbiter and individual reviewers.

mod control;

pub use control::parse_control;

use crate::agent::Agent;
use crate::config::ArbiterMode;
use crate::error::{InvocationError, ProtocolError};
use crate::memo;
use crate::progress::Progress;
use crate::prompt::{self, ArbiterPrompt, Brief};
use crate::runner::Invoker;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Reviews keyed by agent name. `latest` (after cross-check) is
/// authoritative; `initial` is kept for provenance.
#[derive(Debug, Clone, Default)]
pub struct ReviewSet {
    pub initial: BTreeMap<String, String>,
    pub latest: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaExchange {
    pub target: String,
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbiterControl {
    Query { target: String, question: String },
    Final { report: String },
}

#[derive(Debug)]
pub struct ArbiterOutcome {
    pub report: String,
    pub history: Vec<QaExchange>,
    /// Arbiter invocations made, the forced final one included
    pub calls: usize,
}

pub struct ArbiterEngine<'a> {
    pub arbiter: &'a Agent,
    pub reviewers: &'a [Arc<Agent>],
    pub invoker: &'a Invoker,
    pub brief: Brief<'a>,
    pub mode: ArbiterMode,
    pub max_queries: usize,
    pub include_low_priority: bool,
    pub progress: &'a Progress,
}

impl ArbiterEngine<'_> {
    fn budget(&self) -> usize {
        match self.mode {
            ArbiterMode::Single => 0,
            ArbiterMode::Multi => self.max_queries,
        }
    }

    /// Run the loop until the arbiter produces a final report.
    ///
    /// The arbiter may query while fewer than `budget` questions have been
    /// asked; after that it is called once more with queries disallowed.
    /// Protocol violations end the loop with an error report.
    pub async fn run(&self, reviews: &ReviewSet) -> Result<ArbiterOutcome, InvocationError> {
        let budget = self.budget();
        let names: Vec<String> = self.reviewers.iter().map(|a| a.name.clone()).collect();
        let mut history: Vec<QaExchange> = Vec::new();
        let mut calls = 0;

        loop {
            let allow_queries = history.len() < budget;
            if allow_queries {
                info!("Arbiter step {}/{}", history.len() + 1, budget);
            } else {
                info!("Arbiter final decision (no further questions)");
            }

            let prompt = ArbiterPrompt {
                name: &self.arbiter.name,
                brief: self.brief,
                reviewers: &names,
                reviews,
                history: &history,
                max_queries: budget,
                include_low_priority: self.include_low_priority,
                allow_queries,
            }
            .render();

            let raw = self.invoker.call(self.arbiter, &prompt).await?;
            calls += 1;

            let decision = parse_control(&raw).and_then(|control| self.vet(control, allow_queries));
            match decision {
                Ok(ArbiterControl::Final { report }) => {
                    return Ok(ArbiterOutcome {
                        report,
                        history,
                        calls,
                    });
                }
                Ok(ArbiterControl::Query { target, question }) => {
                    let answer = self.ask(&target, &question, reviews, &history).await?;
                    history.push(QaExchange {
                        target,
                        question,
                        answer,
                    });
                    self.progress.set_arbiter_step(history.len());
                }
                Err(violation) => {
                    warn!("{}", violation);
                    return Ok(ArbiterOutcome {
                        report: error_report(&violation),
                        history,
                        calls,
                    });
                }
            }
        }
    }

    /// Enforce the query rules on a parsed control object
    fn vet(
        &self,
        control: ArbiterControl,
        allow_queries: bool,
    ) -> Result<ArbiterControl, ProtocolError> {
        match control {
            ArbiterControl::Query { target, question } if !allow_queries => {
                Err(ProtocolError::QueryDisallowed { target, question })
            }
            ArbiterControl::Query { target, question }
                if !self.reviewers.iter().any(|a| a.name == target) =>
            {
                Err(ProtocolError::UnknownTarget { target, question })
            }
            other => Ok(other),
        }
    }

    async fn ask(
        &self,
        target: &str,
        question: &str,
        reviews: &ReviewSet,
        history: &[QaExchange],
    ) -> Result<String, InvocationError> {
        info!("Arbiter asks {} a follow-up question", target);
        let Some(agent) = self.reviewers.iter().find(|a| a.name == target) else {
            // vet() guarantees the target exists
            return Ok(String::new());
        };

        let latest = reviews.latest.get(target).map(String::as_str).unwrap_or_default();
        let prompt = prompt::follow_up(
            &agent.name,
            &self.brief,
            latest,
            question,
            &prompt::qa_snippet_for(history, target),
            &memo::load(agent),
        );
        let answer = self.invoker.invoke(agent, &prompt).await?;
        info!("Received answer from {}", target);
        Ok(answer)
    }
}

fn error_report(violation: &ProtocolError) -> String {
    let detail = match violation {
        ProtocolError::QueryDisallowed { target, question } => format!(
            "The arbiter tried to ask a follow-up question when no further questions \
             were allowed.\n\nRaw control object:\n\ntarget: {}\nquestion: {}",
            target, question
        ),
        ProtocolError::UnknownTarget { target, question } => format!(
            "The arbiter referred to unknown reviewer `{}`.\n\nRaw control object:\n\n\
             target: {}\nquestion: {}",
            target, target, question
        ),
        ProtocolError::MalformedControl { raw } => format!(
            "The arbiter returned a control object that is neither a query nor a \
             final report.\n\nRaw control object:\n\n{}",
            raw
        ),
        other => other.to_string(),
    };
    format!("## Arbiter Error\n\n{}", detail)
}
