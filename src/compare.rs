//! Prompt comparison
//!
//! Runs the same questions against several prompt versions, each in a fresh
//! session, and saves the answers side by side as a JSON report.

use crate::config::{SessionError, Settings};
use crate::console::ConsoleObserver;
use crate::orchestrator::AgentObserver;
use crate::prompts::UnknownPromptVersion;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Built-in evaluation set
pub const EVAL_QUESTIONS: &[&str] = &[
    "Which campaign has the best CPA?",
    "How does performance vary by channel?",
    "What trends do you see over time?",
    "Where should we reallocate budget to improve overall ROAS?",
];

#[derive(Debug, Error)]
pub enum CompareError {
    #[error(transparent)]
    UnknownPrompt(#[from] UnknownPromptVersion),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub question: String,
    /// Answer per prompt version, or `[error]: ...` when the step failed
    pub responses: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub timestamp: DateTime<Local>,
    pub data_file: String,
    pub comparisons: Vec<Comparison>,
}

impl ComparisonReport {
    /// `<dir>/comparison_<YYYYMMDD_HHMMSS>.json`
    pub fn file_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("comparison_{}.json", self.timestamp.format("%Y%m%d_%H%M%S")))
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf, CompareError> {
        let path = self.file_path(dir);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::create_dir_all(dir)
            .and_then(|()| std::fs::write(&path, json))
            .map_err(|source| CompareError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

/// Ask every question under every version.
///
/// All versions are checked before the first question runs. A failed step
/// is recorded in the report rather than aborting the comparison.
pub async fn compare_prompts(
    settings: &Settings,
    versions: &[String],
    questions: &[String],
    verbose: bool,
) -> Result<ComparisonReport, CompareError> {
    for version in versions {
        settings.prompts.resolve(version)?;
    }

    let data_file = settings.default_data.clone();
    let mut report = ComparisonReport {
        timestamp: Local::now(),
        data_file: data_file.clone(),
        comparisons: Vec::with_capacity(questions.len()),
    };

    for question in questions {
        let mut responses = BTreeMap::new();
        for version in versions {
            println!("\n{}", "=".repeat(60));
            println!("[{version}] {question}");
            println!("{}", "=".repeat(60));

            let session_id = uuid::Uuid::new_v4().to_string();
            let agent = settings.open_session(&session_id, Some(version), Some(&data_file))?;
            let mut agent = if verbose {
                agent.with_observer(Arc::new(ConsoleObserver::new(true)) as Arc<dyn AgentObserver>)
            } else {
                agent
            };

            let answer = match agent.step(Some(question.clone()), &CancellationToken::new()).await {
                Ok(answer) => answer,
                Err(e) => {
                    tracing::warn!(version = %version, error = %e, "Comparison step failed");
                    format!("[error]: {e}")
                }
            };
            settings.close_session(&session_id, false).await;
            responses.insert(version.clone(), answer);
        }
        report.comparisons.push(Comparison {
            question: question.clone(),
            responses,
        });
    }

    Ok(report)
}
