//! Command-line and environment configuration
//!
//! Everything a front-end needs to open an analysis session: where datasets
//! live, where sandboxes run, which interpreter to use, and the shared model
//! service and prompt table.

use crate::dataset::{DatasetContext, DatasetError};
use crate::llm::{LlmConfig, LlmError, LlmService};
use crate::orchestrator::Orchestrator;
use crate::prompts::{PromptRegistry, UnknownPromptVersion};
use crate::sandbox::SandboxExecutor;
use crate::tools::{ToolDispatcher, CHARTS_DIR};
use clap::{Args, Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(
    name = "data-analyst",
    version,
    about = "Ask questions about a tabular dataset; a model answers by running Python"
)]
pub struct Cli {
    #[command(flatten)]
    pub options: GlobalOptions,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalOptions {
    /// Directory bare dataset names are resolved in
    #[arg(long, env = "ANALYST_DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,
    /// Dataset file (csv, tsv, json, parquet, xlsx)
    #[arg(short = 'd', long = "data", default_value = "campaigns.csv", global = true)]
    pub data: String,
    /// Prompt version (default: latest)
    #[arg(short, long, global = true)]
    pub prompt: Option<String>,
    /// Root for sandbox working directories
    #[arg(long, env = "ANALYST_WORKSPACE", global = true)]
    pub workspace: Option<PathBuf>,
    /// Python interpreter with pandas and matplotlib installed
    #[arg(long, env = "ANALYST_PYTHON", default_value = "python3", global = true)]
    pub python: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive analysis session
    Chat,
    /// Answer a single question and exit
    Ask {
        #[arg(short, long)]
        question: String,
    },
    /// Run the same questions across prompt versions and save the answers
    Compare {
        /// Prompt versions to compare (default: all)
        #[arg(long, num_args = 1..)]
        prompts: Vec<String>,
        /// Custom questions (default: built-in evaluation set)
        #[arg(short, long, num_args = 1..)]
        questions: Vec<String>,
    },
    /// Serve the chat UI API
    Serve {
        #[arg(long, env = "ANALYST_PORT", default_value_t = 8000)]
        port: u16,
    },
    /// List prompt versions
    Prompts,
}

/// Opening a session failed before any turn ran
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    UnknownPrompt(#[from] UnknownPromptVersion),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("Failed to prepare sandbox directory {path}: {source}")]
    Workspace {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Resolved settings shared by every session of one process
#[derive(Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub default_data: String,
    pub default_prompt: Option<String>,
    pub workspace: PathBuf,
    pub python: PathBuf,
    pub max_tokens: u32,
    pub prompts: Arc<PromptRegistry>,
    pub llm: Arc<dyn LlmService>,
}

impl Settings {
    /// Combine command-line options with the model service environment
    pub fn load(options: &GlobalOptions) -> Result<Self, LlmError> {
        let llm_config = LlmConfig::from_env();
        let llm = llm_config.build_service()?;
        tracing::info!(model = %llm.model_id(), gateway = llm_config.gateway.is_some(), "Model service configured");
        Ok(Self::new(options, llm, llm_config.max_tokens))
    }

    pub fn new(options: &GlobalOptions, llm: Arc<dyn LlmService>, max_tokens: u32) -> Self {
        Self {
            data_dir: options.data_dir.clone(),
            default_data: options.data.clone(),
            default_prompt: options.prompt.clone(),
            workspace: options
                .workspace
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("data-analyst")),
            python: options.python.clone(),
            max_tokens,
            prompts: Arc::new(PromptRegistry::builtin()),
            llm,
        }
    }

    /// Sandbox working directory for a session
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.workspace.join("sessions").join(session_id)
    }

    /// Open a session with its own sandbox directory.
    ///
    /// `prompt` and `data_file` fall back to the process defaults.
    pub fn open_session(
        &self,
        session_id: &str,
        prompt: Option<&str>,
        data_file: Option<&str>,
    ) -> Result<Orchestrator, SessionError> {
        let dataset = DatasetContext::resolve(&self.data_dir, data_file.unwrap_or(&self.default_data))?;
        let (dataset_name, dataset_format) = (dataset.display_name(), dataset.format());
        let dir = self.session_dir(session_id);
        let executor = SandboxExecutor::new(&dir, self.python.clone())
            .map_err(|source| SessionError::Workspace { path: dir, source })?;
        let tools = Arc::new(ToolDispatcher::new(session_id, executor, dataset));

        let orchestrator = Orchestrator::new(
            session_id,
            self.llm.clone(),
            tools,
            self.prompts.clone(),
            prompt.or(self.default_prompt.as_deref()),
        )?
        .with_max_tokens(self.max_tokens);

        tracing::info!(
            session_id = %session_id,
            prompt = %orchestrator.prompt_version(),
            dataset = %dataset_name,
            format = ?dataset_format,
            "Session opened"
        );
        Ok(orchestrator)
    }

    /// Remove a finished session's sandbox directory.
    ///
    /// With `keep_charts`, collected charts whose paths were already shown
    /// survive and everything else goes.
    pub async fn close_session(&self, session_id: &str, keep_charts: bool) {
        let dir = self.session_dir(session_id);
        if let Err(e) = discard_dir(&dir, keep_charts).await {
            tracing::warn!(session_id = %session_id, dir = %dir.display(), error = %e, "Failed to clean up session directory");
        }
    }
}

async fn discard_dir(dir: &Path, keep_charts: bool) -> io::Result<()> {
    let charts = dir.join(CHARTS_DIR);
    if !(keep_charts && has_entries(&charts).await) {
        return match tokio::fs::remove_dir_all(dir).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        };
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path == charts {
            continue;
        }
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
    }
    Ok(())
}

async fn has_entries(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => entries.next_entry().await.is_ok_and(|entry| entry.is_some()),
        Err(_) => false,
    }
}

/// Resolve `path` relative to the current directory for display
pub fn display_path(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}
