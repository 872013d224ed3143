//! HTTP API for the chat UI
//!
//! Each session owns an orchestrator and a sandbox directory. A step runs in
//! a background task and streams its progress to SSE subscribers.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
pub use sse::SseEvent;

use crate::config::{SessionError, Settings};
use crate::orchestrator::{AgentError, AgentEvent, AgentObserver, Orchestrator};
use crate::prompts::UnknownPromptVersion;
use crate::tools::CHARTS_DIR;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

const BROADCAST_CAPACITY: usize = 256;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            sessions: Arc::new(SessionManager::new(settings)),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionActionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("A step is already running in this session")]
    Busy,
    #[error(transparent)]
    UnknownPrompt(#[from] UnknownPromptVersion),
}

/// Forwards loop events to a session's subscribers
struct BroadcastObserver {
    tx: broadcast::Sender<SseEvent>,
}

impl AgentObserver for BroadcastObserver {
    fn on_event(&self, event: &AgentEvent) {
        // No subscribers is fine
        let _ = self.tx.send(SseEvent::Agent(event.clone()));
    }
}

/// One chat-UI session
pub struct SessionHandle {
    pub id: String,
    agent: tokio::sync::Mutex<Orchestrator>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    /// Cancellation for the step in flight, if any
    running: Mutex<Option<CancellationToken>>,
    /// Mirrors the agent's prompt so readers never wait on a running step
    prompt_version: Mutex<&'static str>,
    dir: PathBuf,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SseEvent> {
        self.broadcast_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Claim the session for a new step
    fn begin_step(&self) -> Result<CancellationToken, SessionActionError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Err(SessionActionError::Busy);
        }
        let token = CancellationToken::new();
        *running = Some(token.clone());
        Ok(token)
    }

    fn end_step(&self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn prompt_version(&self) -> &'static str {
        *self.prompt_version.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// First event of a stream; available while a step is running
    pub fn init_event(&self) -> SseEvent {
        SseEvent::Init {
            session_id: self.id.clone(),
            prompt_version: self.prompt_version().to_string(),
            agent_working: self.is_running(),
        }
    }

    /// Directory charts for this session are collected into
    pub fn charts_dir(&self) -> PathBuf {
        self.dir.join(CHARTS_DIR)
    }
}

/// Manager for all chat-UI sessions
pub struct SessionManager {
    settings: Settings,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionManager {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn create(
        &self,
        prompt_version: Option<&str>,
        data_file: Option<&str>,
    ) -> Result<Arc<SessionHandle>, SessionError> {
        let id = uuid::Uuid::new_v4().to_string();
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let agent = self
            .settings
            .open_session(&id, prompt_version, data_file)?
            .with_observer(Arc::new(BroadcastObserver {
                tx: broadcast_tx.clone(),
            }));

        let handle = Arc::new(SessionHandle {
            id: id.clone(),
            prompt_version: Mutex::new(agent.prompt_version()),
            agent: tokio::sync::Mutex::new(agent),
            broadcast_tx,
            running: Mutex::new(None),
            dir: self.settings.session_dir(&id),
        });
        self.sessions.write().await.insert(id, handle.clone());
        Ok(handle)
    }

    pub async fn get(&self, id: &str) -> Result<Arc<SessionHandle>, SessionActionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionActionError::NotFound(id.to_string()))
    }

    /// Queue `text` as the next question; the step runs in the background.
    pub async fn chat(&self, id: &str, text: String) -> Result<(), SessionActionError> {
        let session = self.get(id).await?;
        let cancel = session.begin_step()?;

        tokio::spawn(async move {
            let result = {
                let mut agent = session.agent.lock().await;
                agent.step(Some(text), &cancel).await
            };
            session.end_step();

            let event = match result {
                Ok(_) => SseEvent::Done,
                Err(AgentError::Cancelled) => SseEvent::Cancelled,
                Err(e) => {
                    tracing::error!(session_id = %session.id, error = %e, "Step failed");
                    SseEvent::Error {
                        message: e.to_string(),
                    }
                }
            };
            let _ = session.broadcast_tx.send(event);
        });
        Ok(())
    }

    /// Switch the session's prompt, which also clears its conversation
    pub async fn set_prompt(&self, id: &str, version: &str) -> Result<&'static str, SessionActionError> {
        let session = self.get(id).await?;
        let _claim = session.begin_step()?;
        let result = {
            let mut agent = session.agent.lock().await;
            agent.set_prompt(version).map(|()| agent.prompt_version())
        };
        if let Ok(active) = &result {
            *session.prompt_version.lock().unwrap_or_else(PoisonError::into_inner) = *active;
        }
        session.end_step();
        Ok(result?)
    }

    /// Drop a session and its sandbox directory; refused while a step runs
    pub async fn delete(&self, id: &str) -> Result<(), SessionActionError> {
        let session = self.get(id).await?;
        let _claim = session.begin_step()?;
        self.sessions.write().await.remove(id);
        self.settings.close_session(id, false).await;
        tracing::info!(session_id = %id, "Session deleted");
        Ok(())
    }

    /// Cancel the running step; false when nothing was running
    pub async fn cancel(&self, id: &str) -> Result<bool, SessionActionError> {
        let session = self.get(id).await?;
        let token = session
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(match token {
            Some(token) => {
                tracing::info!(session_id = %id, "Cancelling step");
                token.cancel();
                true
            }
            None => false,
        })
    }

    /// Path of a collected chart, if `name` is a plain file name in the session's chart directory
    pub async fn chart_path(&self, id: &str, name: &str) -> Result<Option<PathBuf>, SessionActionError> {
        let session = self.get(id).await?;
        let is_plain = Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
        if !is_plain {
            return Ok(None);
        }
        let path = session.charts_dir().join(name);
        Ok(path.is_file().then_some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalOptions;
    use crate::llm::ContentBlock;
    use crate::orchestrator::testing::MockLlmService;
    use std::time::Duration;
    use tempfile::TempDir;

    fn manager(dir: &TempDir, llm: Arc<MockLlmService>) -> SessionManager {
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(data_dir.join("campaigns.csv"), "campaign,spend\na,1\n").unwrap();
        let options = GlobalOptions {
            data_dir,
            data: "campaigns.csv".to_string(),
            prompt: None,
            workspace: Some(dir.path().join("ws")),
            python: PathBuf::from("python3"),
        };
        SessionManager::new(Settings::new(&options, llm, 4096))
    }

    async fn next_terminal(rx: &mut broadcast::Receiver<SseEvent>) -> SseEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("event within timeout")
                .expect("channel open");
            if !matches!(event, SseEvent::Agent(_)) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_chat_streams_answer_then_done() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(MockLlmService::new());
        llm.queue_response(MockLlmService::end_turn(vec![ContentBlock::text("42")]));
        let manager = manager(&dir, llm);

        let session = manager.create(Some("v2_structured"), None).await.unwrap();
        let mut rx = session.subscribe();
        manager.chat(&session.id, "q".to_string()).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert!(matches!(first, SseEvent::Agent(AgentEvent::Answer { ref text }) if text == "42"));
        assert!(matches!(next_terminal(&mut rx).await, SseEvent::Done));
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_second_chat_while_running_is_busy_and_cancel_works() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(MockLlmService::new().with_delay(Duration::from_secs(30)));
        llm.queue_response(MockLlmService::end_turn(vec![ContentBlock::text("late")]));
        let manager = manager(&dir, llm);

        let session = manager.create(None, None).await.unwrap();
        let mut rx = session.subscribe();
        manager.chat(&session.id, "first".to_string()).await.unwrap();

        let err = manager.chat(&session.id, "second".to_string()).await.unwrap_err();
        assert!(matches!(err, SessionActionError::Busy));
        assert!(matches!(
            manager.set_prompt(&session.id, "v1_basic").await,
            Err(SessionActionError::Busy)
        ));

        assert!(manager.cancel(&session.id).await.unwrap());
        assert!(matches!(next_terminal(&mut rx).await, SseEvent::Cancelled));
        assert!(!manager.cancel(&session.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_prompt_and_unknown_session() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, Arc::new(MockLlmService::new()));
        let session = manager.create(None, None).await.unwrap();

        assert_eq!(session.prompt_version(), "v4_professional");
        assert_eq!(manager.set_prompt(&session.id, "v1_basic").await.unwrap(), "v1_basic");
        assert_eq!(session.prompt_version(), "v1_basic");
        assert!(matches!(
            manager.set_prompt(&session.id, "v9").await,
            Err(SessionActionError::UnknownPrompt(_))
        ));
        assert!(matches!(
            manager.chat("nope", "q".to_string()).await,
            Err(SessionActionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_chart_path_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, Arc::new(MockLlmService::new()));
        let session = manager.create(None, None).await.unwrap();
        std::fs::create_dir_all(session.charts_dir()).unwrap();
        std::fs::write(session.charts_dir().join("t1.png"), b"png").unwrap();

        assert!(manager.chart_path(&session.id, "t1.png").await.unwrap().is_some());
        assert!(manager.chart_path(&session.id, "missing.png").await.unwrap().is_none());
        assert!(manager.chart_path(&session.id, "../../data/campaigns.csv").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_init_event_during_running_step() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(MockLlmService::new().with_delay(Duration::from_secs(30)));
        llm.queue_response(MockLlmService::end_turn(vec![ContentBlock::text("late")]));
        let manager = manager(&dir, llm);

        let session = manager.create(Some("v2_structured"), None).await.unwrap();
        manager.chat(&session.id, "q".to_string()).await.unwrap();
        tokio::task::yield_now().await;

        let init = session.init_event();
        assert!(matches!(
            init,
            SseEvent::Init { ref prompt_version, agent_working: true, .. } if prompt_version == "v2_structured"
        ));
        assert!(manager.cancel(&session.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_session_and_directory() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(MockLlmService::new().with_delay(Duration::from_secs(30)));
        llm.queue_response(MockLlmService::end_turn(vec![ContentBlock::text("late")]));
        let manager = manager(&dir, llm);
        let session = manager.create(None, None).await.unwrap();
        let session_dir = dir.path().join("ws/sessions").join(&session.id);
        assert!(session_dir.is_dir());

        let mut rx = session.subscribe();
        manager.chat(&session.id, "q".to_string()).await.unwrap();
        assert!(matches!(manager.delete(&session.id).await, Err(SessionActionError::Busy)));
        manager.cancel(&session.id).await.unwrap();
        assert!(matches!(next_terminal(&mut rx).await, SseEvent::Cancelled));

        manager.delete(&session.id).await.unwrap();
        assert!(!session_dir.exists());
        assert!(matches!(
            manager.get(&session.id).await,
            Err(SessionActionError::NotFound(_))
        ));
    }
}
