//! Worker Process
//!
//! One long-lived analysis engine speaking framed JSON-RPC over its stdio.
//! Inbound traffic is read by a background task; only `publishDiagnostics`
//! notifications reach the worker's inbox, everything else is dropped.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::protocol::{
    DidOpenTextDocumentParams, InitializeParams, Message, Notification, Request,
    TextDocumentItem, WorkerDiagnostics, methods,
};
use super::transport::{FrameReader, FrameWriter};
use crate::error::LspError;
use crate::models::config::WorkerConfig;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Raw stdio of a freshly launched engine
pub struct WorkerIo {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    pub child: Option<Child>,
}

/// Produces engine processes for the pool
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, slot: usize) -> Result<WorkerIo, LspError>;
}

/// Spawns the configured engine binary with piped stdin/stdout
pub struct CommandLauncher {
    command: String,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }
}

#[async_trait]
impl WorkerLauncher for CommandLauncher {
    async fn launch(&self, slot: usize) -> Result<WorkerIo, LspError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LspError::WorkerStart(format!("{}: {}", self.command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::WorkerStart("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::WorkerStart("Failed to get stdout".to_string()))?;

        tracing::info!(
            "Created worker {} ({} pid {:?})",
            slot,
            self.command,
            child.id()
        );

        Ok(WorkerIo {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            child: Some(child),
        })
    }
}

/// Per-worker protocol settings
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub language_id: String,
    pub source_name: String,
    pub response_timeout: Duration,
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            language_id: config.language_id.clone(),
            source_name: config.source_name.clone(),
            response_timeout: config.response_timeout(),
        }
    }
}

type Inbox = mpsc::UnboundedReceiver<WorkerDiagnostics>;

pub struct Worker {
    slot: usize,
    generation: u64,
    settings: Arc<WorkerSettings>,
    writer: Mutex<FrameWriter<BoxedWriter>>,
    inbox: Mutex<Inbox>,
    child: Mutex<Option<Child>>,
    reader_task: JoinHandle<()>,
    next_id: AtomicU64,
}

impl Worker {
    /// Wire up a launched engine and send the initialize handshake
    ///
    /// The `initialize` response is not awaited; the reader task discards it.
    pub async fn start(
        slot: usize,
        generation: u64,
        io: WorkerIo,
        settings: Arc<WorkerSettings>,
    ) -> Result<Self, LspError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(read_loop(slot, FrameReader::new(io.reader), tx));

        let worker = Self {
            slot,
            generation,
            settings,
            writer: Mutex::new(FrameWriter::new(io.writer)),
            inbox: Mutex::new(rx),
            child: Mutex::new(io.child),
            reader_task,
            next_id: AtomicU64::new(0),
        };

        let params = serde_json::to_value(InitializeParams::bare())?;
        worker.request(methods::INITIALIZE, Some(params)).await?;
        worker
            .notify(methods::INITIALIZED, Some(serde_json::json!({})))
            .await?;

        Ok(worker)
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.as_ref().and_then(Child::id)
    }

    /// Whether the engine process is still running
    ///
    /// Workers without a child process are alive while their reader runs.
    pub async fn is_alive(&self) -> bool {
        let mut child = self.child.lock().await;
        match child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => !self.reader_task.is_finished(),
        }
    }

    /// Take exclusive use of this worker for one round-trip
    ///
    /// Notifications left over from an abandoned round-trip are discarded.
    pub async fn exchange(&self) -> Exchange<'_> {
        let mut inbox = self.inbox.lock().await;
        let mut stale = 0usize;
        while inbox.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            tracing::debug!("Worker {} dropped {} stale notifications", self.slot, stale);
        }
        Exchange {
            worker: self,
            inbox,
        }
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<(), LspError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.send(&Request::new(id, method, params)).await
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), LspError> {
        self.send(&Notification::new(method, params)).await
    }

    async fn send<T: Serialize>(&self, message: &T) -> Result<(), LspError> {
        let mut writer = self.writer.lock().await;
        writer.write_message(message).await.map_err(|e| {
            if e.is_fatal() {
                tracing::error!("Failed to send message to worker {}: {}", self.slot, e);
            }
            LspError::from(e)
        })
    }

    /// Best-effort LSP `shutdown`/`exit`, then kill whatever is left
    pub async fn shutdown(&self) {
        let _ = timeout(SHUTDOWN_GRACE, async {
            self.request(methods::SHUTDOWN, None).await?;
            self.notify(methods::EXIT, None).await
        })
        .await;
        self.terminate().await;
    }

    /// Kill the engine without ceremony
    pub async fn terminate(&self) {
        self.reader_task.abort();
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!("Worker {} kill failed: {}", self.slot, e);
            }
            let _ = timeout(SHUTDOWN_GRACE, child.wait()).await;
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Exclusive round-trip handle on one worker
pub struct Exchange<'a> {
    worker: &'a Worker,
    inbox: MutexGuard<'a, Inbox>,
}

impl Exchange<'_> {
    pub async fn open(&mut self, uri: &str, text: &str) -> Result<(), LspError> {
        tracing::debug!("Sending didOpen to worker {}", self.worker.slot);
        self.send_document(methods::DID_OPEN, uri, text).await
    }

    pub async fn save(&mut self, uri: &str, text: &str) -> Result<(), LspError> {
        tracing::debug!("Sending didSave to worker {}", self.worker.slot);
        self.send_document(methods::DID_SAVE, uri, text).await
    }

    async fn send_document(&mut self, method: &str, uri: &str, text: &str) -> Result<(), LspError> {
        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.to_string(),
                language_id: self.worker.settings.language_id.clone(),
                version: 1,
                text: text.to_string(),
            },
        };
        self.worker
            .notify(method, Some(serde_json::to_value(params)?))
            .await
    }

    /// Wait for the next `publishDiagnostics` from this worker
    pub async fn read_diagnostics(&mut self) -> Result<WorkerDiagnostics, LspError> {
        let slot = self.worker.slot;
        let limit = self.worker.settings.response_timeout;
        match timeout(limit, self.inbox.recv()).await {
            Ok(Some(published)) => Ok(published),
            Ok(None) => Err(LspError::WorkerTerminated { slot }),
            Err(_) => Err(LspError::Timeout {
                slot,
                timeout_ms: limit.as_millis() as u64,
            }),
        }
    }

    pub fn source_name(&self) -> &str {
        &self.worker.settings.source_name
    }
}

/// Forward `publishDiagnostics` into the inbox until the stream dies
async fn read_loop(
    slot: usize,
    mut reader: FrameReader<BoxedReader>,
    inbox: mpsc::UnboundedSender<WorkerDiagnostics>,
) {
    loop {
        let value = match reader.read_message().await {
            Ok(value) => value,
            Err(e) if !e.is_fatal() => {
                tracing::warn!("Worker {} sent an unreadable frame: {}", slot, e);
                continue;
            }
            Err(e) => {
                tracing::warn!("Worker {} stream ended: {}", slot, e);
                break;
            }
        };

        match Message::from_value(value) {
            Ok(Message::Notification(n)) if n.method == methods::PUBLISH_DIAGNOSTICS => {
                let params = n.params.unwrap_or(Value::Null);
                match serde_json::from_value::<WorkerDiagnostics>(params) {
                    Ok(published) => {
                        if inbox.send(published).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Worker {} published unreadable diagnostics: {}", slot, e)
                    }
                }
            }
            Ok(Message::Notification(n)) => {
                tracing::trace!("Worker {} ignoring notification {}", slot, n.method);
            }
            Ok(Message::Response(_)) | Ok(Message::Request(_)) => {
                tracing::trace!("Worker {} ignoring non-notification message", slot);
            }
            Err(e) => tracing::warn!("Worker {} sent an unexpected message: {}", slot, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::lsp::testing::{MemoryLauncher, test_settings};
    use tokio::io::DuplexStream;

    fn piped() -> (WorkerIo, DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(ours);
        let io = WorkerIo {
            reader: Box::new(reader),
            writer: Box::new(writer),
            child: None,
        };
        (io, theirs)
    }

    #[tokio::test]
    async fn test_start_sends_handshake_without_waiting() {
        let (io, theirs) = piped();
        let worker = Worker::start(0, 0, io, test_settings()).await.unwrap();
        assert!(worker.is_alive().await);

        let mut engine = FrameReader::new(theirs);
        let initialize = engine.read_message().await.unwrap();
        assert_eq!(initialize["method"], "initialize");
        assert_eq!(initialize["params"]["rootUri"], Value::Null);
        let initialized = engine.read_message().await.unwrap();
        assert_eq!(initialized["method"], "initialized");
        assert!(initialized.get("id").is_none());
    }

    #[tokio::test]
    async fn test_exchange_skips_other_traffic() {
        let launcher = MemoryLauncher::new();
        let io = launcher.launch(0).await.unwrap();
        let worker = Worker::start(0, 0, io, test_settings()).await.unwrap();

        let mut exchange = worker.exchange().await;
        exchange.open("file:///a.py", "a typo").await.unwrap();
        let published = exchange.read_diagnostics().await.unwrap();
        assert_eq!(published.uri, "file:///a.py");
        assert_eq!(published.diagnostics.len(), 1);
        assert_eq!(published.diagnostics[0].message, "open: a typo");
    }

    #[tokio::test]
    async fn test_exchange_drains_stale_notifications() {
        let launcher = MemoryLauncher::new();
        let io = launcher.launch(0).await.unwrap();
        let worker = Worker::start(0, 0, io, test_settings()).await.unwrap();

        {
            // Abandon a round-trip after sending
            let mut exchange = worker.exchange().await;
            exchange.open("file:///old.py", "old typo").await.unwrap();
        }
        // Let the abandoned publication land in the inbox
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut exchange = worker.exchange().await;
        exchange.open("file:///new.py", "x = 1").await.unwrap();
        let published = exchange.read_diagnostics().await.unwrap();
        assert_eq!(published.uri, "file:///new.py");
        assert!(published.diagnostics.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_engine_times_out() {
        let (io, _theirs) = piped();
        let settings = Arc::new(WorkerSettings {
            response_timeout: Duration::from_millis(100),
            ..(*test_settings()).clone()
        });
        let worker = Worker::start(3, 0, io, settings).await.unwrap();

        let mut exchange = worker.exchange().await;
        exchange.open("file:///a.py", "x").await.unwrap();
        let err = exchange.read_diagnostics().await.unwrap_err();
        assert!(matches!(err, LspError::Timeout { slot: 3, timeout_ms: 100 }));
        assert!(err.needs_restart());
    }

    #[tokio::test]
    async fn test_closed_stream_terminates_worker() {
        let (io, theirs) = piped();
        let worker = Worker::start(1, 0, io, test_settings()).await.unwrap();
        drop(theirs);

        let mut exchange = worker.exchange().await;
        let err = exchange.read_diagnostics().await.unwrap_err();
        assert!(matches!(err, LspError::WorkerTerminated { slot: 1 }));
    }
}
