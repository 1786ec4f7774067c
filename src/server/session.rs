//! Editor session: inbound JSON-RPC dispatch
//!
//! Document notifications are queued per URI and handled in arrival order by
//! one task per document, so different documents proceed independently while
//! open, save and close for the same document never overlap.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use super::publisher::{Outgoing, queue};
use crate::error::FramingError;
use crate::infra::lsp::FrameReader;
use crate::infra::lsp::protocol::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveCellParams, DidSaveTextDocumentParams, Message, Notification, Request, Response,
    error_codes, methods,
};
use crate::services::Orchestrator;

/// How long queued document work may run after the editor goes away
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug)]
enum DocumentEvent {
    Open(String),
    Change(String),
    Save(String),
    SaveCell { text: String, line_offset: u32 },
    Close,
}

struct DocumentQueue {
    events: mpsc::UnboundedSender<DocumentEvent>,
    /// Resolves once the document task has exited
    done: oneshot::Receiver<()>,
}

pub struct Session {
    orchestrator: Arc<Orchestrator>,
    outgoing: Outgoing,
    /// Last full text per open document, for saves that omit it
    documents: HashMap<String, String>,
    queues: HashMap<String, DocumentQueue>,
    /// Tasks of closed documents that may still be finishing
    closing: HashMap<String, oneshot::Receiver<()>>,
    tasks: JoinSet<()>,
    shutdown_requested: bool,
}

impl Session {
    pub fn new(orchestrator: Arc<Orchestrator>, outgoing: Outgoing) -> Self {
        Self {
            orchestrator,
            outgoing,
            documents: HashMap::new(),
            queues: HashMap::new(),
            closing: HashMap::new(),
            tasks: JoinSet::new(),
            shutdown_requested: false,
        }
    }

    /// Serve until `exit` or end of input, then stop the worker pool
    pub async fn run<R: AsyncRead + Unpin>(mut self, reader: R) -> Result<(), FramingError> {
        let mut reader = FrameReader::new(reader);

        let result = loop {
            self.reap();

            let value = match reader.read_message().await {
                Ok(value) => value,
                Err(e) if !e.is_fatal() => {
                    tracing::warn!("Skipping unreadable message from editor: {}", e);
                    continue;
                }
                Err(FramingError::Closed(_)) => {
                    tracing::info!("Editor closed the connection");
                    break Ok(());
                }
                Err(e) => break Err(e),
            };

            let message = match Message::from_value(value) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("Skipping invalid message from editor: {}", e);
                    continue;
                }
            };

            let keep_running = match message {
                Message::Request(request) => {
                    self.handle_request(request);
                    true
                }
                Message::Notification(notification) => self.handle_notification(notification),
                Message::Response(_) => true,
            };
            if !keep_running {
                break Ok(());
            }
        };

        self.drain().await;
        self.orchestrator.shutdown().await;
        result
    }

    /// Let queued document events finish, within [`DRAIN_GRACE`]
    async fn drain(&mut self) {
        // Dropping the senders ends each document task after its backlog
        self.queues.clear();
        self.closing.clear();

        let tasks = &mut self.tasks;
        let finished = tokio::time::timeout(DRAIN_GRACE, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if finished.is_err() {
            tracing::warn!("Abandoning {} unfinished document tasks", tasks.len());
        }
        tasks.shutdown().await;
    }

    fn reap(&mut self) {
        while self.tasks.try_join_next().is_some() {}
        self.closing.retain(|_, done| {
            matches!(done.try_recv(), Err(oneshot::error::TryRecvError::Empty))
        });
    }

    fn handle_request(&mut self, request: Request) {
        tracing::debug!("Editor request: {}", request.method);
        let response = if self.shutdown_requested {
            Response::error(
                request.id,
                error_codes::INVALID_REQUEST,
                "Server is shutting down",
            )
        } else {
            match request.method.as_str() {
                methods::INITIALIZE => Response::success(request.id, initialize_result()),
                methods::SHUTDOWN => {
                    self.shutdown_requested = true;
                    Response::success(request.id, Value::Null)
                }
                other => Response::error(
                    request.id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {}", other),
                ),
            }
        };
        queue(&self.outgoing, &response);
    }

    /// Returns false on `exit`
    fn handle_notification(&mut self, notification: Notification) -> bool {
        match notification.method.as_str() {
            methods::DID_OPEN => {
                let Some(params) = params::<DidOpenTextDocumentParams>(notification) else {
                    return true;
                };
                let document = params.text_document;
                self.documents
                    .insert(document.uri.clone(), document.text.clone());
                self.dispatch(document.uri, DocumentEvent::Open(document.text));
            }
            methods::DID_CHANGE => {
                let Some(params) = params::<DidChangeTextDocumentParams>(notification) else {
                    return true;
                };
                // Full sync: the last change carries the whole document
                let Some(change) = params.content_changes.into_iter().last() else {
                    return true;
                };
                let uri = params.text_document.uri;
                self.documents.insert(uri.clone(), change.text.clone());
                self.dispatch(uri, DocumentEvent::Change(change.text));
            }
            methods::DID_SAVE => {
                let Some(params) = params::<DidSaveTextDocumentParams>(notification) else {
                    return true;
                };
                let uri = params.text_document.uri;
                let text = match params.text {
                    Some(text) => {
                        self.documents.insert(uri.clone(), text.clone());
                        text
                    }
                    None => match self.documents.get(&uri) {
                        Some(text) => text.clone(),
                        None => {
                            tracing::warn!("Save for unknown document {} without text", uri);
                            return true;
                        }
                    },
                };
                self.dispatch(uri, DocumentEvent::Save(text));
            }
            methods::DID_SAVE_CELL => {
                let Some(params) = params::<DidSaveCellParams>(notification) else {
                    return true;
                };
                self.dispatch(
                    params.text_document.uri,
                    DocumentEvent::SaveCell {
                        text: params.text,
                        line_offset: params.line_offset,
                    },
                );
            }
            methods::DID_CLOSE => {
                let Some(params) = params::<DidCloseTextDocumentParams>(notification) else {
                    return true;
                };
                let uri = params.text_document.uri;
                self.documents.remove(&uri);
                self.dispatch(uri, DocumentEvent::Close);
            }
            methods::EXIT => {
                tracing::info!("Exit requested");
                return false;
            }
            other => tracing::trace!("Ignoring notification {}", other),
        }
        true
    }

    /// Queue `event` behind everything already pending for `uri`
    fn dispatch(&mut self, uri: String, event: DocumentEvent) {
        let is_close = matches!(event, DocumentEvent::Close);

        let queue = match self.queues.entry(uri.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                // A reopened document waits for its previous task to finish closing
                let previous = self.closing.remove(entry.key());
                let queue = spawn_document(
                    &mut self.tasks,
                    Arc::clone(&self.orchestrator),
                    entry.key().clone(),
                    previous,
                );
                entry.insert(queue)
            }
        };
        if queue.events.send(event).is_err() {
            tracing::warn!("Document task for {} is gone", uri);
        }

        if is_close && let Some(queue) = self.queues.remove(&uri) {
            self.closing.insert(uri, queue.done);
        }
    }
}

fn spawn_document(
    tasks: &mut JoinSet<()>,
    orchestrator: Arc<Orchestrator>,
    uri: String,
    previous: Option<oneshot::Receiver<()>>,
) -> DocumentQueue {
    let (events, inbox) = mpsc::unbounded_channel();
    let (finished, done) = oneshot::channel();
    tasks.spawn(run_document(orchestrator, uri, inbox, previous, finished));
    DocumentQueue { events, done }
}

async fn run_document(
    orchestrator: Arc<Orchestrator>,
    uri: String,
    mut inbox: mpsc::UnboundedReceiver<DocumentEvent>,
    previous: Option<oneshot::Receiver<()>>,
    _finished: oneshot::Sender<()>,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    while let Some(event) = inbox.recv().await {
        match event {
            DocumentEvent::Open(text) => orchestrator.on_open(&uri, &text).await,
            DocumentEvent::Change(text) => orchestrator.on_change(&uri, &text),
            DocumentEvent::Save(text) => orchestrator.on_save(&uri, &text).await,
            DocumentEvent::SaveCell { text, line_offset } => {
                orchestrator.on_save_cell(&uri, &text, line_offset).await
            }
            DocumentEvent::Close => {
                orchestrator.on_close(&uri).await;
                break;
            }
        }
    }
}

fn params<T: DeserializeOwned>(notification: Notification) -> Option<T> {
    let method = notification.method;
    match serde_json::from_value(notification.params.unwrap_or(Value::Null)) {
        Ok(params) => Some(params),
        Err(e) => {
            tracing::warn!("Invalid params for {}: {}", method, e);
            None
        }
    }
}

fn initialize_result() -> Value {
    json!({
        "capabilities": {
            "textDocumentSync": {
                "openClose": true,
                "change": 1,
                "save": {"includeText": true}
            }
        },
        "serverInfo": {
            "name": "sculptor",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}
