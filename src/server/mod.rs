//! Editor-facing LSP server
//!
//! Speaks framed JSON-RPC to the editor. Inbound traffic is dispatched by a
//! [`Session`]; everything outbound goes through one writer task so
//! responses and diagnostics never interleave mid-frame.

pub mod publisher;
pub mod session;

pub use publisher::{ChannelPublisher, write_outgoing};
pub use session::Session;

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::error::SculptorResult;
use crate::infra::analyzer::DeepAnalyzer;
use crate::infra::lsp::{WorkerLauncher, WorkerPool, WorkerSettings};
use crate::models::SculptorConfig;
use crate::services::Orchestrator;

/// Start the worker pool and serve one editor connection to completion
pub async fn serve<R, W>(
    config: &SculptorConfig,
    launcher: Arc<dyn WorkerLauncher>,
    deep: Arc<dyn DeepAnalyzer>,
    reader: R,
    writer: W,
) -> SculptorResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let settings = Arc::new(WorkerSettings::from(&config.worker));
    let pool = WorkerPool::start(
        launcher,
        settings,
        config.worker.pool_size,
        config.realtime.max_concurrent,
    )
    .await?;
    tracing::debug!("Worker pool health: {:?}", pool.health().await);

    let (outgoing, queued) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_outgoing(queued, writer));

    let publisher = Arc::new(ChannelPublisher::new(outgoing.clone()));
    let orchestrator = Orchestrator::new(pool, deep, publisher, config.realtime.debounce());

    let result = Session::new(orchestrator, outgoing).run(reader).await;

    // Every sender is gone once the session and orchestrator are dropped
    let _ = writer_task.await;
    result.map_err(|e| crate::error::LspError::from(e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tokio::io::{DuplexStream, duplex};
    use tokio::task::JoinHandle;

    use crate::error::AnalyzerError;
    use crate::infra::lsp::protocol::error_codes;
    use crate::infra::lsp::testing::MemoryLauncher;
    use crate::infra::lsp::{FrameReader, FrameWriter};
    use crate::models::{Diagnostic, DiagnosticSeverity, Position, Range};

    #[derive(Default)]
    struct RecordingDeep {
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DeepAnalyzer for RecordingDeep {
        async fn analyze(&self, _uri: &str, text: &str) -> Result<Vec<Diagnostic>, AnalyzerError> {
            self.texts.lock().unwrap().push(text.to_string());
            Ok(vec![Diagnostic::new(
                Range::point(Position::new(0, 0)),
                DiagnosticSeverity::Information,
                "pylint",
                "missing module docstring",
            )])
        }
    }

    struct Editor {
        writer: FrameWriter<DuplexStream>,
        reader: FrameReader<DuplexStream>,
        server: JoinHandle<SculptorResult<()>>,
        deep: Arc<RecordingDeep>,
    }

    impl Editor {
        async fn start() -> Self {
            let mut config = SculptorConfig::default();
            config.worker.pool_size = 1;
            config.realtime.debounce_ms = 50;

            let (editor_in, server_in) = duplex(64 * 1024);
            let (server_out, editor_out) = duplex(64 * 1024);
            let deep = Arc::new(RecordingDeep::default());
            let analyzer: Arc<dyn DeepAnalyzer> = deep.clone();

            let server = tokio::spawn(async move {
                serve(
                    &config,
                    Arc::new(MemoryLauncher::new()),
                    analyzer,
                    server_in,
                    server_out,
                )
                .await
            });

            Self {
                writer: FrameWriter::new(editor_in),
                reader: FrameReader::new(editor_out),
                server,
                deep,
            }
        }

        async fn request(&mut self, id: u64, method: &str, params: Value) {
            self.writer
                .write_message(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
                .await
                .unwrap();
        }

        async fn notify(&mut self, method: &str, params: Value) {
            self.writer
                .write_message(&json!({"jsonrpc": "2.0", "method": method, "params": params}))
                .await
                .unwrap();
        }

        /// Next message satisfying `pred`, skipping anything else
        async fn next(&mut self, pred: impl Fn(&Value) -> bool) -> Value {
            let wait = async {
                loop {
                    let message = self.reader.read_message().await.unwrap();
                    if pred(&message) {
                        return message;
                    }
                }
            };
            tokio::time::timeout(Duration::from_secs(5), wait)
                .await
                .unwrap()
        }

        async fn next_diagnostics(&mut self) -> Value {
            self.next(|m| m["method"] == "textDocument/publishDiagnostics")
                .await
        }

        async fn exit(mut self) {
            self.request(99, "shutdown", Value::Null).await;
            let response = self.next(|m| m["id"] == 99).await;
            assert_eq!(response["result"], Value::Null);
            assert!(response.get("error").is_none());

            self.notify("exit", Value::Null).await;
            self.server.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_initialize_and_unknown_request() {
        let mut editor = Editor::start().await;

        editor
            .request(1, "initialize", json!({"processId": null, "capabilities": {}}))
            .await;
        let response = editor.next(|m| m["id"] == 1).await;
        let sync = &response["result"]["capabilities"]["textDocumentSync"];
        assert_eq!(sync["change"], 1);
        assert_eq!(sync["save"]["includeText"], true);
        assert_eq!(response["result"]["serverInfo"]["name"], "sculptor");

        editor.notify("initialized", json!({})).await;
        editor.request(2, "textDocument/hover", json!({})).await;
        let response = editor.next(|m| m["id"] == 2).await;
        assert_eq!(response["error"]["code"], error_codes::METHOD_NOT_FOUND);

        editor.exit().await;
    }

    #[tokio::test]
    async fn test_document_lifecycle_publishes_diagnostics() {
        let mut editor = Editor::start().await;
        let uri = "file:///work/a.py";

        editor
            .notify(
                "textDocument/didOpen",
                json!({"textDocument": {"uri": uri, "languageId": "python", "version": 1, "text": "x = typo"}}),
            )
            .await;
        let published = editor.next_diagnostics().await;
        assert_eq!(published["params"]["uri"], uri);
        assert_eq!(published["params"]["diagnostics"][0]["message"], "open: x = typo");
        assert_eq!(published["params"]["diagnostics"][0]["severity"], 1);

        editor
            .notify(
                "textDocument/didChange",
                json!({"textDocument": {"uri": uri, "version": 2}, "contentChanges": [{"text": "x = 1"}]}),
            )
            .await;
        let published = editor.next_diagnostics().await;
        assert_eq!(published["params"]["diagnostics"], json!([]));

        // Save without text falls back to the last synced content
        editor
            .notify("textDocument/didSave", json!({"textDocument": {"uri": uri}}))
            .await;
        let published = editor.next_diagnostics().await;
        assert_eq!(published["params"]["diagnostics"][0]["source"], "pylint");
        assert_eq!(*editor.deep.texts.lock().unwrap(), vec!["x = 1".to_string()]);

        editor
            .notify("textDocument/didClose", json!({"textDocument": {"uri": uri}}))
            .await;
        editor.exit().await;
    }

    #[tokio::test]
    async fn test_eof_ends_session() {
        let editor = Editor::start().await;
        let Editor { writer, server, .. } = editor;
        drop(writer);
        server.await.unwrap().unwrap();
    }
}
