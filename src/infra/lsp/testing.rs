//! In-memory analysis engines for exercising workers without child processes

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::DuplexStream;

use super::transport::{FrameReader, FrameWriter};
use super::worker::{WorkerIo, WorkerLauncher, WorkerSettings};
use crate::error::LspError;

/// Lines containing this marker are reported by the fake engine
pub const TYPO_MARKER: &str = "typo";

#[derive(Debug, Clone)]
pub struct EngineCall {
    pub slot: usize,
    pub method: String,
    pub text: String,
}

pub fn test_settings() -> Arc<WorkerSettings> {
    Arc::new(WorkerSettings {
        language_id: "python".to_string(),
        source_name: "pylsp".to_string(),
        response_timeout: Duration::from_secs(5),
    })
}

/// Launches fake engines over duplex pipes
///
/// The first `broken` launches produce engines that hang up as soon as a
/// document arrives.
pub struct MemoryLauncher {
    launches: AtomicUsize,
    broken: usize,
    calls: Arc<Mutex<Vec<EngineCall>>>,
}

impl MemoryLauncher {
    pub fn new() -> Self {
        Self::with_broken(0)
    }

    pub fn with_broken(broken: usize) -> Self {
        Self {
            launches: AtomicUsize::new(0),
            broken,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Texts the engines were asked to open, in arrival order
    pub fn opened_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == "textDocument/didOpen")
            .map(|c| c.text)
            .collect()
    }
}

#[async_trait]
impl WorkerLauncher for MemoryLauncher {
    async fn launch(&self, slot: usize) -> Result<WorkerIo, LspError> {
        let launch = self.launches.fetch_add(1, Ordering::SeqCst);
        let broken = launch < self.broken;

        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        tokio::spawn(run_engine(slot, broken, theirs, Arc::clone(&self.calls)));

        let (reader, writer) = tokio::io::split(ours);
        Ok(WorkerIo {
            reader: Box::new(reader),
            writer: Box::new(writer),
            child: None,
        })
    }
}

async fn run_engine(
    slot: usize,
    broken: bool,
    stream: DuplexStream,
    calls: Arc<Mutex<Vec<EngineCall>>>,
) {
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);

    while let Ok(message) = reader.read_message().await {
        let method = message["method"].as_str().unwrap_or_default().to_string();
        let reply = match method.as_str() {
            "initialize" => vec![json!({
                "jsonrpc": "2.0",
                "id": message["id"],
                "result": {"capabilities": {}}
            })],
            "shutdown" => vec![json!({"jsonrpc": "2.0", "id": message["id"], "result": null})],
            "exit" => return,
            "textDocument/didOpen" | "textDocument/didSave" => {
                if broken {
                    return;
                }
                let document = &message["params"]["textDocument"];
                let uri = document["uri"].as_str().unwrap_or_default();
                let text = document["text"].as_str().unwrap_or_default();
                if let Ok(mut calls) = calls.lock() {
                    calls.push(EngineCall {
                        slot,
                        method: method.clone(),
                        text: text.to_string(),
                    });
                }
                let kind = if method.ends_with("didOpen") { "open" } else { "save" };
                vec![
                    json!({
                        "jsonrpc": "2.0",
                        "method": "window/logMessage",
                        "params": {"type": 3, "message": "linting"}
                    }),
                    publish(uri, kind, text),
                ]
            }
            _ => Vec::new(),
        };

        for message in reply {
            if writer.write_message(&message).await.is_err() {
                return;
            }
        }
    }
}

fn publish(uri: &str, kind: &str, text: &str) -> Value {
    let diagnostics: Vec<Value> = text
        .lines()
        .enumerate()
        .filter(|(_, line)| line.contains(TYPO_MARKER))
        .map(|(index, line)| {
            json!({
                "range": {
                    "start": {"line": index, "character": 0},
                    "end": {"line": index, "character": line.len()}
                },
                "severity": 1,
                "source": "pyflakes",
                "message": format!("{}: {}", kind, line)
            })
        })
        .collect();

    json!({
        "jsonrpc": "2.0",
        "method": "textDocument/publishDiagnostics",
        "params": {"uri": uri, "diagnostics": diagnostics}
    })
}
