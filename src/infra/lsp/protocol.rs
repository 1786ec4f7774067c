//! JSON-RPC 2.0 Protocol Implementation for LSP
//!
//! Message envelopes plus the handful of LSP payloads the pipeline speaks:
//! document sync notifications and `publishDiagnostics`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Diagnostic, DiagnosticSeverity, Position, Range};

// ============================================================================
// JSON-RPC 2.0 Core Types
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(id),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: RequestId, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: None,
            error: Some(ResponseError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC 2.0 Notification (no id, no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Request ID - can be number or string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Standard JSON-RPC error codes
pub mod error_codes {
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
}

/// Method names used on either side of the pipeline
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "initialized";
    pub const SHUTDOWN: &str = "shutdown";
    pub const EXIT: &str = "exit";
    pub const DID_OPEN: &str = "textDocument/didOpen";
    pub const DID_CHANGE: &str = "textDocument/didChange";
    pub const DID_SAVE: &str = "textDocument/didSave";
    pub const DID_CLOSE: &str = "textDocument/didClose";
    /// Editor extension: one notebook cell was saved
    pub const DID_SAVE_CELL: &str = "sculptor/didSaveCell";
    pub const PUBLISH_DIAGNOSTICS: &str = "textDocument/publishDiagnostics";
}

/// Incoming message from either peer
#[derive(Debug, Clone)]
pub enum Message {
    Response(Response),
    Request(Request),
    Notification(Notification),
}

impl Message {
    /// Classify a decoded JSON value by the presence of `id` and `method`
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        let has_id = value.get("id").is_some();
        let has_method = value.get("method").is_some();

        match (has_id, has_method) {
            (true, true) => Ok(Message::Request(serde_json::from_value(value)?)),
            (true, false) => Ok(Message::Response(serde_json::from_value(value)?)),
            (false, true) => Ok(Message::Notification(serde_json::from_value(value)?)),
            (false, false) => {
                use serde::de::Error;
                Err(serde_json::Error::custom("Invalid LSP message"))
            }
        }
    }
}

// ============================================================================
// Document Synchronisation
// ============================================================================

/// Initialize params sent to workers: our pid, no root, no capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub process_id: Option<u32>,
    pub root_uri: Option<String>,
    pub capabilities: Value,
}

impl InitializeParams {
    pub fn bare() -> Self {
        Self {
            process_id: Some(std::process::id()),
            root_uri: None,
            capabilities: serde_json::json!({}),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextDocumentIdentifier {
    pub uri: String,
}

/// Full document payload carried by didOpen/didSave towards workers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentItem {
    pub uri: String,
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidOpenTextDocumentParams {
    pub text_document: TextDocumentItem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentContentChangeEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidChangeTextDocumentParams {
    pub text_document: TextDocumentIdentifier,
    pub content_changes: Vec<TextDocumentContentChangeEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidSaveTextDocumentParams {
    pub text_document: TextDocumentIdentifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A saved notebook cell whose first line sits at `line_offset` in the document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidSaveCellParams {
    pub text_document: TextDocumentIdentifier,
    pub text: String,
    #[serde(default)]
    pub line_offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCloseTextDocumentParams {
    pub text_document: TextDocumentIdentifier,
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Outbound `publishDiagnostics` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishDiagnosticsParams {
    pub uri: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Inbound `publishDiagnostics` payload as emitted by a worker
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkerDiagnostics {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub diagnostics: Vec<RawDiagnostic>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RawPosition {
    #[serde(default)]
    pub line: i64,
    #[serde(default)]
    pub character: i64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RawRange {
    #[serde(default)]
    pub start: RawPosition,
    #[serde(default)]
    pub end: RawPosition,
}

/// Worker diagnostic decoded leniently; engines disagree on field types
#[derive(Debug, Clone, Deserialize)]
pub struct RawDiagnostic {
    #[serde(default)]
    pub range: RawRange,
    #[serde(default)]
    pub severity: Option<i64>,
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl RawDiagnostic {
    /// Normalise into the internal model; missing severity means Error per LSP
    pub fn into_diagnostic(self, fallback_source: &str) -> Diagnostic {
        let range = Range::new(
            Position::clamped(self.range.start.line, self.range.start.character),
            Position::clamped(self.range.end.line, self.range.end.character),
        );
        let severity = self
            .severity
            .map(DiagnosticSeverity::from_lsp)
            .unwrap_or(DiagnosticSeverity::Error);
        let source = self
            .source
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| fallback_source.to_string());

        let diagnostic = Diagnostic::new(range, severity, source, self.message);
        match self.code {
            Some(Value::String(code)) => diagnostic.with_code(code),
            Some(Value::Number(code)) => diagnostic.with_code(code.to_string()),
            _ => diagnostic,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
