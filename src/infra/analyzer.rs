//! Deep analysis collaborator
//!
//! The slow multi-tool static analysis runs in a separate HTTP service. The
//! document is uploaded as a multipart file and the service answers with
//! `{"diagnostics": [...]}` in one of two item shapes:
//!
//! ```text
//! {"line": 3, "column": 0, "endLine": 3, "endColumn": 5,
//!  "severity": "convention", "message": "...", "tool": "pylint", "symbol": "C0114"}
//! {"range": {"start": {...}, "end": {...}}, "severity": 2, "code": "...", "source": "...", "message": "..."}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::AnalyzerError;
use crate::infra::lsp::protocol::RawRange;
use crate::models::config::DeepConfig;
use crate::models::lsp::uri_file_name;
use crate::models::{Diagnostic, DiagnosticSeverity, DiagnosticSource, Position, Range};

#[async_trait]
pub trait DeepAnalyzer: Send + Sync {
    async fn analyze(&self, uri: &str, text: &str) -> Result<Vec<Diagnostic>, AnalyzerError>;
}

/// Build the analyzer described by `config`
pub fn from_config(config: &DeepConfig) -> Result<Box<dyn DeepAnalyzer>, AnalyzerError> {
    if config.enabled {
        Ok(Box::new(HttpDeepAnalyzer::new(config)?))
    } else {
        Ok(Box::new(DisabledAnalyzer))
    }
}

pub struct HttpDeepAnalyzer {
    client: reqwest::Client,
    url: String,
    upload_field: String,
    one_based_lines: bool,
}

impl HttpDeepAnalyzer {
    pub fn new(config: &DeepConfig) -> Result<Self, AnalyzerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            upload_field: config.upload_field.clone(),
            one_based_lines: config.one_based_lines,
        })
    }
}

#[async_trait]
impl DeepAnalyzer for HttpDeepAnalyzer {
    async fn analyze(&self, uri: &str, text: &str) -> Result<Vec<Diagnostic>, AnalyzerError> {
        let file_name = uri_file_name(uri);
        let part = reqwest::multipart::Part::bytes(text.as_bytes().to_vec())
            .file_name(file_name.clone())
            .mime_str("application/octet-stream")?;
        let form = reqwest::multipart::Form::new().part(self.upload_field.clone(), part);

        tracing::debug!("Uploading {} to {}", file_name, self.url);
        let response = self.client.post(&self.url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let body: DeepResponse = response
            .json()
            .await
            .map_err(|e| AnalyzerError::InvalidResponse(e.to_string()))?;

        Ok(body
            .diagnostics
            .into_iter()
            .map(|item| item.into_diagnostic(self.one_based_lines))
            .collect())
    }
}

/// Stand-in when `deep.enabled = false`
pub struct DisabledAnalyzer;

#[async_trait]
impl DeepAnalyzer for DisabledAnalyzer {
    async fn analyze(&self, _uri: &str, _text: &str) -> Result<Vec<Diagnostic>, AnalyzerError> {
        Err(AnalyzerError::Disabled)
    }
}

#[derive(Debug, Deserialize)]
pub struct DeepResponse {
    #[serde(default)]
    pub diagnostics: Vec<DeepDiagnostic>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SeverityValue {
    Number(i64),
    Name(String),
}

impl SeverityValue {
    fn resolve(&self) -> DiagnosticSeverity {
        match self {
            Self::Number(n) => DiagnosticSeverity::from_lsp(*n),
            Self::Name(name) => name.parse().unwrap_or(DiagnosticSeverity::Warning),
        }
    }
}

/// One finding from the deep analyzer, in either response shape
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepDiagnostic {
    #[serde(default)]
    pub range: Option<RawRange>,
    #[serde(default)]
    pub line: Option<i64>,
    #[serde(default)]
    pub column: Option<i64>,
    #[serde(default)]
    pub end_line: Option<i64>,
    #[serde(default)]
    pub end_column: Option<i64>,
    #[serde(default)]
    pub severity: Option<SeverityValue>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub symbol: Option<Value>,
    #[serde(default)]
    pub code: Option<Value>,
}

impl DeepDiagnostic {
    /// Adapt into the internal model
    ///
    /// An LSP `range` is taken verbatim; flat coordinates have their lines
    /// rebased when `one_based_lines` is set.
    pub fn into_diagnostic(self, one_based_lines: bool) -> Diagnostic {
        let range = match self.range {
            Some(raw) => Range::new(
                Position::clamped(raw.start.line, raw.start.character),
                Position::clamped(raw.end.line, raw.end.character),
            ),
            None => {
                let base = i64::from(one_based_lines);
                // Coordinates come from another service; never overflow on them
                let line = self.line.unwrap_or(base).saturating_sub(base);
                let column = self.column.unwrap_or(0);
                let end_line = self.end_line.map_or(line, |l| l.saturating_sub(base));
                let end_column = self.end_column.unwrap_or(column.saturating_add(1));
                Range::new(
                    Position::clamped(line, column),
                    Position::clamped(end_line, end_column),
                )
            }
        };

        let severity = self
            .severity
            .as_ref()
            .map_or(DiagnosticSeverity::Warning, SeverityValue::resolve);
        let source = self
            .tool
            .or(self.source)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DiagnosticSource::Deep.to_string());

        let diagnostic = Diagnostic::new(range, severity, source, self.message);
        match self.symbol.or(self.code) {
            Some(Value::String(code)) if !code.is_empty() => diagnostic.with_code(code),
            Some(Value::Number(code)) => diagnostic.with_code(code.to_string()),
            _ => diagnostic,
        }
    }
}
