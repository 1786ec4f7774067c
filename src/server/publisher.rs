//! Outbound half of the editor connection

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use crate::infra::lsp::FrameWriter;
use crate::infra::lsp::protocol::{Notification, PublishDiagnosticsParams, methods};
use crate::models::Diagnostic;
use crate::services::DiagnosticPublisher;

pub type Outgoing = mpsc::UnboundedSender<Value>;

/// Queue a message for the writer task; false once the connection is gone
pub fn queue<T: Serialize>(outgoing: &Outgoing, message: &T) -> bool {
    match serde_json::to_value(message) {
        Ok(value) => outgoing.send(value).is_ok(),
        Err(e) => {
            tracing::error!("Failed to encode outgoing message: {}", e);
            false
        }
    }
}

/// Sends merged diagnostics to the editor as `publishDiagnostics`
pub struct ChannelPublisher {
    outgoing: Outgoing,
}

impl ChannelPublisher {
    pub fn new(outgoing: Outgoing) -> Self {
        Self { outgoing }
    }
}

#[async_trait]
impl DiagnosticPublisher for ChannelPublisher {
    async fn publish(&self, uri: &str, diagnostics: Vec<Diagnostic>) {
        let params = PublishDiagnosticsParams {
            uri: uri.to_string(),
            diagnostics,
        };
        let params = match serde_json::to_value(params) {
            Ok(params) => params,
            Err(e) => {
                tracing::error!("Failed to encode diagnostics for {}: {}", uri, e);
                return;
            }
        };
        let notification = Notification::new(methods::PUBLISH_DIAGNOSTICS, Some(params));
        if !queue(&self.outgoing, &notification) {
            tracing::debug!("Editor connection closed; dropped diagnostics for {}", uri);
        }
    }
}

/// Drain the outgoing queue into `writer` until every sender is dropped
pub async fn write_outgoing<W: AsyncWrite + Unpin>(
    mut outgoing: mpsc::UnboundedReceiver<Value>,
    writer: W,
) {
    let mut writer = FrameWriter::new(writer);
    while let Some(message) = outgoing.recv().await {
        if let Err(e) = writer.write_message(&message).await {
            tracing::warn!("Failed to write to editor: {}", e);
            break;
        }
    }
}
