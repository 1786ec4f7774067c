//! Analysis Orchestrator
//!
//! Receives document lifecycle events, drives realtime (worker pool) and deep
//! (HTTP collaborator) analyses, and publishes the merged diagnostics after
//! every completed analysis.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::cache::DiagnosticCache;
use super::debounce::Debouncer;
use crate::error::AnalyzerError;
use crate::infra::analyzer::DeepAnalyzer;
use crate::infra::lsp::{PoolHealth, WorkerPool};
use crate::models::{Diagnostic, DiagnosticSource};

/// Sink for merged diagnostics (the editor connection)
#[async_trait]
pub trait DiagnosticPublisher: Send + Sync {
    async fn publish(&self, uri: &str, diagnostics: Vec<Diagnostic>);
}

pub struct Orchestrator {
    pool: WorkerPool,
    cache: DiagnosticCache,
    debouncer: Debouncer<String>,
    deep: Arc<dyn DeepAnalyzer>,
    publisher: Arc<dyn DiagnosticPublisher>,
    debounce: Duration,
}

impl Orchestrator {
    pub fn new(
        pool: WorkerPool,
        deep: Arc<dyn DeepAnalyzer>,
        publisher: Arc<dyn DiagnosticPublisher>,
        debounce: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            cache: DiagnosticCache::new(),
            debouncer: Debouncer::new(),
            deep,
            publisher,
            debounce,
        })
    }

    pub fn cache(&self) -> &DiagnosticCache {
        &self.cache
    }

    pub async fn health(&self) -> PoolHealth {
        self.pool.health().await
    }

    /// Track the document and analyze it right away
    pub async fn on_open(&self, uri: &str, text: &str) {
        self.cache.open(uri).await;
        self.run_realtime(uri, text).await;
    }

    /// Schedule a realtime analysis once edits to `uri` settle
    ///
    /// Returns immediately. Results for a document that is not open by the
    /// time the analysis finishes are discarded by the cache.
    pub fn on_change(self: &Arc<Self>, uri: &str, text: &str) {
        let this = Arc::clone(self);
        let target = uri.to_string();
        let text = text.to_string();
        self.debouncer
            .schedule(uri.to_string(), self.debounce, move || async move {
                this.run_realtime(&target, &text).await;
            });
    }

    /// Run the deep analyzer on the saved document
    pub async fn on_save(&self, uri: &str, text: &str) {
        if let Some(diagnostics) = self.run_deep(uri, text).await {
            self.store_and_publish(uri, DiagnosticSource::Deep, diagnostics)
                .await;
        }
    }

    /// Deep analysis of a snippet (one notebook cell) starting at `line_offset`
    pub async fn on_save_cell(&self, uri: &str, cell_text: &str, line_offset: u32) {
        let Some(diagnostics) = self.run_deep(uri, cell_text).await else {
            return;
        };
        let merged = self
            .cache
            .update_with_offset_and_merge(uri, DiagnosticSource::Deep, diagnostics, line_offset)
            .await;
        if let Some(merged) = merged {
            self.publish(uri, merged).await;
        }
    }

    pub async fn on_close(&self, uri: &str) {
        self.debouncer.cancel(&uri.to_string());
        self.cache.clear(uri).await;
        tracing::debug!("Closed {}", uri);
    }

    pub async fn shutdown(&self) {
        self.debouncer.cancel_all();
        self.pool.shutdown().await;
    }

    async fn run_realtime(&self, uri: &str, text: &str) {
        let diagnostics = self.pool.analyze(text, uri).await;
        self.store_and_publish(uri, DiagnosticSource::Realtime, diagnostics)
            .await;
    }

    /// `None` leaves the cached deep results as they are
    async fn run_deep(&self, uri: &str, text: &str) -> Option<Vec<Diagnostic>> {
        match self.deep.analyze(uri, text).await {
            Ok(diagnostics) => Some(diagnostics),
            Err(AnalyzerError::Disabled) => None,
            Err(e) => {
                tracing::warn!("Deep analysis of {} failed: {}", uri, e);
                None
            }
        }
    }

    async fn store_and_publish(
        &self,
        uri: &str,
        source: DiagnosticSource,
        diagnostics: Vec<Diagnostic>,
    ) {
        if let Some(merged) = self.cache.update_and_merge(uri, source, diagnostics).await {
            self.publish(uri, merged).await;
        }
    }

    async fn publish(&self, uri: &str, merged: Vec<Diagnostic>) {
        tracing::debug!("Publishing {} diagnostics for {}", merged.len(), uri);
        self.publisher.publish(uri, merged).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::infra::lsp::WorkerLauncher;
    use crate::infra::lsp::testing::{MemoryLauncher, test_settings};
    use crate::models::{DiagnosticSeverity, Position, Range};

    const URI: &str = "file:///a.py";
    const DEBOUNCE: Duration = Duration::from_millis(400);

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<(String, Vec<Diagnostic>)>>,
    }

    impl RecordingPublisher {
        fn count(&self) -> usize {
            self.published.lock().unwrap().len()
        }

        fn last(&self) -> Option<Vec<Diagnostic>> {
            self.published.lock().unwrap().last().map(|(_, d)| d.clone())
        }
    }

    #[async_trait]
    impl DiagnosticPublisher for RecordingPublisher {
        async fn publish(&self, uri: &str, diagnostics: Vec<Diagnostic>) {
            self.published
                .lock()
                .unwrap()
                .push((uri.to_string(), diagnostics));
        }
    }

    #[derive(Default)]
    struct ScriptedDeep {
        responses: Mutex<VecDeque<Result<Vec<Diagnostic>, AnalyzerError>>>,
    }

    impl ScriptedDeep {
        fn push(&self, response: Result<Vec<Diagnostic>, AnalyzerError>) {
            self.responses.lock().unwrap().push_back(response);
        }
    }

    #[async_trait]
    impl DeepAnalyzer for ScriptedDeep {
        async fn analyze(&self, _uri: &str, _text: &str) -> Result<Vec<Diagnostic>, AnalyzerError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Vec::new()))
        }
    }

    struct Harness {
        orchestrator: Arc<Orchestrator>,
        launcher: Arc<MemoryLauncher>,
        publisher: Arc<RecordingPublisher>,
        deep: Arc<ScriptedDeep>,
    }

    async fn harness() -> Harness {
        let launcher = Arc::new(MemoryLauncher::new());
        let dyn_launcher: Arc<dyn WorkerLauncher> = launcher.clone();
        let pool = WorkerPool::start(dyn_launcher, test_settings(), 2, 4)
            .await
            .unwrap();
        let publisher = Arc::new(RecordingPublisher::default());
        let deep = Arc::new(ScriptedDeep::default());
        let orchestrator = Orchestrator::new(pool, deep.clone(), publisher.clone(), DEBOUNCE);
        Harness {
            orchestrator,
            launcher,
            publisher,
            deep,
        }
    }

    fn deep_diag(line: u32) -> Diagnostic {
        Diagnostic::new(
            Range::new(Position::new(line, 0), Position::new(line, 3)),
            DiagnosticSeverity::Warning,
            "pylint",
            "unused variable 'x'",
        )
        .with_code("W0612")
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_burst_then_save() {
        let h = harness().await;

        h.orchestrator.on_open(URI, "x=1\ny=2").await;
        assert_eq!(h.publisher.last(), Some(vec![]));

        let mut text = String::from("x=1\ny=2");
        for c in ['\n', 'z', ' ', '=', ' '] {
            text.push(c);
            h.orchestrator.on_change(URI, &text);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        // One analysis for the open, exactly one for the whole burst
        assert_eq!(
            h.launcher.opened_texts(),
            vec!["x=1\ny=2".to_string(), "x=1\ny=2\nz = ".to_string()]
        );
        assert_eq!(h.publisher.count(), 2);

        h.deep.push(Ok(vec![deep_diag(0)]));
        h.orchestrator.on_save(URI, &text).await;
        assert_eq!(h.orchestrator.cache().merged(URI).await, vec![deep_diag(0)]);
        assert_eq!(h.publisher.last(), Some(vec![deep_diag(0)]));
    }

    #[tokio::test]
    async fn test_merge_puts_realtime_first() {
        let h = harness().await;
        h.deep.push(Ok(vec![deep_diag(0)]));

        h.orchestrator.on_open(URI, "a typo").await;
        h.orchestrator.on_save(URI, "a typo").await;

        let merged = h.publisher.last().unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].message(), "open: a typo");
        assert_eq!(merged[1], deep_diag(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_analysis() {
        let h = harness().await;

        h.orchestrator.on_open(URI, "x=1").await;
        h.orchestrator.on_change(URI, "x=2 typo");
        h.orchestrator.on_close(URI).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(h.launcher.opened_texts(), vec!["x=1".to_string()]);
        assert!(!h.orchestrator.cache().is_open(URI).await);
        assert_eq!(h.publisher.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_to_unopened_document_never_publishes() {
        let h = harness().await;
        h.orchestrator.on_change("file:///other.py", "typo");
        assert_eq!(h.orchestrator.debouncer.pending_count(), 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.launcher.opened_texts(), vec!["typo".to_string()]);
        assert_eq!(h.publisher.count(), 0);
    }

    #[tokio::test]
    async fn test_deep_failure_keeps_stale_results() {
        let h = harness().await;
        h.orchestrator.on_open(URI, "x=1").await;

        h.deep.push(Ok(vec![deep_diag(3)]));
        h.orchestrator.on_save(URI, "x=1").await;
        let published = h.publisher.count();

        h.deep.push(Err(AnalyzerError::InvalidResponse("eof".to_string())));
        h.orchestrator.on_save(URI, "x=1").await;

        assert_eq!(h.publisher.count(), published);
        assert_eq!(
            h.orchestrator.cache().get(URI, DiagnosticSource::Deep).await,
            Some(vec![deep_diag(3)])
        );
    }

    #[tokio::test]
    async fn test_cell_save_shifts_lines() {
        let h = harness().await;
        h.orchestrator.on_open(URI, "x=1").await;

        h.deep.push(Ok(vec![deep_diag(1)]));
        h.orchestrator.on_save_cell(URI, "y = x\nz", 20).await;

        let merged = h.orchestrator.cache().merged(URI).await;
        assert_eq!(merged[0].range().start(), Position::new(21, 0));
    }

    #[tokio::test]
    async fn test_shutdown_stops_pool() {
        let h = harness().await;
        h.orchestrator.on_open(URI, "x=1").await;
        h.orchestrator.shutdown().await;
        assert!(h.orchestrator.health().await.workers.is_empty());
    }
}
