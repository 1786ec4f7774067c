//! Per-document diagnostic cache with source-ordered merge

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use crate::models::{Diagnostic, DiagnosticSource};

/// Latest diagnostics per source for one open document
///
/// `BTreeMap` iteration follows `DiagnosticSource` order, which is the merge order.
#[derive(Debug, Default)]
struct DocumentEntry {
    sources: BTreeMap<DiagnosticSource, Vec<Diagnostic>>,
}

impl DocumentEntry {
    fn merged(&self) -> Vec<Diagnostic> {
        self.sources.values().flatten().cloned().collect()
    }
}

/// Thread-safe diagnostic store keyed by document URI
///
/// Only documents that are open accept updates, so a late analysis result
/// cannot bring a closed document back.
#[derive(Default)]
pub struct DiagnosticCache {
    documents: RwLock<HashMap<String, DocumentEntry>>,
}

impl DiagnosticCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `uri`; existing entries are kept. Returns true if newly opened.
    pub async fn open(&self, uri: &str) -> bool {
        let mut documents = self.documents.write().await;
        if documents.contains_key(uri) {
            return false;
        }
        documents.insert(uri.to_string(), DocumentEntry::default());
        true
    }

    pub async fn is_open(&self, uri: &str) -> bool {
        self.documents.read().await.contains_key(uri)
    }

    /// Replace the list for one source; other sources are untouched
    pub async fn update(
        &self,
        uri: &str,
        source: DiagnosticSource,
        diagnostics: Vec<Diagnostic>,
    ) -> bool {
        self.update_and_merge(uri, source, diagnostics).await.is_some()
    }

    /// Like [`update`](Self::update) for diagnostics computed on a snippet
    /// starting at `line_offset` in the full document
    pub async fn update_with_offset(
        &self,
        uri: &str,
        source: DiagnosticSource,
        diagnostics: Vec<Diagnostic>,
        line_offset: u32,
    ) -> bool {
        self.update_with_offset_and_merge(uri, source, diagnostics, line_offset)
            .await
            .is_some()
    }

    /// Offset variant of [`update_and_merge`](Self::update_and_merge)
    pub async fn update_with_offset_and_merge(
        &self,
        uri: &str,
        source: DiagnosticSource,
        diagnostics: Vec<Diagnostic>,
        line_offset: u32,
    ) -> Option<Vec<Diagnostic>> {
        let shifted = shift_lines(&diagnostics, line_offset);
        self.update_and_merge(uri, source, shifted).await
    }

    /// Update then merge under one lock; `None` when the document is not open
    pub async fn update_and_merge(
        &self,
        uri: &str,
        source: DiagnosticSource,
        diagnostics: Vec<Diagnostic>,
    ) -> Option<Vec<Diagnostic>> {
        let mut documents = self.documents.write().await;
        let Some(entry) = documents.get_mut(uri) else {
            tracing::debug!("Dropping {} diagnostics for closed document {}", source, uri);
            return None;
        };
        entry.sources.insert(source, diagnostics);
        Some(entry.merged())
    }

    /// All sources concatenated: realtime first, then deep. No deduplication.
    pub async fn merged(&self, uri: &str) -> Vec<Diagnostic> {
        self.documents
            .read()
            .await
            .get(uri)
            .map(DocumentEntry::merged)
            .unwrap_or_default()
    }

    pub async fn get(&self, uri: &str, source: DiagnosticSource) -> Option<Vec<Diagnostic>> {
        self.documents
            .read()
            .await
            .get(uri)
            .and_then(|entry| entry.sources.get(&source).cloned())
    }

    /// Forget the document and all its diagnostics
    pub async fn clear(&self, uri: &str) -> bool {
        self.documents.write().await.remove(uri).is_some()
    }

    pub async fn open_documents(&self) -> usize {
        self.documents.read().await.len()
    }
}

fn shift_lines(diagnostics: &[Diagnostic], line_offset: u32) -> Vec<Diagnostic> {
    diagnostics.iter().map(|d| d.shifted(line_offset)).collect()
}
