//! Worker Pool
//!
//! Owns N workers, hands them out round-robin and replaces the whole set
//! when any of them breaks mid round-trip.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};

use super::worker::{Worker, WorkerLauncher, WorkerSettings};
use crate::error::LspError;
use crate::models::Diagnostic;

struct PoolState {
    workers: Vec<Arc<Worker>>,
    next: usize,
    generation: u64,
    shut_down: bool,
}

pub struct WorkerPool {
    launcher: Arc<dyn WorkerLauncher>,
    settings: Arc<WorkerSettings>,
    size: usize,
    state: Mutex<PoolState>,
    permits: Semaphore,
}

impl WorkerPool {
    /// Spawn `size` workers; analyses beyond `max_concurrent` wait for a permit
    pub async fn start(
        launcher: Arc<dyn WorkerLauncher>,
        settings: Arc<WorkerSettings>,
        size: usize,
        max_concurrent: usize,
    ) -> Result<Self, LspError> {
        let size = size.max(1);
        let workers = spawn_workers(launcher.as_ref(), &settings, size, 0).await?;
        tracing::info!("Worker pool started with {} workers", size);

        Ok(Self {
            launcher,
            settings,
            size,
            state: Mutex::new(PoolState {
                workers,
                next: 0,
                generation: 0,
                shut_down: false,
            }),
            permits: Semaphore::new(max_concurrent.max(1)),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    /// Next worker in cyclic order
    pub async fn next(&self) -> Result<Arc<Worker>, LspError> {
        let mut state = self.state.lock().await;
        if state.shut_down {
            return Err(LspError::PoolShutdown);
        }
        if state.workers.is_empty() {
            return Err(LspError::PoolEmpty);
        }
        let index = state.next % state.workers.len();
        state.next = state.next.wrapping_add(1);
        Ok(Arc::clone(&state.workers[index]))
    }

    /// Terminate every worker and spawn a fresh set
    pub async fn restart(&self) -> Result<(), LspError> {
        let mut state = self.state.lock().await;
        if state.shut_down {
            return Err(LspError::PoolShutdown);
        }
        self.restart_locked(&mut state).await
    }

    /// Restart unless a newer generation already replaced the failed one
    async fn recover(&self, failed_generation: u64) {
        let mut state = self.state.lock().await;
        if state.shut_down || state.generation != failed_generation {
            return;
        }
        if let Err(e) = self.restart_locked(&mut state).await {
            tracing::error!("Worker pool restart failed: {}", e);
        }
    }

    async fn restart_locked(&self, state: &mut PoolState) -> Result<(), LspError> {
        let old = std::mem::take(&mut state.workers);
        join_all(old.iter().map(|worker| worker.terminate())).await;

        state.next = 0;
        state.generation += 1;
        tracing::info!(
            "Restarting worker pool (generation {})",
            state.generation
        );

        state.workers = spawn_workers(
            self.launcher.as_ref(),
            &self.settings,
            self.size,
            state.generation,
        )
        .await?;
        Ok(())
    }

    /// Realtime diagnostics for `code`
    ///
    /// Transport failures restart the pool and yield an empty list.
    pub async fn analyze(&self, code: &str, uri: &str) -> Vec<Diagnostic> {
        if code.is_empty() {
            return Vec::new();
        }

        let Ok(_permit) = self.permits.acquire().await else {
            return Vec::new();
        };

        let worker = match self.next().await {
            Ok(worker) => worker,
            Err(LspError::PoolShutdown) => return Vec::new(),
            Err(e) => {
                tracing::warn!("No worker available for {}: {}", uri, e);
                let generation = self.generation().await;
                self.recover(generation).await;
                return Vec::new();
            }
        };

        match round_trip(&worker, code, uri).await {
            Ok(diagnostics) => {
                tracing::debug!(
                    "Worker {} reported {} diagnostics for {}",
                    worker.slot(),
                    diagnostics.len(),
                    uri
                );
                diagnostics
            }
            Err(e) => {
                tracing::warn!("Worker {} failed on {}: {}", worker.slot(), uri, e);
                if e.needs_restart() {
                    self.recover(worker.generation()).await;
                }
                Vec::new()
            }
        }
    }

    pub async fn health(&self) -> PoolHealth {
        let (workers, generation) = {
            let state = self.state.lock().await;
            (state.workers.clone(), state.generation)
        };

        let mut report = Vec::with_capacity(workers.len());
        for worker in workers {
            report.push(WorkerHealth {
                slot: worker.slot(),
                pid: worker.pid().await,
                alive: worker.is_alive().await,
            });
        }

        PoolHealth {
            generation,
            size: self.size,
            workers: report,
        }
    }

    /// Stop all workers; later calls to `analyze` return nothing
    pub async fn shutdown(&self) {
        let workers = {
            let mut state = self.state.lock().await;
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            std::mem::take(&mut state.workers)
        };
        self.permits.close();

        join_all(workers.iter().map(|worker| worker.shutdown())).await;
        tracing::info!("Worker pool stopped");
    }
}

async fn spawn_workers(
    launcher: &dyn WorkerLauncher,
    settings: &Arc<WorkerSettings>,
    size: usize,
    generation: u64,
) -> Result<Vec<Arc<Worker>>, LspError> {
    let started = join_all((0..size).map(|slot| async move {
        let io = launcher.launch(slot).await?;
        Worker::start(slot, generation, io, Arc::clone(settings)).await
    }))
    .await;

    started
        .into_iter()
        .map(|worker| worker.map(Arc::new))
        .collect()
}

/// didOpen then didSave; only the first publication is kept
async fn round_trip(worker: &Worker, code: &str, uri: &str) -> Result<Vec<Diagnostic>, LspError> {
    let mut exchange = worker.exchange().await;

    exchange.open(uri, code).await?;
    let first = exchange.read_diagnostics().await?;
    exchange.save(uri, code).await?;
    exchange.read_diagnostics().await?;

    let source = exchange.source_name();
    Ok(first
        .diagnostics
        .into_iter()
        .map(|raw| raw.into_diagnostic(source))
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolHealth {
    pub generation: u64,
    pub size: usize,
    pub workers: Vec<WorkerHealth>,
}

impl PoolHealth {
    pub fn live(&self) -> usize {
        self.workers.iter().filter(|w| w.alive).count()
    }

    pub fn is_healthy(&self) -> bool {
        self.workers.len() == self.size && self.live() == self.size
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerHealth {
    pub slot: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub alive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::lsp::testing::{MemoryLauncher, test_settings};

    async fn pool(launcher: &Arc<MemoryLauncher>, size: usize) -> WorkerPool {
        let launcher: Arc<dyn WorkerLauncher> = launcher.clone();
        WorkerPool::start(launcher, test_settings(), size, 4)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_round_robin_is_cyclic() {
        let launcher = Arc::new(MemoryLauncher::new());
        let pool = pool(&launcher, 3).await;

        let mut slots = Vec::new();
        for _ in 0..6 {
            slots.push(pool.next().await.unwrap().slot());
        }
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(launcher.launches(), 3);
    }

    #[tokio::test]
    async fn test_analyze_keeps_open_response() {
        let launcher = Arc::new(MemoryLauncher::new());
        let pool = pool(&launcher, 1).await;

        let diagnostics = pool.analyze("x = 1\ntypo here", "file:///a.py").await;
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message(), "open: typo here");
        assert_eq!(diagnostics[0].range().start().line, 1);
        assert_eq!(diagnostics[0].source(), "pyflakes");

        // Both notifications reached the engine, in order
        let methods: Vec<String> = launcher.calls().into_iter().map(|c| c.method).collect();
        assert_eq!(methods, vec!["textDocument/didOpen", "textDocument/didSave"]);
    }

    #[tokio::test]
    async fn test_analyze_clean_code_is_empty() {
        let launcher = Arc::new(MemoryLauncher::new());
        let pool = pool(&launcher, 2).await;
        assert!(pool.analyze("x=1\ny=2", "file:///a.py").await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_code_skips_workers() {
        let launcher = Arc::new(MemoryLauncher::new());
        let pool = pool(&launcher, 1).await;
        assert!(pool.analyze("", "file:///a.py").await.is_empty());
        assert!(launcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restart_recovery_after_transport_failure() {
        let launcher = Arc::new(MemoryLauncher::with_broken(1));
        let pool = pool(&launcher, 1).await;

        assert!(pool.analyze("typo", "file:///a.py").await.is_empty());
        assert_eq!(pool.generation().await, 1);

        let diagnostics = pool.analyze("typo", "file:///a.py").await;
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_failures_restart_once() {
        let launcher = Arc::new(MemoryLauncher::with_broken(2));
        let pool = pool(&launcher, 2).await;

        let (a, b) = tokio::join!(
            pool.analyze("typo", "file:///a.py"),
            pool.analyze("typo", "file:///b.py")
        );
        assert!(a.is_empty() && b.is_empty());
        assert_eq!(pool.generation().await, 1);
        assert_eq!(launcher.launches(), 4);
    }

    #[tokio::test]
    async fn test_manual_restart_resets_counter() {
        let launcher = Arc::new(MemoryLauncher::new());
        let pool = pool(&launcher, 2).await;

        pool.next().await.unwrap();
        pool.restart().await.unwrap();

        let worker = pool.next().await.unwrap();
        assert_eq!(worker.slot(), 0);
        assert_eq!(worker.generation(), 1);
    }

    #[tokio::test]
    async fn test_health_and_shutdown() {
        let launcher = Arc::new(MemoryLauncher::new());
        let pool = pool(&launcher, 2).await;

        let health = pool.health().await;
        assert!(health.is_healthy());
        assert_eq!(health.workers.len(), 2);

        pool.shutdown().await;
        assert!(matches!(pool.next().await, Err(LspError::PoolShutdown)));
        assert!(pool.analyze("typo", "file:///a.py").await.is_empty());
        assert!(matches!(pool.restart().await, Err(LspError::PoolShutdown)));
    }
}
