use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::SyncConfig;
use crate::connectors::ConnectorRegistry;
use crate::extractor::PageExtractor;
use crate::models::{
    CompetitorLink, ConnectionStatus, ItemOutcome, LinkTarget, OutcomeKind, RunKind, SkipReason,
    Store, SyncRun,
};
use crate::reconciliation::ReconciliationWriter;
use crate::storage::Storage;
use crate::token_manager::TokenManager;
use crate::utils::error::{AppError, FailureKind, Result};

/// Run-level cancellation signal. In-flight attempts finish; no new jobs or
/// retries start once it fires.
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Deadline helper: fire the token after the given duration.
    pub fn cancel_after(&self, timeout: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(true);
        });
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Run lifecycle notifications published by the orchestrator.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    RunStarted { kind: RunKind, items: usize },
    RunCompleted { run: SyncRun },
}

/// Top-level driver: fans work out over a bounded worker pool, isolates
/// per-item failures, applies the retry policy, and aggregates a run
/// summary. The scrape pass and the store pass share the same shape and
/// differ only in the dispatch function.
#[derive(Clone)]
pub struct SyncOrchestrator {
    storage: Arc<dyn Storage>,
    writer: ReconciliationWriter,
    token_manager: Arc<TokenManager>,
    connectors: ConnectorRegistry,
    extractor: Arc<dyn PageExtractor>,
    config: SyncConfig,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncOrchestrator {
    pub fn new(
        storage: Arc<dyn Storage>,
        writer: ReconciliationWriter,
        token_manager: Arc<TokenManager>,
        connectors: ConnectorRegistry,
        extractor: Arc<dyn PageExtractor>,
        config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self { storage, writer, token_manager, connectors, extractor, config, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Sync every connected store. Always returns a summary, even when every
    /// item fails.
    pub async fn sync_all(&self, cancel: &CancelToken) -> Result<SyncRun> {
        let stores = self.storage.list_connected_stores().await?;

        let jobs = stores
            .into_iter()
            .map(|store| {
                let this = self.clone();
                let cancel = cancel.clone();
                let target_id = store.id.clone();
                let label = store.display_name.clone();
                (target_id, label, async move { this.sync_store_outcome(store, cancel).await })
            })
            .collect::<Vec<_>>();

        Ok(self.execute(RunKind::StoreSync, jobs, cancel).await)
    }

    /// Sync one store, outside of a batch run.
    pub async fn sync_store(&self, store: &Store, cancel: &CancelToken) -> ItemOutcome {
        self.sync_store_outcome(store.clone(), cancel.clone()).await
    }

    /// Scrape every URL-targeted competitor link, optionally narrowed to one
    /// owned product.
    pub async fn scrape_all(
        &self,
        product_id: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<SyncRun> {
        let links = self.storage.list_competitor_links(product_id).await?;

        let jobs = links
            .into_iter()
            .filter_map(|link| {
                let url = match &link.target {
                    LinkTarget::Url { url } => url.clone(),
                    // Platform products are observed by the store pass
                    LinkTarget::PlatformProduct { .. } => return None,
                };
                let this = self.clone();
                let cancel = cancel.clone();
                let target_id = link.id.clone();
                let label = link.label.clone();
                Some((target_id, label, async move {
                    this.scrape_link_outcome(link, url, cancel).await
                }))
            })
            .collect::<Vec<_>>();

        Ok(self.execute(RunKind::Scrape, jobs, cancel).await)
    }

    /// Shared orchestration shape: bounded concurrency, per-item spawn
    /// isolation, partial summary on cancellation.
    async fn execute<Fut>(
        &self,
        kind: RunKind,
        jobs: Vec<(String, String, Fut)>,
        cancel: &CancelToken,
    ) -> SyncRun
    where
        Fut: std::future::Future<Output = ItemOutcome> + Send + 'static,
    {
        let started_at = Utc::now();
        let _ = self.events.send(SyncEvent::RunStarted { kind, items: jobs.len() });

        let limit = self.config.max_concurrent_jobs.max(1);
        let run_cancel = cancel.clone();

        let outcomes: Vec<ItemOutcome> = stream::iter(jobs.into_iter().map(|(target_id, label, fut)| {
            let cancel = run_cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return ItemOutcome::new(target_id, label, OutcomeKind::Skipped {
                        reason: SkipReason::Cancelled,
                    });
                }

                // Spawned so a panicking job is contained and recorded
                // against its own item only
                match tokio::spawn(fut).await {
                    Ok(outcome) => outcome,
                    Err(join_err) => {
                        let message = if join_err.is_panic() {
                            "job panicked".to_string()
                        } else {
                            join_err.to_string()
                        };
                        tracing::error!(target_id = %target_id, message = %message, "sync job aborted");
                        ItemOutcome::new(target_id, label, OutcomeKind::Failed {
                            kind: FailureKind::Internal,
                            message,
                        })
                    }
                }
            }
        }))
        .buffer_unordered(limit)
        .collect()
        .await;

        let run = SyncRun::from_outcomes(kind, started_at, outcomes, cancel.is_cancelled());
        tracing::info!(
            kind = ?run.kind,
            total = run.total(),
            succeeded = run.succeeded,
            skipped = run.skipped,
            failed = run.failed,
            cancelled = run.cancelled,
            "sync run finished"
        );
        let _ = self.events.send(SyncEvent::RunCompleted { run: run.clone() });
        run
    }

    async fn sync_store_outcome(&self, store: Store, cancel: CancelToken) -> ItemOutcome {
        let target_id = store.id.clone();
        let label = store.display_name.clone();

        let outcome = match store.status {
            // Short-circuit before any network call; surfaced distinctly so
            // the caller can prompt re-authorization
            ConnectionStatus::NeedsReauth => {
                OutcomeKind::Skipped { reason: SkipReason::NeedsReauth }
            }
            ConnectionStatus::Disconnected => {
                OutcomeKind::Skipped { reason: SkipReason::Disconnected }
            }
            ConnectionStatus::Connected => match self.sync_store_inner(&store, &cancel).await {
                Ok(ids) if ids.is_empty() => {
                    OutcomeKind::Skipped { reason: SkipReason::NothingToSync }
                }
                Ok(ids) => OutcomeKind::Succeeded { observation_ids: ids },
                Err(err) => {
                    tracing::warn!(store_id = %store.id, error = %err, "store sync failed");
                    OutcomeKind::failed(&err)
                }
            },
        };

        ItemOutcome::new(target_id, label, outcome)
    }

    /// Credential refresh happens-before the first protected fetch; the
    /// catalog is then paged until every tracked link is matched or the
    /// platform runs out of pages.
    async fn sync_store_inner(&self, store: &Store, cancel: &CancelToken) -> Result<Vec<String>> {
        let links = self.storage.list_competitor_links(None).await?;
        let mut wanted: HashMap<String, CompetitorLink> = links
            .into_iter()
            .filter_map(|link| {
                link.platform_product_id(store.platform)
                    .map(|pid| (pid.to_string(), link.clone()))
            })
            .collect();

        if wanted.is_empty() {
            return Ok(vec![]);
        }

        let credential = self.token_manager.ensure_fresh(store).await?;
        let connector = self.connectors.get(store.platform)?;

        let mut observation_ids = Vec::new();
        let mut page: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let product_page = self
                .with_retry(cancel, || {
                    connector.fetch_products(&credential, page, self.config.page_size)
                })
                .await?;

            for product in &product_page.items {
                if let Some(link) = wanted.remove(&product.external_id) {
                    let observation = self
                        .writer
                        .record_observation(&link.id, product.price, &product.currency, Utc::now())
                        .await?;
                    observation_ids.push(observation.id);
                }
            }

            if wanted.is_empty() || !product_page.has_more {
                break;
            }
            page += 1;
        }

        Ok(observation_ids)
    }

    async fn scrape_link_outcome(
        &self,
        link: CompetitorLink,
        url: String,
        cancel: CancelToken,
    ) -> ItemOutcome {
        let target_id = link.id.clone();
        let label = link.label.clone();

        let outcome = match self.scrape_link_inner(&link, &url, &cancel).await {
            Ok(observation_id) => OutcomeKind::Succeeded { observation_ids: vec![observation_id] },
            Err(err) => {
                tracing::warn!(link_id = %link.id, url = %url, error = %err, "scrape failed");
                OutcomeKind::failed(&err)
            }
        };

        ItemOutcome::new(target_id, label, outcome)
    }

    async fn scrape_link_inner(
        &self,
        link: &CompetitorLink,
        url: &str,
        cancel: &CancelToken,
    ) -> Result<String> {
        let extracted = self
            .with_retry(cancel, || self.extractor.extract(url, link.selector.as_deref()))
            .await?;

        let observation = self
            .writer
            .record_observation(&link.id, extracted.price, &extracted.currency, Utc::now())
            .await?;
        Ok(observation.id)
    }

    /// Single place that decides retry vs. give-up: transient failures back
    /// off exponentially up to the attempt cap, everything else fails fast.
    async fn with_retry<T, F, Fut>(&self, cancel: &CancelToken, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.config.retry_base_delay_ms.max(1))
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(self.config.retry_attempts);

        let cancel = cancel.clone();
        RetryIf::spawn(strategy, operation, move |err: &AppError| {
            err.is_transient() && !cancel.is_cancelled()
        })
        .await
    }
}
