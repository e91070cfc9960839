//! Sync orchestrator: pulls records from 1C and reconciles them locally.
//!
//! One run targets one entity type across one or more integrations. Every
//! integration runs independently: its failure is recorded on its own
//! SyncLog and never aborts the others. Integrations that failed for a
//! transient or run-fatal reason are retried after
//! [`SyncConfig::retry_delay`], up to [`SyncConfig::max_run_attempts`]
//! attempts in total.

use dashmap::DashMap;
use futures::future::{join_all, BoxFuture};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::sync_log_model::{
    EntityType, SyncCounters, SyncLog, SyncLogRepositoryTrait, SyncLogStatus, SyncType,
};
use super::sync_progress::{publish_skipped, RunContext};
use super::sync_run_model::{
    IntegrationRunResult, RunReport, SyncConfig, SyncRequest, SyncTask, SyncTicket, TaskStatus,
};
use super::sync_tasks::TaskRegistry;
use crate::catalog::{
    decide_product, decide_stock, AppliedChange, BatchOutcome, CatalogRepositoryTrait,
    ChangeAction, Decision, ProductFields, RecordChange, RecordState, StockFields, StockKey,
};
use crate::errors::{Error, ErrorKind, Result, SyncError};
use crate::events::EventPublisher;
use crate::integrations::{
    ClientFactory, Integration, IntegrationOutcome, IntegrationRepositoryTrait,
    INTEGRATION_TYPE_ONEC,
};
use tradeos_onec::{NomenclatureQuery, OneCApi, RemoteProduct, RemoteStock, StockQuery};

/// How a pull ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Finished,
    Cancelled,
}

/// Mutable bookkeeping of one integration's run.
#[derive(Default)]
struct RunState {
    counters: SyncCounters,
    fetched: i64,
    expected_total: Option<i64>,
    record_errors: Vec<String>,
    pages: usize,
    queued: i64,
    last_progress: i64,
    latency_ms_total: f64,
    latency_samples: u32,
}

impl RunState {
    fn record_latency(&mut self, started: Instant) {
        self.latency_ms_total += started.elapsed().as_secs_f64() * 1000.0;
        self.latency_samples += 1;
    }

    fn avg_latency_ms(&self) -> Option<f64> {
        (self.latency_samples > 0).then(|| self.latency_ms_total / self.latency_samples as f64)
    }

    fn record_applied(&mut self, action: ChangeAction) {
        self.counters.processed += 1;
        match action {
            ChangeAction::Created => self.counters.created += 1,
            ChangeAction::Updated => self.counters.updated += 1,
        }
    }

    fn record_failure(&mut self, key: impl Display, message: impl Display) {
        warn!("Record {} failed: {}", key, message);
        self.counters.failed += 1;
        self.record_errors.push(format!("{}: {}", key, message));
    }

    /// Records decided so far, including changes still waiting in a batch.
    fn handled(&self) -> i64 {
        self.counters.processed + self.counters.failed + self.queued
    }

    fn final_counters(&self) -> SyncCounters {
        SyncCounters {
            total: self.expected_total.unwrap_or(self.fetched).max(self.fetched),
            ..self.counters
        }
    }
}

/// Per-entity glue between remote records, the reconciler and the store.
trait EntityPipeline {
    type Remote: Send;
    type Key: Clone + Eq + Hash + Display + Send + Sync + 'static;
    type Fields: Clone + Send + Sync + 'static;

    fn key(remote: &Self::Remote) -> Self::Key;

    fn validate(remote: &Self::Remote) -> std::result::Result<(), String>;

    fn decide(
        existing: Option<&RecordState<Self::Fields>>,
        remote: &Self::Remote,
    ) -> Decision<Self::Fields>;

    fn load(
        catalog: &dyn CatalogRepositoryTrait,
        integration_id: &str,
        keys: &[Self::Key],
    ) -> Result<HashMap<Self::Key, RecordState<Self::Fields>>>;

    fn commit<'a>(
        catalog: &'a dyn CatalogRepositoryTrait,
        integration_id: &'a str,
        changes: Vec<RecordChange<Self::Key, Self::Fields>>,
    ) -> BoxFuture<'a, Result<BatchOutcome<Self::Key>>>;

    fn announce(ctx: &RunContext, applied: &AppliedChange<Self::Key>, fields: &Self::Fields);
}

struct Products;

impl EntityPipeline for Products {
    type Remote = RemoteProduct;
    type Key = String;
    type Fields = ProductFields;

    fn key(remote: &RemoteProduct) -> String {
        remote.id.clone()
    }

    fn validate(remote: &RemoteProduct) -> std::result::Result<(), String> {
        if remote.id.trim().is_empty() {
            return Err("missing external id".to_string());
        }
        if remote.name.trim().is_empty() {
            return Err("missing name".to_string());
        }
        Ok(())
    }

    fn decide(
        existing: Option<&RecordState<ProductFields>>,
        remote: &RemoteProduct,
    ) -> Decision<ProductFields> {
        decide_product(existing, remote)
    }

    fn load(
        catalog: &dyn CatalogRepositoryTrait,
        integration_id: &str,
        keys: &[String],
    ) -> Result<HashMap<String, RecordState<ProductFields>>> {
        Ok(catalog
            .find_products(integration_id, keys)?
            .iter()
            .map(|p| (p.external_id.clone(), RecordState::from(p)))
            .collect())
    }

    fn commit<'a>(
        catalog: &'a dyn CatalogRepositoryTrait,
        integration_id: &'a str,
        changes: Vec<RecordChange<String, ProductFields>>,
    ) -> BoxFuture<'a, Result<BatchOutcome<String>>> {
        Box::pin(async move { catalog.apply_product_changes(integration_id, changes).await })
    }

    fn announce(ctx: &RunContext, applied: &AppliedChange<String>, fields: &ProductFields) {
        ctx.product_updated(applied, &fields.name);
    }
}

struct Stock;

impl EntityPipeline for Stock {
    type Remote = RemoteStock;
    type Key = StockKey;
    type Fields = StockFields;

    fn key(remote: &RemoteStock) -> StockKey {
        StockKey {
            product_external_id: remote.product_id.clone(),
            warehouse_id: remote.warehouse_id.clone(),
        }
    }

    fn validate(remote: &RemoteStock) -> std::result::Result<(), String> {
        if remote.product_id.trim().is_empty() {
            return Err("missing product id".to_string());
        }
        if remote.warehouse_id.trim().is_empty() {
            return Err("missing warehouse id".to_string());
        }
        Ok(())
    }

    fn decide(
        existing: Option<&RecordState<StockFields>>,
        remote: &RemoteStock,
    ) -> Decision<StockFields> {
        decide_stock(existing, remote)
    }

    fn load(
        catalog: &dyn CatalogRepositoryTrait,
        integration_id: &str,
        keys: &[StockKey],
    ) -> Result<HashMap<StockKey, RecordState<StockFields>>> {
        Ok(catalog
            .find_stock(integration_id, keys)?
            .iter()
            .map(|s| (s.key.clone(), RecordState::from(s)))
            .collect())
    }

    fn commit<'a>(
        catalog: &'a dyn CatalogRepositoryTrait,
        integration_id: &'a str,
        changes: Vec<RecordChange<StockKey, StockFields>>,
    ) -> BoxFuture<'a, Result<BatchOutcome<StockKey>>> {
        Box::pin(async move { catalog.apply_stock_changes(integration_id, changes).await })
    }

    fn announce(ctx: &RunContext, applied: &AppliedChange<StockKey>, _fields: &StockFields) {
        ctx.stock_updated(applied);
    }
}

/// Orchestrates catalog synchronization.
///
/// # Example
///
/// ```ignore
/// let orchestrator = Arc::new(SyncOrchestrator::new(
///     integrations, catalog, sync_logs, clients, broadcaster, SyncConfig::default(), shutdown,
/// ));
/// let ticket = orchestrator.run_sync(SyncRequest::all(EntityType::Nomenclature))?;
/// ```
pub struct SyncOrchestrator {
    integrations: Arc<dyn IntegrationRepositoryTrait>,
    catalog: Arc<dyn CatalogRepositoryTrait>,
    sync_logs: Arc<dyn SyncLogRepositoryTrait>,
    clients: Arc<dyn ClientFactory>,
    events: Arc<dyn EventPublisher>,
    config: SyncConfig,
    tasks: TaskRegistry,
    run_locks: DashMap<(String, EntityType), Arc<Mutex<()>>>,
}

impl SyncOrchestrator {
    pub fn new(
        integrations: Arc<dyn IntegrationRepositoryTrait>,
        catalog: Arc<dyn CatalogRepositoryTrait>,
        sync_logs: Arc<dyn SyncLogRepositoryTrait>,
        clients: Arc<dyn ClientFactory>,
        events: Arc<dyn EventPublisher>,
        config: SyncConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            integrations,
            catalog,
            sync_logs,
            clients,
            events,
            config,
            tasks: TaskRegistry::new(shutdown),
            run_locks: DashMap::new(),
        }
    }

    /// Starts a run in the background and returns its task handle.
    ///
    /// Fails synchronously only when a named integration does not exist or
    /// is disabled.
    pub fn run_sync(self: &Arc<Self>, request: SyncRequest) -> Result<SyncTicket> {
        if let Some(integration_id) = &request.integration_id {
            self.ensure_enabled(integration_id)?;
        }

        let (task, cancel) = self
            .tasks
            .register(request.entity_type, request.integration_id.clone());
        let task_id = task.task_id.clone();
        info!(
            "Queued {} sync task {} (integration: {:?})",
            request.entity_type, task_id, request.integration_id
        );

        let this = Arc::clone(self);
        let spawned_task_id = task_id.clone();
        tokio::spawn(async move {
            match this.execute(&spawned_task_id, &request, cancel).await {
                Ok(report) => this.tasks.finish(&spawned_task_id, report),
                Err(e) => {
                    error!("Sync task {} failed: {}", spawned_task_id, e);
                    this.tasks.fail(&spawned_task_id, e.to_string());
                }
            }
        });

        Ok(SyncTicket {
            task_id,
            status: TaskStatus::Started,
        })
    }

    /// Runs a request to completion on the caller's task.
    pub async fn run_now(&self, request: SyncRequest) -> Result<RunReport> {
        let (task, cancel) = self
            .tasks
            .register(request.entity_type, request.integration_id.clone());
        match self.execute(&task.task_id, &request, cancel).await {
            Ok(report) => {
                self.tasks.finish(&task.task_id, report.clone());
                Ok(report)
            }
            Err(e) => {
                self.tasks.fail(&task.task_id, e.to_string());
                Err(e)
            }
        }
    }

    pub fn task(&self, task_id: &str) -> Result<SyncTask> {
        self.tasks.get(task_id)
    }

    pub fn cancel_task(&self, task_id: &str) -> Result<SyncTask> {
        let task = self.tasks.cancel(task_id)?;
        info!("Cancellation requested for sync task {}", task_id);
        Ok(task)
    }

    pub fn active_tasks(&self) -> Vec<SyncTask> {
        self.tasks.active()
    }

    fn ensure_enabled(&self, integration_id: &str) -> Result<Integration> {
        let integration = self.integrations.get_by_id(integration_id)?;
        if !integration.is_enabled {
            return Err(SyncError::IntegrationDisabled(integration_id.to_string()).into());
        }
        Ok(integration)
    }

    fn select_targets(&self, request: &SyncRequest) -> Result<Vec<Integration>> {
        match &request.integration_id {
            Some(integration_id) => Ok(vec![self.ensure_enabled(integration_id)?]),
            None => Ok(self
                .integrations
                .list(Some(true), Some(INTEGRATION_TYPE_ONEC))?
                .into_iter()
                .filter(Integration::is_syncable)
                .collect()),
        }
    }

    async fn execute(
        &self,
        task_id: &str,
        request: &SyncRequest,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let mut targets = self.select_targets(request)?;
        if targets.is_empty() {
            info!("No integrations to sync for {}", request.entity_type);
            publish_skipped(
                self.events.as_ref(),
                task_id,
                request.entity_type,
                "No integrations to sync",
            );
            return Ok(RunReport {
                task_id: task_id.to_string(),
                entity_type: request.entity_type,
                status: TaskStatus::Skipped,
                attempts: 0,
                results: Vec::new(),
            });
        }

        let mut finals: Vec<IntegrationRunResult> = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.tasks.mark_running(task_id, attempt);
            info!(
                "Sync task {} attempt {}/{}: {} integration(s)",
                task_id,
                attempt,
                self.config.max_run_attempts,
                targets.len()
            );

            let results = join_all(
                targets
                    .iter()
                    .map(|integration| self.sync_integration(task_id, integration, request, &cancel)),
            )
            .await;

            let retry_ids: Vec<String> = results
                .iter()
                .filter(|r| r.is_retryable())
                .map(|r| r.integration_id.clone())
                .collect();

            for result in results {
                match finals
                    .iter_mut()
                    .find(|r| r.integration_id == result.integration_id)
                {
                    Some(slot) => *slot = result,
                    None => finals.push(result),
                }
            }

            if retry_ids.is_empty()
                || attempt >= self.config.max_run_attempts
                || cancel.is_cancelled()
            {
                break;
            }

            warn!(
                "Retrying {} integration(s) for task {} in {:?}",
                retry_ids.len(),
                task_id,
                self.config.retry_delay
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }

            targets = retry_ids
                .iter()
                .filter_map(|id| match self.integrations.get_by_id(id) {
                    Ok(integration) if integration.is_enabled => Some(integration),
                    Ok(_) => None,
                    Err(e) => {
                        error!("Cannot reload integration {} for retry: {}", id, e);
                        None
                    }
                })
                .collect();
            if targets.is_empty() {
                break;
            }
        }

        let status = if finals.iter().any(|r| r.cancelled) {
            TaskStatus::Cancelled
        } else if finals.iter().all(|r| r.status == SyncLogStatus::Failed) {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        };

        Ok(RunReport {
            task_id: task_id.to_string(),
            entity_type: request.entity_type,
            status,
            attempts: attempt,
            results: finals,
        })
    }

    fn run_lock(&self, integration_id: &str, entity_type: EntityType) -> Arc<Mutex<()>> {
        self.run_locks
            .entry((integration_id.to_string(), entity_type))
            .or_default()
            .clone()
    }

    /// Runs one integration to a terminal state. Never fails: every error
    /// ends up on the returned result, the SyncLog and the event stream.
    async fn sync_integration(
        &self,
        task_id: &str,
        target: &Integration,
        request: &SyncRequest,
        cancel: &CancellationToken,
    ) -> IntegrationRunResult {
        let lock = self.run_lock(&target.id, request.entity_type);
        let _guard = lock.lock().await;
        let started = Instant::now();

        // Reload under the lock so the watermark reflects a run that just finished.
        let integration = match self.integrations.get_by_id(&target.id) {
            Ok(integration) => integration,
            Err(e) => return self.unstarted_failure(target, e, started),
        };

        let sync_type = request.sync_type.unwrap_or(if integration.last_sync_at.is_some() {
            SyncType::Incremental
        } else {
            SyncType::Full
        });
        let watermark = match (sync_type, request.entity_type) {
            (SyncType::Full, _) | (_, EntityType::Stock) => None,
            _ => integration.last_sync_at,
        };

        let log = SyncLog::new(
            integration.id.clone(),
            Some(task_id.to_string()),
            sync_type,
            request.entity_type,
        );
        let log = match self.sync_logs.create(log).await {
            Ok(log) => log,
            Err(e) => {
                error!("Cannot open sync log for '{}': {}", integration.name, e);
                self.record_outcome(
                    &integration.id,
                    IntegrationOutcome::SyncFailed {
                        at: chrono::Utc::now(),
                        error: e.to_string(),
                    },
                )
                .await;
                return self.unstarted_failure(&integration, e, started);
            }
        };

        self.record_outcome(
            &integration.id,
            IntegrationOutcome::SyncStarted {
                at: chrono::Utc::now(),
            },
        )
        .await;

        let ctx = RunContext::new(
            task_id,
            integration.id.clone(),
            integration.name.clone(),
            request.entity_type,
            sync_type,
            log.id.clone(),
            Arc::clone(&self.events),
        );
        ctx.started();
        info!(
            "Syncing {} for '{}' ({}, since {:?})",
            request.entity_type,
            integration.name,
            sync_type.as_str(),
            watermark
        );

        let mut run = RunState::default();
        let outcome = match self.clients.client_for(&integration) {
            Ok(client) => {
                let outcome = match request.entity_type {
                    EntityType::Nomenclature => {
                        self.pull_nomenclature(
                            client.as_ref(),
                            &integration,
                            watermark,
                            &ctx,
                            &mut run,
                            cancel,
                        )
                        .await
                    }
                    EntityType::Stock => {
                        self.pull_stock(client.as_ref(), &integration, &ctx, &mut run, cancel)
                            .await
                    }
                };
                client.close().await;
                outcome
            }
            Err(e) => Err(e),
        };

        self.finish_integration(&integration, log, &ctx, run, outcome, started)
            .await
    }

    async fn finish_integration(
        &self,
        integration: &Integration,
        mut log: SyncLog,
        ctx: &RunContext,
        run: RunState,
        outcome: Result<Flow>,
        started: Instant,
    ) -> IntegrationRunResult {
        let counters = run.final_counters();
        let now = chrono::Utc::now();

        let (status, error, error_kind, cancelled) = match outcome {
            Ok(Flow::Finished) => {
                log.complete(counters, &run.record_errors);
                self.record_outcome(
                    &integration.id,
                    IntegrationOutcome::SyncSucceeded {
                        at: now,
                        response_time_ms: run.avg_latency_ms(),
                    },
                )
                .await;
                info!(
                    "Synced {} for '{}': {} processed, {} created, {} updated, {} failed",
                    ctx.entity_type,
                    integration.name,
                    counters.processed,
                    counters.created,
                    counters.updated,
                    counters.failed
                );
                (SyncLogStatus::Completed, None, None, false)
            }
            Ok(Flow::Cancelled) => {
                let message = "Sync cancelled".to_string();
                log.fail(counters, message.clone(), &run.record_errors);
                self.record_outcome(&integration.id, IntegrationOutcome::SyncCancelled { at: now })
                    .await;
                info!("Sync of '{}' cancelled", integration.name);
                (SyncLogStatus::Failed, Some(message), None, true)
            }
            Err(e) => {
                let kind = e.kind();
                let message = e.to_string();
                log.fail(counters, message.clone(), &run.record_errors);
                self.record_outcome(
                    &integration.id,
                    IntegrationOutcome::SyncFailed {
                        at: now,
                        error: message.clone(),
                    },
                )
                .await;
                error!(
                    "Sync of {} for '{}' failed ({:?}): {}",
                    ctx.entity_type, integration.name, kind, message
                );
                (SyncLogStatus::Failed, Some(message), Some(kind), false)
            }
        };

        let duration_secs = started.elapsed().as_secs_f64();
        let log_id = log.id.clone();
        if let Err(e) = self.sync_logs.finalize(log).await {
            error!("Cannot finalize sync log {}: {}", log_id, e);
        }

        // Terminal event goes out after the log and counters are written.
        match (&status, &error) {
            (SyncLogStatus::Completed, _) => {
                let summary = (!run.record_errors.is_empty())
                    .then(|| format!("{} record(s) failed", run.record_errors.len()));
                ctx.completed(&counters, summary, duration_secs);
            }
            (_, Some(message)) => {
                ctx.failed(message, error_kind.unwrap_or(ErrorKind::RunFatal), &counters)
            }
            _ => {}
        }

        IntegrationRunResult {
            integration_id: integration.id.clone(),
            integration_name: integration.name.clone(),
            sync_log_id: Some(log_id),
            status,
            counters,
            record_errors: run.record_errors,
            error,
            error_kind,
            cancelled,
            duration_secs,
        }
    }

    fn unstarted_failure(
        &self,
        integration: &Integration,
        error: Error,
        started: Instant,
    ) -> IntegrationRunResult {
        IntegrationRunResult {
            integration_id: integration.id.clone(),
            integration_name: integration.name.clone(),
            sync_log_id: None,
            status: SyncLogStatus::Failed,
            counters: SyncCounters::default(),
            record_errors: Vec::new(),
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
            cancelled: false,
            duration_secs: started.elapsed().as_secs_f64(),
        }
    }

    async fn record_outcome(&self, integration_id: &str, outcome: IntegrationOutcome) {
        if let Err(e) = self.integrations.record_outcome(integration_id, outcome).await {
            error!(
                "Cannot update runtime state of integration {}: {}",
                integration_id, e
            );
        }
    }

    async fn pull_nomenclature(
        &self,
        client: &dyn OneCApi,
        integration: &Integration,
        watermark: Option<chrono::DateTime<chrono::Utc>>,
        ctx: &RunContext,
        run: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<Flow> {
        let settings = integration.settings;
        let mut offset: u32 = 0;
        let mut last_page_first_id: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Ok(Flow::Cancelled);
            }
            if run.pages >= self.config.max_pages {
                return Err(SyncError::TooManyPages(self.config.max_pages).into());
            }

            let started = Instant::now();
            let page = client
                .fetch_nomenclature(NomenclatureQuery {
                    updated_since: watermark,
                    limit: settings.page_size,
                    offset,
                })
                .await?;
            run.record_latency(started);
            run.pages += 1;
            if page.total.is_some() {
                run.expected_total = page.total;
            }

            debug!(
                "Fetched {} products for '{}' (offset {}, total {:?}, has_more {})",
                page.items.len(),
                integration.name,
                offset,
                page.total,
                page.has_more
            );

            if let Some(first) = page.items.first() {
                if offset > 0 && last_page_first_id.as_deref() == Some(first.id.as_str()) {
                    return Err(SyncError::PaginationStuck(offset).into());
                }
                last_page_first_id = Some(first.id.clone());
            }

            let fetched = page.items.len() as u32;
            let has_more = page.has_more;
            if self
                .apply_page::<Products>(integration, page.items, ctx, run, cancel)
                .await?
                == Flow::Cancelled
            {
                return Ok(Flow::Cancelled);
            }
            self.report_progress(ctx, run, settings.progress_every, true);

            if !has_more {
                break;
            }
            if fetched == 0 {
                warn!(
                    "'{}' reported more pages but returned none at offset {}",
                    integration.name, offset
                );
                break;
            }
            offset += fetched;
        }

        Ok(Flow::Finished)
    }

    async fn pull_stock(
        &self,
        client: &dyn OneCApi,
        integration: &Integration,
        ctx: &RunContext,
        run: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<Flow> {
        if cancel.is_cancelled() {
            return Ok(Flow::Cancelled);
        }

        let started = Instant::now();
        let page = client.fetch_stock(StockQuery::default()).await?;
        run.record_latency(started);
        run.pages = 1;
        run.expected_total = page.total;
        debug!(
            "Fetched {} stock rows for '{}'",
            page.items.len(),
            integration.name
        );

        let flow = self
            .apply_page::<Stock>(integration, page.items, ctx, run, cancel)
            .await?;
        if flow == Flow::Finished {
            self.report_progress(ctx, run, integration.settings.progress_every, true);
        }
        Ok(flow)
    }

    /// Reconciles one fetched page and commits it in bounded batches.
    async fn apply_page<E: EntityPipeline>(
        &self,
        integration: &Integration,
        items: Vec<E::Remote>,
        ctx: &RunContext,
        run: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<Flow> {
        let keys: Vec<E::Key> = items.iter().map(E::key).collect();
        let mut known = E::load(self.catalog.as_ref(), &integration.id, &keys)?;
        let batch_size = integration.settings.batch_size.max(1);
        let mut batch: Vec<RecordChange<E::Key, E::Fields>> = Vec::with_capacity(batch_size);

        let every = integration.settings.progress_every;
        for remote in items {
            run.fetched += 1;
            let key = E::key(&remote);
            if let Err(message) = E::validate(&remote) {
                run.record_failure(&key, message);
                self.report_progress(ctx, run, every, false);
                continue;
            }

            let existing = known.get(&key);
            let existing_version = existing.map(|state| state.sync_version);
            let decision = E::decide(existing, &remote);
            let next_version = decision.next_version(existing_version);
            let (action, fields) = match decision {
                Decision::Skip => {
                    run.counters.processed += 1;
                    self.report_progress(ctx, run, every, false);
                    continue;
                }
                Decision::Create(fields) => (ChangeAction::Created, fields),
                Decision::Update(fields) => (ChangeAction::Updated, fields),
            };

            // Later duplicates in this run compare against the proposed state.
            known.insert(
                key.clone(),
                RecordState {
                    fields: fields.clone(),
                    sync_version: next_version.unwrap_or(1),
                },
            );
            batch.push(RecordChange {
                key,
                action,
                fields,
            });
            run.queued += 1;

            if batch.len() >= batch_size
                && self
                    .commit_batch::<E>(integration, &mut batch, ctx, run, cancel)
                    .await
                    == Flow::Cancelled
            {
                return Ok(Flow::Cancelled);
            }
            self.report_progress(ctx, run, every, false);
        }

        if !batch.is_empty() {
            return Ok(self
                .commit_batch::<E>(integration, &mut batch, ctx, run, cancel)
                .await);
        }
        Ok(Flow::Finished)
    }

    /// Commits one batch. A failed commit fails every record of the batch;
    /// earlier batches stay committed.
    async fn commit_batch<E: EntityPipeline>(
        &self,
        integration: &Integration,
        batch: &mut Vec<RecordChange<E::Key, E::Fields>>,
        ctx: &RunContext,
        run: &mut RunState,
        cancel: &CancellationToken,
    ) -> Flow {
        if cancel.is_cancelled() {
            run.queued -= batch.len() as i64;
            batch.clear();
            return Flow::Cancelled;
        }

        let changes = std::mem::take(batch);
        run.queued -= changes.len() as i64;
        let keys: Vec<E::Key> = changes.iter().map(|c| c.key.clone()).collect();
        let fields: HashMap<E::Key, E::Fields> = changes
            .iter()
            .map(|c| (c.key.clone(), c.fields.clone()))
            .collect();

        match E::commit(self.catalog.as_ref(), &integration.id, changes).await {
            Ok(outcome) => {
                for applied in &outcome.applied {
                    run.record_applied(applied.action);
                    if let Some(fields) = fields.get(&applied.key) {
                        E::announce(ctx, applied, fields);
                    }
                }
                for failed in outcome.failed {
                    run.record_failure(&failed.key, failed.message);
                }
            }
            Err(e) => {
                error!(
                    "Batch of {} record(s) for '{}' failed to commit: {}",
                    keys.len(),
                    integration.name,
                    e
                );
                let message = e.to_string();
                for key in keys {
                    run.record_failure(&key, &message);
                }
            }
        }

        Flow::Finished
    }

    /// Emits `sync-progress` once `every` more records were handled, and at
    /// the end of each page when anything changed since the last report.
    /// Queued changes count as processed until their batch commits.
    fn report_progress(&self, ctx: &RunContext, run: &mut RunState, every: usize, page_end: bool) {
        let done = run.handled();
        if done == run.last_progress {
            return;
        }
        if page_end || done - run.last_progress >= every.max(1) as i64 {
            let snapshot = SyncCounters {
                processed: run.counters.processed + run.queued,
                ..run.counters
            };
            ctx.progress(&snapshot, run.expected_total, run.pages);
            run.last_progress = done;
        }
    }
}
