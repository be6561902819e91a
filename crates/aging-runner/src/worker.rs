//! Load worker: one logical client driving random operations

use aging_core::{
    AgingError, AgingResult, AgingTestConfig, Credentials, EntityClient, EntityId, EntityKind,
    EntityRegistry, ListFilter, OperationCatalog, OperationKind, PerformanceWindow,
    SessionConnector,
};
use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::metrics::{OperationResult, StatisticsSource, WorkerStatistics};

/// Worker lifecycle: Idle → Running → Stopping → Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

struct WorkerInner {
    state: WorkerState,
    results: Vec<OperationResult>,
    window: PerformanceWindow,
    created: HashMap<EntityKind, Vec<EntityId>>,
}

/// Logical client with its own session, result log and id cache.
///
/// All mutable state sits behind one lock so [`Worker::statistics`] always
/// sees results, window and cache from the same instant.
pub struct Worker {
    id: usize,
    config: Arc<AgingTestConfig>,
    catalog: Arc<OperationCatalog>,
    connector: Arc<dyn SessionConnector>,
    credentials: Arc<Credentials>,
    inner: Mutex<WorkerInner>,
}

impl Worker {
    pub fn new(
        id: usize,
        config: Arc<AgingTestConfig>,
        catalog: Arc<OperationCatalog>,
        connector: Arc<dyn SessionConnector>,
        credentials: Arc<Credentials>,
    ) -> Self {
        let window = PerformanceWindow::new(config.performance_window_size);
        Self {
            id,
            config,
            catalog,
            connector,
            credentials,
            inner: Mutex::new(WorkerInner {
                state: WorkerState::Idle,
                results: Vec::new(),
                window,
                created: HashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.inner.lock().state
    }

    fn set_state(&self, state: WorkerState) {
        self.inner.lock().state = state;
    }

    /// Log in and build the per-entity clients for this worker
    pub async fn connect(&self) -> AgingResult<EntityRegistry> {
        self.connector.connect(&self.credentials, self.id).await
    }

    /// Run until `stop` flips to true (or its sender goes away).
    ///
    /// A failed login ends the worker immediately; no operations are recorded.
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        self.set_state(WorkerState::Running);

        let registry = match self.connect().await {
            Ok(registry) => registry,
            Err(e) => {
                error!(worker_id = self.id, error = %e, "Worker initialization failed");
                self.set_state(WorkerState::Stopped);
                return;
            }
        };
        info!(worker_id = self.id, "Worker started");

        let interval = self.config.operation_interval();
        let backoff = self.config.failure_backoff();

        loop {
            if *stop.borrow() {
                break;
            }

            let result = self.execute_once(&registry).await;
            if !result.success && pause(backoff, &mut stop).await {
                break;
            }
            if pause(interval, &mut stop).await {
                break;
            }
        }

        self.set_state(WorkerState::Stopping);
        drop(registry);
        self.set_state(WorkerState::Stopped);

        let stats = self.statistics();
        info!(
            worker_id = self.id,
            total_operations = stats.total_operations,
            success_rate = stats.success_rate,
            "Worker stopped"
        );
    }

    /// Pick a random operation and entity and execute it
    pub async fn execute_once(&self, registry: &EntityRegistry) -> OperationResult {
        // thread_rng is not Send; keep it out of the await below
        let (operation, entity) = {
            let mut rng = rand::thread_rng();
            (
                self.catalog.random_operation_with(&mut rng),
                self.catalog.random_entity_with(&mut rng),
            )
        };
        self.execute(registry, operation, entity).await
    }

    /// Execute `operation` on `entity`, recording the outcome.
    ///
    /// Read, Update and Delete need a previously created id; with none cached
    /// for the entity the worker performs a Create instead, and the result
    /// reports Create.
    pub async fn execute(
        &self,
        registry: &EntityRegistry,
        operation: OperationKind,
        entity: EntityKind,
    ) -> OperationResult {
        let started = Instant::now();
        let (performed, outcome) = self.dispatch(registry, operation, entity).await;
        let duration_seconds = started.elapsed().as_secs_f64();

        if let Err(e) = &outcome {
            debug!(
                worker_id = self.id,
                operation = %performed,
                entity = %entity,
                error = %e,
                "Operation failed"
            );
        }

        let result = OperationResult {
            operation: performed,
            entity,
            success: outcome.is_ok(),
            duration_seconds,
            error_message: outcome.err().map(|e| e.to_string()),
            timestamp: Utc::now(),
        };

        let mut inner = self.inner.lock();
        inner.window.record(duration_seconds);
        inner.results.push(result.clone());
        result
    }

    async fn dispatch(
        &self,
        registry: &EntityRegistry,
        operation: OperationKind,
        entity: EntityKind,
    ) -> (OperationKind, AgingResult<()>) {
        let client = match registry.client(entity) {
            Ok(client) => client,
            Err(e) => return (operation, Err(e)),
        };

        let target = match operation {
            OperationKind::Read | OperationKind::Update | OperationKind::Delete => {
                self.pick_created(entity)
            }
            OperationKind::Create | OperationKind::List => None,
        };

        match (operation, target) {
            (OperationKind::List, _) => {
                let filter = ListFilter::first_page(self.config.list_page_size);
                (OperationKind::List, client.list(&filter).await.map(|_| ()))
            }
            (OperationKind::Read, Some(id)) => {
                (OperationKind::Read, client.read(&id).await.map(|_| ()))
            }
            (OperationKind::Update, Some(id)) => {
                let payload = self.catalog.generate_payload(entity, self.id);
                (
                    OperationKind::Update,
                    client.update(&id, &payload).await.map(|_| ()),
                )
            }
            (OperationKind::Delete, Some(id)) => {
                let outcome = match client.delete(&id).await {
                    Ok(true) => {
                        self.forget(entity, &id);
                        Ok(())
                    }
                    Ok(false) => Err(AgingError::invalid_state(format!(
                        "delete of {} `{}` was not acknowledged",
                        entity, id
                    ))),
                    Err(e) => Err(e),
                };
                (OperationKind::Delete, outcome)
            }
            _ => (OperationKind::Create, self.create(&**client, entity).await),
        }
    }

    async fn create(&self, client: &dyn EntityClient, entity: EntityKind) -> AgingResult<()> {
        let payload = self.catalog.generate_payload(entity, self.id);
        let id = client.create(&payload).await?;
        self.inner.lock().created.entry(entity).or_default().push(id);
        Ok(())
    }

    fn pick_created(&self, entity: EntityKind) -> Option<EntityId> {
        let inner = self.inner.lock();
        let ids = inner.created.get(&entity).filter(|ids| !ids.is_empty())?;
        let index = rand::thread_rng().gen_range(0..ids.len());
        Some(ids[index].clone())
    }

    fn forget(&self, entity: EntityKind, id: &EntityId) {
        if let Some(ids) = self.inner.lock().created.get_mut(&entity) {
            if let Some(pos) = ids.iter().position(|cached| cached == id) {
                ids.swap_remove(pos);
            }
        }
    }

    /// Ids this worker created and has not deleted
    pub fn created_ids(&self, entity: EntityKind) -> Vec<EntityId> {
        self.inner
            .lock()
            .created
            .get(&entity)
            .cloned()
            .unwrap_or_default()
    }

    /// Copy of every recorded result, oldest first
    pub fn results(&self) -> Vec<OperationResult> {
        self.inner.lock().results.clone()
    }

    /// Statistics computed under a single lock acquisition
    pub fn statistics(&self) -> WorkerStatistics {
        let inner = self.inner.lock();

        let total = inner.results.len() as u64;
        let successful = inner.results.iter().filter(|r| r.success).count() as u64;
        let durations = inner.results.iter().map(|r| r.duration_seconds);

        let (sum, min, max) = durations.fold(
            (0.0_f64, f64::INFINITY, 0.0_f64),
            |(sum, min, max), d| (sum + d, min.min(d), max.max(d)),
        );

        let entity_counts: BTreeMap<EntityKind, usize> = inner
            .created
            .iter()
            .map(|(kind, ids)| (*kind, ids.len()))
            .collect();
        let total_entities = entity_counts.values().sum();

        WorkerStatistics {
            worker_id: self.id,
            total_operations: total,
            successful_operations: successful,
            failed_operations: total - successful,
            success_rate: if total > 0 {
                successful as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            average_duration_seconds: if total > 0 { sum / total as f64 } else { 0.0 },
            min_duration_seconds: if total > 0 { min } else { 0.0 },
            max_duration_seconds: max,
            entity_counts,
            total_entities,
            degradation_percent: inner.window.degradation_percent(),
            baseline_seconds: inner.window.baseline(),
            current_mean_seconds: inner.window.current_mean(),
        }
    }
}

impl StatisticsSource for Worker {
    fn statistics(&self) -> WorkerStatistics {
        Worker::statistics(self)
    }
}

/// Sleep for `duration` unless stopped first; returns true when the worker
/// should exit.
async fn pause(duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    if duration.is_zero() {
        tokio::task::yield_now().await;
        return *stop.borrow();
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => *stop.borrow(),
        changed = stop.changed() => changed.is_err() || *stop.borrow(),
    }
}
