//! In-process simulated CRUD platform
//!
//! Used by tests and by dry runs of the CLI. Latency can grow with the
//! number of stored records, which lets a run exercise the degradation
//! detector without a real backend.

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use aging_core::{
    AgingError, AgingResult, Credentials, EntityClient, EntityId, EntityKind, EntityRegistry,
    ListFilter, OperationKind, Payload, SessionConnector,
};

/// Behavior knobs of the simulated platform
#[derive(Debug, Clone, Default)]
pub struct MemoryTargetOptions {
    /// Fixed latency added to every call
    pub latency: Duration,

    /// Extra latency per 1,000 stored records (all kinds)
    pub latency_per_thousand_records: Duration,

    /// Probability (0.0-1.0) that any call fails
    pub failure_rate: f64,

    /// Operation kinds that always fail
    pub failing_operations: HashSet<OperationKind>,

    /// Refuse every login
    pub reject_logins: bool,
}

type Tables = HashMap<EntityKind, BTreeMap<String, Value>>;

/// Simulated target holding records in memory
#[derive(Clone, Default)]
pub struct MemoryTarget {
    tables: Arc<RwLock<Tables>>,
    options: Arc<MemoryTargetOptions>,
    logins: Arc<AtomicU64>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: MemoryTargetOptions) -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            options: Arc::new(options),
            logins: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records stored for one entity kind
    pub fn count(&self, kind: EntityKind) -> usize {
        self.tables.read().get(&kind).map_or(0, BTreeMap::len)
    }

    /// Records stored across all kinds
    pub fn total_records(&self) -> usize {
        self.tables.read().values().map(BTreeMap::len).sum()
    }

    /// Successful logins so far
    pub fn login_count(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    fn client(&self, kind: EntityKind) -> MemoryEntityClient {
        MemoryEntityClient {
            kind,
            tables: Arc::clone(&self.tables),
            options: Arc::clone(&self.options),
        }
    }
}

#[async_trait]
impl SessionConnector for MemoryTarget {
    async fn connect(
        &self,
        credentials: &Credentials,
        worker_id: usize,
    ) -> AgingResult<EntityRegistry> {
        if self.options.reject_logins {
            return Err(AgingError::Authentication(format!(
                "login refused for `{}` (worker {})",
                credentials.username, worker_id
            )));
        }

        self.logins.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(worker_id, username = %credentials.username, "Memory target session opened");

        let mut registry = EntityRegistry::new();
        for kind in EntityKind::ALL {
            registry.register(kind, Arc::new(self.client(kind)));
        }
        Ok(registry)
    }
}

/// Entity client bound to one table of a [`MemoryTarget`]
struct MemoryEntityClient {
    kind: EntityKind,
    tables: Arc<RwLock<Tables>>,
    options: Arc<MemoryTargetOptions>,
}

impl MemoryEntityClient {
    /// Apply configured latency and failure injection for one call
    async fn simulate(&self, operation: OperationKind) -> AgingResult<()> {
        let delay = {
            let records = self.tables.read().values().map(BTreeMap::len).sum::<usize>();
            self.options.latency
                + self
                    .options
                    .latency_per_thousand_records
                    .mul_f64(records as f64 / 1000.0)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.options.failing_operations.contains(&operation) {
            return Err(AgingError::rejected(
                500,
                format!("{} {} disabled by test target", operation, self.kind),
            ));
        }

        let rate = self.options.failure_rate;
        if rate > 0.0 && rand::thread_rng().gen::<f64>() < rate {
            return Err(AgingError::Transport(format!(
                "injected failure on {} {}",
                operation, self.kind
            )));
        }

        Ok(())
    }

    fn missing(&self, id: &EntityId) -> AgingError {
        AgingError::not_found(self.kind.as_str(), id.as_str())
    }
}

#[async_trait]
impl EntityClient for MemoryEntityClient {
    async fn create(&self, payload: &Payload) -> AgingResult<EntityId> {
        self.simulate(OperationKind::Create).await?;

        let id = Uuid::new_v4().to_string();
        let mut record = payload.clone();
        if let Value::Object(fields) = &mut record {
            fields.insert("id".to_string(), json!(id));
        }

        self.tables
            .write()
            .entry(self.kind)
            .or_default()
            .insert(id.clone(), record);
        Ok(EntityId::new(id))
    }

    async fn read(&self, id: &EntityId) -> AgingResult<Value> {
        self.simulate(OperationKind::Read).await?;

        self.tables
            .read()
            .get(&self.kind)
            .and_then(|table| table.get(id.as_str()))
            .cloned()
            .ok_or_else(|| self.missing(id))
    }

    async fn update(&self, id: &EntityId, payload: &Payload) -> AgingResult<Value> {
        self.simulate(OperationKind::Update).await?;

        let mut tables = self.tables.write();
        let record = tables
            .get_mut(&self.kind)
            .and_then(|table| table.get_mut(id.as_str()))
            .ok_or_else(|| self.missing(id))?;

        let mut updated = payload.clone();
        if let Value::Object(fields) = &mut updated {
            fields.insert("id".to_string(), json!(id.as_str()));
        }
        *record = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: &EntityId) -> AgingResult<bool> {
        self.simulate(OperationKind::Delete).await?;

        Ok(self
            .tables
            .write()
            .get_mut(&self.kind)
            .and_then(|table| table.remove(id.as_str()))
            .is_some())
    }

    async fn list(&self, filter: &ListFilter) -> AgingResult<Vec<Value>> {
        self.simulate(OperationKind::List).await?;

        let skip = filter.page.saturating_sub(1) * filter.page_size;
        Ok(self
            .tables
            .read()
            .get(&self.kind)
            .map(|table| {
                table
                    .values()
                    .skip(skip)
                    .take(filter.page_size)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
