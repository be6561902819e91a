use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::catalog::{EntityKind, Payload};
use crate::error::{AgingError, AgingResult};

/// Identifier assigned by the target system to a created entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Login credentials handed to a [`SessionConnector`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Paging filter for list operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilter {
    /// 1-based page number.
    pub page: usize,
    /// Maximum number of records returned.
    pub page_size: usize,
}

impl ListFilter {
    pub fn first_page(page_size: usize) -> Self {
        Self { page: 1, page_size }
    }
}

/// CRUD surface of a single entity kind on the target system.
#[async_trait]
pub trait EntityClient: Send + Sync {
    /// Creates a record and returns the identifier assigned by the target.
    async fn create(&self, payload: &Payload) -> AgingResult<EntityId>;

    /// Fetches a record by identifier.
    async fn read(&self, id: &EntityId) -> AgingResult<Value>;

    /// Replaces a record's fields and returns the stored record.
    async fn update(&self, id: &EntityId, payload: &Payload) -> AgingResult<Value>;

    /// Deletes a record; `false` means the target refused or found nothing.
    async fn delete(&self, id: &EntityId) -> AgingResult<bool>;

    /// Lists one page of records.
    async fn list(&self, filter: &ListFilter) -> AgingResult<Vec<Value>>;
}

/// Authenticates a worker and hands back its entity clients.
///
/// Called once per worker before its loop starts; an error is fatal to
/// that worker only.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(
        &self,
        credentials: &Credentials,
        worker_id: usize,
    ) -> AgingResult<EntityRegistry>;
}

/// Interface table mapping each entity kind to its client.
#[derive(Clone, Default)]
pub struct EntityRegistry {
    clients: HashMap<EntityKind, Arc<dyn EntityClient>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the client for `kind`.
    pub fn register(&mut self, kind: EntityKind, client: Arc<dyn EntityClient>) -> &mut Self {
        self.clients.insert(kind, client);
        self
    }

    /// Builder-style variant of [`EntityRegistry::register`].
    pub fn with(mut self, kind: EntityKind, client: Arc<dyn EntityClient>) -> Self {
        self.register(kind, client);
        self
    }

    /// Returns the client for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` when no client was registered for the kind.
    pub fn client(&self, kind: EntityKind) -> AgingResult<&Arc<dyn EntityClient>> {
        self.clients.get(&kind).ok_or_else(|| {
            AgingError::invalid_state(format!("no client registered for entity `{}`", kind))
        })
    }

    pub fn contains(&self, kind: EntityKind) -> bool {
        self.clients.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.clients.keys().copied().collect();
        kinds.sort();
        f.debug_struct("EntityRegistry").field("kinds", &kinds).finish()
    }
}
