//! Operation and entity catalog for aging workloads
//!
//! Workers draw an (operation, entity) pair from the catalog on every
//! iteration and ask it for synthetic payloads when they create or update
//! records.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

const PRODUCT_CATEGORIES: [&str; 3] = ["raw", "component", "finished"];
const PRODUCT_UNITS: [&str; 3] = ["pcs", "box", "kg"];

/// JSON body sent to the target system on create/update.
pub type Payload = Value;

/// CRUD operation kinds exercised by workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl OperationKind {
    /// All operation kinds in declaration order.
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Create,
        OperationKind::Read,
        OperationKind::Update,
        OperationKind::Delete,
        OperationKind::List,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business entity kinds managed by the target platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Partner,
    Product,
    Goods,
    Stockin,
    Stockout,
}

impl EntityKind {
    /// All entity kinds in declaration order.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Partner,
        EntityKind::Product,
        EntityKind::Goods,
        EntityKind::Stockin,
        EntityKind::Stockout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Partner => "partner",
            Self::Product => "product",
            Self::Goods => "goods",
            Self::Stockin => "stockin",
            Self::Stockout => "stockout",
        }
    }

    /// Collection path segment used by REST-style targets
    pub fn resource_path(&self) -> &'static str {
        match self {
            Self::Partner => "partners",
            Self::Product => "products",
            Self::Goods => "goods",
            Self::Stockin => "stockins",
            Self::Stockout => "stockouts",
        }
    }

    fn code_prefix(&self) -> &'static str {
        match self {
            Self::Partner => "PT",
            Self::Product => "PD",
            Self::Goods => "GD",
            Self::Stockin => "SI",
            Self::Stockout => "SO",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation mix defines the share of each operation kind (0.0-1.0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationMix {
    pub create_pct: f64,
    pub read_pct: f64,
    pub update_pct: f64,
    pub delete_pct: f64,
    pub list_pct: f64,
}

impl Default for OperationMix {
    fn default() -> Self {
        Self::uniform()
    }
}

impl OperationMix {
    /// Every operation kind equally likely
    pub fn uniform() -> Self {
        Self {
            create_pct: 0.2,
            read_pct: 0.2,
            update_pct: 0.2,
            delete_pct: 0.2,
            list_pct: 0.2,
        }
    }

    /// Create-heavy mix that grows the dataset quickly
    pub fn write_heavy() -> Self {
        Self {
            create_pct: 0.5,
            read_pct: 0.2,
            update_pct: 0.15,
            delete_pct: 0.05,
            list_pct: 0.1,
        }
    }

    /// Read-heavy mix with a slowly growing dataset
    pub fn read_heavy() -> Self {
        Self {
            create_pct: 0.1,
            read_pct: 0.5,
            update_pct: 0.1,
            delete_pct: 0.05,
            list_pct: 0.25,
        }
    }

    fn weights(&self) -> [f64; 5] {
        [
            self.create_pct,
            self.read_pct,
            self.update_pct,
            self.delete_pct,
            self.list_pct,
        ]
    }

    /// Validate that every share is within 0.0-1.0 and they sum to 1.0
    pub fn validate(&self) -> Result<(), String> {
        let weights = self.weights();
        if let Some(bad) = weights.iter().find(|w| !(0.0..=1.0).contains(*w)) {
            return Err(format!("Operation share {} is outside 0.0-1.0", bad));
        }

        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 0.01 {
            return Err(format!("Operation shares sum to {}, expected 1.0", sum));
        }

        Ok(())
    }

    /// Map a roll in [0, 1) onto an operation kind
    pub fn choose(&self, roll: f64) -> OperationKind {
        let mut cumulative = 0.0;
        for (kind, weight) in OperationKind::ALL.iter().zip(self.weights()) {
            cumulative += weight;
            if roll < cumulative {
                return *kind;
            }
        }
        OperationKind::List
    }
}

/// Random operation/entity selection and payload generation
#[derive(Debug, Clone, Default)]
pub struct OperationCatalog {
    mix: OperationMix,
}

impl OperationCatalog {
    pub fn new(mix: OperationMix) -> Self {
        Self { mix }
    }

    pub fn mix(&self) -> &OperationMix {
        &self.mix
    }

    pub fn random_operation(&self) -> OperationKind {
        self.random_operation_with(&mut rand::thread_rng())
    }

    pub fn random_operation_with<R: Rng + ?Sized>(&self, rng: &mut R) -> OperationKind {
        self.mix.choose(rng.gen::<f64>())
    }

    pub fn random_entity(&self) -> EntityKind {
        self.random_entity_with(&mut rand::thread_rng())
    }

    pub fn random_entity_with<R: Rng + ?Sized>(&self, rng: &mut R) -> EntityKind {
        EntityKind::ALL[rng.gen_range(0..EntityKind::ALL.len())]
    }

    /// Build a payload stamped with the current wall-clock time
    pub fn generate_payload(&self, entity: EntityKind, worker_id: usize) -> Payload {
        self.generate_payload_at(entity, worker_id, Utc::now())
    }

    /// Build a payload for `entity`; identical inputs give identical output.
    pub fn generate_payload_at(
        &self,
        entity: EntityKind,
        worker_id: usize,
        at: DateTime<Utc>,
    ) -> Payload {
        let millis = at.timestamp_millis();
        let seq = millis.rem_euclid(1_000_000) as u64;
        let code = format!("{}{:03}{}", entity.code_prefix(), worker_id, millis);
        let stamp = at.to_rfc3339();
        let variant = (seq % 3) as usize;

        match entity {
            EntityKind::Partner => json!({
                "code": code,
                "name": format!("Aging Partner {}-{}", worker_id, seq),
                "partner_type": if seq % 2 == 0 { "supplier" } else { "customer" },
                "contact": format!("contact-{}", worker_id),
                "phone": format!("1{:010}", seq * 7919 % 10_000_000_000),
                "address": format!("{} Soak Street, Unit {}", seq % 1000, worker_id),
                "created_by": format!("aging-worker-{}", worker_id),
                "created_at": stamp,
            }),
            EntityKind::Product => json!({
                "code": code,
                "name": format!("Aging Product {}-{}", worker_id, seq),
                "category": PRODUCT_CATEGORIES[variant],
                "unit": PRODUCT_UNITS[variant],
                "price": ((seq % 10_000) as f64) / 100.0 + 1.0,
                "created_by": format!("aging-worker-{}", worker_id),
                "created_at": stamp,
            }),
            EntityKind::Goods => json!({
                "code": code,
                "name": format!("Aging Goods {}-{}", worker_id, seq),
                "sku": format!("SKU-{:03}-{:06}", worker_id, seq),
                "barcode": format!("69{:011}", seq * 31 % 100_000_000_000),
                "spec": format!("{}x{}", seq % 50 + 1, seq % 20 + 1),
                "weight_kg": ((seq % 500) as f64) / 10.0 + 0.1,
                "created_by": format!("aging-worker-{}", worker_id),
                "created_at": stamp,
            }),
            EntityKind::Stockin | EntityKind::Stockout => json!({
                "code": code,
                "warehouse": format!("WH-{:02}", worker_id % 10),
                "goods_code": format!("{}{:03}{}", EntityKind::Goods.code_prefix(), worker_id, millis),
                "partner_code": format!("{}{:03}{}", EntityKind::Partner.code_prefix(), worker_id, millis),
                "quantity": seq % 100 + 1,
                "remark": format!("aging {} by worker {}", entity, worker_id),
                "created_by": format!("aging-worker-{}", worker_id),
                "created_at": stamp,
            }),
        }
    }
}
