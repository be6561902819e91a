//! Core domain types and traits for aging (soak) load tests.

pub mod catalog;
pub mod config;
pub mod error;
pub mod traits;
pub mod window;

pub use catalog::{EntityKind, OperationCatalog, OperationKind, OperationMix, Payload};
pub use config::{AgingTestConfig, LoggingConfig, ReportConfig, Settings, TargetConfig, TargetKind};
pub use error::{AgingError, AgingResult};
pub use traits::{Credentials, EntityClient, EntityId, EntityRegistry, ListFilter, SessionConnector};
pub use window::PerformanceWindow;
