//! Target-system collaborators for aging runs.
//!
//! - [`MemoryTarget`]: simulated platform kept in process memory
//! - [`RestTarget`]: thin HTTP/JSON client for a real platform

pub mod memory;
pub mod rest;

pub use memory::{MemoryTarget, MemoryTargetOptions};
pub use rest::RestTarget;
