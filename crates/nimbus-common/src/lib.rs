//! Nimbus Common - Shared types, traits, and utilities
//!
//! This crate provides the foundational types used across all Nimbus components:
//! - Error taxonomy shared by the engine and every provider backend
//! - Allocation and resource records owned by the surrounding application
//! - Attribute store traits for dependency injection
//! - Project name sanitisation

pub mod attributes;
pub mod error;
pub mod memory;
pub mod model;
pub mod traits;
pub mod utils;

// Re-exports for convenience
pub use error::{NimbusError, OptionalExt, Result};
pub use memory::InMemoryStore;
pub use model::{
    Allocation, AllocationHandle, AllocationStatus, AttributeValue, Resource, ResourceKind,
};
pub use traits::{AllocationSource, AttributeStore};
pub use utils::{env_key, sanitize_project_name, unique_project_name};

/// Institution code recorded on allocations created by this plugin
pub const DEFAULT_INSTITUTION_CODE: &str = "N/A";
