//! Configuration
//!
//! YAML rig configuration: schema, loading and validation.

pub mod duration;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLoader, LoadResult, load_or_default};
pub use schema::{HardwareConfig, PersistenceConfig, RigConfig};
pub use validation::{ValidationResult, Validator};
