//! Relationships Module - declared edges of the model graph
//!
//! - `types`: the four relationship kinds and their metadata
//! - `registry`: model type descriptors and memoised counterpart resolution
//! - `resolver`: batched relationship fetching with inverse wiring

pub mod registry;
pub(crate) mod resolver;
pub mod types;

pub use registry::{ForeignKey, ModelRegistry, ModelRegistryBuilder, ModelType, ResolvedRelationship, Validator};
pub use types::*;
