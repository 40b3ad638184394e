//! # elif-graph-orm: Relationship-graph ORM core for elif.rs
//!
//! Graph-navigable models over a generic record store: models connected by
//! declared relationships, lazy batched fetching with inverse wiring,
//! collection diffing for saves and deletes, polymorphic references, and a
//! positional AND/OR logic compiler for nested filter predicates.
//!
//! The crate never persists anything itself. It talks to a [`RecordStore`];
//! [`MemoryRecordStore`] is the in-process reference implementation.

pub mod collection;
pub mod conditions;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod record;
pub mod relationships;
pub mod session;

// Re-export core types
pub use collection::{Collection, TypeConstraint};
pub use conditions::*;
pub use config::OrmConfig;
pub use error::{OrmError, OrmResult};
pub use model::{Model, Related, Violation, ViolationList, NOT_BLANK_MESSAGE};
pub use query::{
    AccessPolicy, Aggregate, AggregateFunction, AggregateQuery, AggregateRow, Aggregation, BundleQuery, Conjunction,
    FnAccessPolicy, ModelQuery, MultiModelQuery, Query, RelationshipQuery, SortDirection,
};
pub use record::*;
pub use relationships::{
    Cardinality, ModelRegistry, ModelRegistryBuilder, ModelType, Relationship, RelationshipKind, RelationshipSide,
    RelationshipTarget, ResolvedRelationship,
};
pub use session::Session;
