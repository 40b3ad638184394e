//! Query Module - Fluent queries compiled into store-native predicate trees

pub mod access;
pub mod aggregate;
pub mod builder;
pub mod bundle;
pub mod model_query;
pub mod types;

pub use access::{AccessPolicy, FnAccessPolicy};
pub use aggregate::AggregateQuery;
pub use builder::Query;
pub use bundle::BundleQuery;
pub use model_query::{ModelQuery, MultiModelQuery, RelationshipQuery};
pub use types::*;
