//! Access policy hook
//!
//! Queries tagged with an access policy are handed to the matching policy
//! before execution. What a policy does with the query is up to it.

use std::fmt;

use crate::error::OrmResult;
use crate::record::StoreQuery;

/// Rewrites compiled store queries to enforce access rules
pub trait AccessPolicy: Send + Sync {
    /// Name queries refer to with `set_access_policy`
    fn name(&self) -> &str;

    /// Narrow the query to what the current principal may see
    fn rewrite(&self, query: &mut StoreQuery) -> OrmResult<()>;
}

impl fmt::Debug for dyn AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPolicy").field("name", &self.name()).finish()
    }
}

/// Access policy built from a closure
pub struct FnAccessPolicy<F> {
    name: String,
    rewrite: F,
}

impl<F> FnAccessPolicy<F>
where
    F: Fn(&mut StoreQuery) -> OrmResult<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, rewrite: F) -> Self {
        Self {
            name: name.into(),
            rewrite,
        }
    }
}

impl<F> AccessPolicy for FnAccessPolicy<F>
where
    F: Fn(&mut StoreQuery) -> OrmResult<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn rewrite(&self, query: &mut StoreQuery) -> OrmResult<()> {
        (self.rewrite)(query)
    }
}
