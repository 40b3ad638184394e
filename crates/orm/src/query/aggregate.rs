//! Aggregate Query - grouped aggregates over the compiled predicate tree

use std::ops::{Deref, DerefMut};

use crate::error::OrmResult;
use crate::session::Session;

use super::builder::Query;
use super::types::{Aggregate, AggregateFunction, AggregateRow, Aggregation};

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    query: Query,
    aggregation: Aggregation,
}

impl AggregateQuery {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self::from_query(Query::new(entity_type))
    }

    /// Aggregate over the records an existing query matches
    pub fn from_query(query: Query) -> Self {
        Self {
            query,
            aggregation: Aggregation::default(),
        }
    }

    pub fn add_aggregate(
        &mut self,
        field: impl Into<String>,
        function: AggregateFunction,
        alias: impl Into<String>,
    ) -> &mut Self {
        self.aggregation.aggregates.push(Aggregate {
            field: field.into(),
            function,
            alias: alias.into(),
        });
        self
    }

    pub fn add_group_by(&mut self, field: impl Into<String>) -> &mut Self {
        self.aggregation.group_by.push(field.into());
        self
    }

    pub fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    /// One row per group, keyed by group field and aggregate alias
    pub fn fetch_rows(&self, session: &Session) -> OrmResult<Vec<AggregateRow>> {
        let query = self.query.build(session.store())?;
        session.aggregate(&query, &self.aggregation)
    }
}

impl Deref for AggregateQuery {
    type Target = Query;

    fn deref(&self) -> &Query {
        &self.query
    }
}

impl DerefMut for AggregateQuery {
    fn deref_mut(&mut self) -> &mut Query {
        &mut self.query
    }
}
