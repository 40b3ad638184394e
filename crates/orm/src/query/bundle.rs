//! Bundle Query - Query restricted to one bundle of an entity type

use std::ops::{Deref, DerefMut};

use crate::conditions::Condition;
use crate::record::BUNDLE_FIELD;

use super::builder::Query;

/// A [`Query`] with a base condition pinning the bundle
#[derive(Debug, Clone, PartialEq)]
pub struct BundleQuery {
    query: Query,
    bundle: String,
}

impl BundleQuery {
    pub fn new(entity_type: impl Into<String>, bundle: impl Into<String>) -> Self {
        let bundle = bundle.into();
        let mut query = Query::new(entity_type);
        query.add_base_condition(Condition::eq(BUNDLE_FIELD, bundle.clone()));
        Self { query, bundle }
    }

    pub fn bundle(&self) -> &str {
        &self.bundle
    }

    pub fn into_query(self) -> Query {
        self.query
    }
}

impl Deref for BundleQuery {
    type Target = Query;

    fn deref(&self) -> &Query {
        &self.query
    }
}

impl DerefMut for BundleQuery {
    fn deref_mut(&mut self) -> &mut Query {
        &mut self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::Operator;
    use crate::record::{MemoryRecordStore, Predicate};
    use serde_json::json;

    #[test]
    fn test_bundle_is_a_base_condition() {
        let store = MemoryRecordStore::new();
        let mut query = BundleQuery::new("node", "article");
        query.set_condition_logic("OR(1)").add_condition(Condition::eq("title", "x"));

        let built = query.build(&store).unwrap();
        assert_eq!(
            built.root().predicates()[0],
            Predicate::Compare {
                field: BUNDLE_FIELD.to_string(),
                operator: Operator::Equal,
                value: json!("article"),
            }
        );
        assert_eq!(query.bundle(), "article");
    }
}
