//! Store-native query: predicate tree, sorting, range and tags

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conditions::Operator;
use crate::query::{Conjunction, SortDirection};

/// Tag carried by queries that must be rewritten by an access policy
pub const ACCESS_POLICY_TAG: &str = "access_policy";

/// One node of a store predicate tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Compare {
        field: String,
        operator: Operator,
        value: Value,
    },
    NotExists {
        field: String,
    },
    Group(PredicateGroup),
}

/// A conjunction of predicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateGroup {
    conjunction: Conjunction,
    predicates: Vec<Predicate>,
}

impl PredicateGroup {
    pub fn new(conjunction: Conjunction) -> Self {
        Self {
            conjunction,
            predicates: Vec::new(),
        }
    }

    pub fn and() -> Self {
        Self::new(Conjunction::And)
    }

    pub fn or() -> Self {
        Self::new(Conjunction::Or)
    }

    /// Add a single predicate
    pub fn condition(&mut self, field: &str, operator: Operator, value: Value) -> &mut Self {
        self.predicates.push(Predicate::Compare {
            field: field.to_string(),
            operator,
            value,
        });
        self
    }

    /// Add a "field does not exist" predicate
    pub fn not_exists(&mut self, field: &str) -> &mut Self {
        self.predicates.push(Predicate::NotExists {
            field: field.to_string(),
        });
        self
    }

    /// Add a nested group
    pub fn add_group(&mut self, group: PredicateGroup) -> &mut Self {
        self.predicates.push(Predicate::Group(group));
        self
    }

    pub fn conjunction(&self) -> Conjunction {
        self.conjunction
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }
}

/// A compiled query ready to be executed by a record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreQuery {
    entity_type: String,
    root: PredicateGroup,
    sorts: Vec<(String, SortDirection)>,
    range: Option<(usize, usize)>,
    count_only: bool,
    tags: BTreeSet<String>,
    access_policy: Option<String>,
}

impl StoreQuery {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            root: PredicateGroup::and(),
            sorts: Vec::new(),
            range: None,
            count_only: false,
            tags: BTreeSet::new(),
            access_policy: None,
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn root(&self) -> &PredicateGroup {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut PredicateGroup {
        &mut self.root
    }

    pub fn condition(&mut self, field: &str, operator: Operator, value: Value) -> &mut Self {
        self.root.condition(field, operator, value);
        self
    }

    pub fn not_exists(&mut self, field: &str) -> &mut Self {
        self.root.not_exists(field);
        self
    }

    pub fn and_group(&mut self, group: PredicateGroup) -> &mut Self {
        debug_assert_eq!(group.conjunction(), Conjunction::And);
        self.root.add_group(group);
        self
    }

    pub fn or_group(&mut self, group: PredicateGroup) -> &mut Self {
        debug_assert_eq!(group.conjunction(), Conjunction::Or);
        self.root.add_group(group);
        self
    }

    pub fn sort(&mut self, field: &str, direction: SortDirection) -> &mut Self {
        self.sorts.push((field.to_string(), direction));
        self
    }

    pub fn sorts(&self) -> &[(String, SortDirection)] {
        &self.sorts
    }

    pub fn range(&mut self, start: usize, length: usize) -> &mut Self {
        self.range = Some((start, length));
        self
    }

    pub fn get_range(&self) -> Option<(usize, usize)> {
        self.range
    }

    /// Turn this query into a count-only query; range and sorting are dropped
    pub fn count(&mut self) -> &mut Self {
        self.count_only = true;
        self.range = None;
        self.sorts.clear();
        self
    }

    pub fn is_count(&self) -> bool {
        self.count_only
    }

    pub fn add_tag(&mut self, tag: &str) -> &mut Self {
        self.tags.insert(tag.to_string());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Tag this query for rewriting by the named access policy
    pub fn set_access_policy(&mut self, policy: &str) -> &mut Self {
        self.add_tag(ACCESS_POLICY_TAG);
        self.access_policy = Some(policy.to_string());
        self
    }

    pub fn access_policy(&self) -> Option<&str> {
        self.access_policy.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_and_subgroups() {
        let mut query = StoreQuery::new("order");
        let mut either = PredicateGroup::or();
        either
            .condition("status", Operator::Equal, json!("open"))
            .not_exists("status");
        query
            .condition("total", Operator::GreaterThan, json!(10))
            .or_group(either)
            .sort("total", SortDirection::Desc)
            .range(0, 5);

        assert_eq!(query.root().len(), 2);
        assert_eq!(query.sorts().len(), 1);
        assert_eq!(query.get_range(), Some((0, 5)));
    }

    #[test]
    fn test_count_drops_range_and_sorts() {
        let mut query = StoreQuery::new("order");
        query.sort("total", SortDirection::Asc).range(10, 10).count();
        assert!(query.is_count());
        assert_eq!(query.get_range(), None);
        assert!(query.sorts().is_empty());
    }

    #[test]
    fn test_access_policy_tag() {
        let mut query = StoreQuery::new("order");
        query.set_access_policy("own_orders");
        assert!(query.has_tag(ACCESS_POLICY_TAG));
        assert_eq!(query.access_policy(), Some("own_orders"));
    }
}
