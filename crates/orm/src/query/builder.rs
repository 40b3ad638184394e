//! Query Builder - Core query over one entity type

use indexmap::IndexMap;

use crate::conditions::{Condition, ConditionGroup};
use crate::error::OrmResult;
use crate::record::{PredicateGroup, Record, RecordId, RecordStore, StoreQuery};
use crate::session::Session;

use super::types::{Conjunction, SortDirection};

/// Query builder for fetching records of one entity type.
///
/// Base conditions are structural and always applied. Conditions are
/// combined either with the flat conjunction or with an explicit logic
/// expression, and each condition group is AND-ed in as its own block.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    entity_type: String,
    base_conditions: Vec<Condition>,
    conditions: Vec<Condition>,
    condition_logic: Option<String>,
    conjunction: Conjunction,
    condition_groups: Vec<ConditionGroup>,
    sort_orders: IndexMap<String, SortDirection>,
    range: Option<(usize, usize)>,
    access_policy: Option<String>,
    tags: Vec<String>,
}

impl Query {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            base_conditions: Vec::new(),
            conditions: Vec::new(),
            condition_logic: None,
            conjunction: Conjunction::default(),
            condition_groups: Vec::new(),
            sort_orders: IndexMap::new(),
            range: None,
            access_policy: None,
            tags: Vec::new(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Add a condition that caller-supplied logic can never bypass
    pub fn add_base_condition(&mut self, condition: Condition) -> &mut Self {
        self.base_conditions.push(condition);
        self
    }

    pub fn add_condition(&mut self, condition: Condition) -> &mut Self {
        self.conditions.push(condition);
        self
    }

    /// Combine conditions with a logic expression such as `OR(1,AND(2,3))`
    pub fn set_condition_logic(&mut self, logic: impl Into<String>) -> &mut Self {
        self.condition_logic = Some(logic.into());
        self
    }

    /// Conjunction used when no logic expression is set
    pub fn set_conjunction(&mut self, conjunction: Conjunction) -> &mut Self {
        self.conjunction = conjunction;
        self
    }

    pub fn add_condition_group(&mut self, group: ConditionGroup) -> &mut Self {
        self.condition_groups.push(group);
        self
    }

    /// Sort by a field; sorting by the same field again replaces its direction
    pub fn add_sort_order(&mut self, field: impl Into<String>, direction: SortDirection) -> &mut Self {
        self.sort_orders.insert(field.into(), direction);
        self
    }

    pub fn set_range(&mut self, start: usize, length: usize) -> &mut Self {
        self.range = Some((start, length));
        self
    }

    pub fn set_limit(&mut self, limit: usize) -> &mut Self {
        let start = self.range.map(|(start, _)| start).unwrap_or(0);
        self.range = Some((start, limit));
        self
    }

    pub fn clear_range(&mut self) -> &mut Self {
        self.range = None;
        self
    }

    /// Have the compiled query rewritten by the named access policy
    pub fn set_access_policy(&mut self, policy: impl Into<String>) -> &mut Self {
        self.access_policy = Some(policy.into());
        self
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) -> &mut Self {
        self.tags.push(tag.into());
        self
    }

    pub fn base_conditions(&self) -> &[Condition] {
        &self.base_conditions
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn condition_logic(&self) -> Option<&str> {
        self.condition_logic.as_deref()
    }

    pub fn conjunction(&self) -> Conjunction {
        self.conjunction
    }

    pub fn condition_groups(&self) -> &[ConditionGroup] {
        &self.condition_groups
    }

    pub fn sort_orders(&self) -> &IndexMap<String, SortDirection> {
        &self.sort_orders
    }

    pub fn range(&self) -> Option<(usize, usize)> {
        self.range
    }

    pub fn access_policy(&self) -> Option<&str> {
        self.access_policy.as_deref()
    }

    /// Copy the caller-controlled parts of another query onto this one.
    ///
    /// Base conditions and the entity type stay untouched.
    pub fn copy_from(&mut self, other: &Query) -> &mut Self {
        self.conditions.extend(other.conditions.iter().cloned());
        if other.condition_logic.is_some() {
            self.condition_logic = other.condition_logic.clone();
        }
        self.conjunction = other.conjunction;
        self.condition_groups
            .extend(other.condition_groups.iter().cloned());
        for (field, direction) in &other.sort_orders {
            self.sort_orders.insert(field.clone(), *direction);
        }
        if other.range.is_some() {
            self.range = other.range;
        }
        if other.access_policy.is_some() {
            self.access_policy = other.access_policy.clone();
        }
        self.tags.extend(other.tags.iter().cloned());
        self
    }

    /// Compile into a store-native query
    pub fn build(&self, store: &dyn RecordStore) -> OrmResult<StoreQuery> {
        let mut query = store.query(&self.entity_type);

        for condition in &self.base_conditions {
            condition.apply_on(query.root_mut())?;
        }

        if !self.conditions.is_empty() || self.condition_logic.is_some() {
            let mut group = ConditionGroup::with_conjunction(self.conjunction);
            for condition in &self.conditions {
                group.add_condition(condition.clone());
            }
            if let Some(logic) = &self.condition_logic {
                group.set_logic(logic.clone());
            }
            group.apply_conditions_on(query.root_mut())?;
        }

        for group in &self.condition_groups {
            let mut block = PredicateGroup::and();
            group.apply_conditions_on(&mut block)?;
            if !block.is_empty() {
                query.and_group(block);
            }
        }

        for (field, direction) in &self.sort_orders {
            query.sort(field, *direction);
        }
        if let Some((start, length)) = self.range {
            query.range(start, length);
        }
        if let Some(policy) = &self.access_policy {
            query.set_access_policy(policy);
        }
        for tag in &self.tags {
            query.add_tag(tag);
        }

        Ok(query)
    }

    /// Compile into a count-only store query; range and sorting are dropped
    pub fn build_count(&self, store: &dyn RecordStore) -> OrmResult<StoreQuery> {
        let mut query = self.build(store)?;
        query.count();
        Ok(query)
    }

    pub fn fetch_ids(&self, session: &Session) -> OrmResult<Vec<RecordId>> {
        let query = self.build(session.store())?;
        session.execute(&query)
    }

    /// Fetch the matching records in query order
    pub fn fetch(&self, session: &Session) -> OrmResult<Vec<Record>> {
        let ids = self.fetch_ids(session)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        session.store().load_multiple(&self.entity_type, &ids)
    }

    /// Fetch the first matching record
    pub fn fetch_single(&self, session: &Session) -> OrmResult<Option<Record>> {
        let mut single = self.clone();
        single.set_limit(1);
        Ok(single.fetch(session)?.into_iter().next())
    }

    /// Count all matching records, ignoring the range
    pub fn fetch_total_count(&self, session: &Session) -> OrmResult<usize> {
        let query = self.build_count(session.store())?;
        session.count(&query)
    }
}
