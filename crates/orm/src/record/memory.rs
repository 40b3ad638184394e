//! In-memory record store
//!
//! Evaluates store predicate trees directly against records held in memory.
//! Ids are sequential integers rendered as strings. Every call is counted so
//! callers can observe how many queries, saves and deletes a unit of work
//! issued.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use serde_json::{Number, Value};

use crate::conditions::Operator;
use crate::error::{OrmError, OrmResult};
use crate::query::{AggregateFunction, AggregateRow, Aggregation, Conjunction, SortDirection};

use super::predicate::{Predicate, PredicateGroup, StoreQuery};
use super::{Record, RecordId, RecordStore};

/// Snapshot of the operations a memory store has served
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    pub queries: usize,
    pub counts: usize,
    pub aggregates: usize,
    pub loads: usize,
    pub saves: usize,
    pub deletes: usize,
}

#[derive(Debug, Default)]
struct Counters {
    queries: AtomicUsize,
    counts: AtomicUsize,
    aggregates: AtomicUsize,
    loads: AtomicUsize,
    saves: AtomicUsize,
    deletes: AtomicUsize,
}

/// Record store keeping everything in process memory
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<IndexMap<String, IndexMap<RecordId, Record>>>,
    next_id: AtomicU64,
    counters: Counters,
    deleted: RwLock<Vec<(String, RecordId)>>,
    executed: RwLock<Vec<StoreQuery>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record directly, bypassing the statistics
    pub fn seed(&self, record: Record) -> OrmResult<RecordId> {
        self.store(record)
    }

    pub fn stats(&self) -> MemoryStoreStats {
        let c = &self.counters;
        MemoryStoreStats {
            queries: c.queries.load(AtomicOrdering::Relaxed),
            counts: c.counts.load(AtomicOrdering::Relaxed),
            aggregates: c.aggregates.load(AtomicOrdering::Relaxed),
            loads: c.loads.load(AtomicOrdering::Relaxed),
            saves: c.saves.load(AtomicOrdering::Relaxed),
            deletes: c.deletes.load(AtomicOrdering::Relaxed),
        }
    }

    /// Every `(entity_type, id)` deleted so far, in order
    pub fn deleted(&self) -> Vec<(String, RecordId)> {
        self.deleted
            .read()
            .map(|deleted| deleted.clone())
            .unwrap_or_default()
    }

    /// Every query executed or counted so far, in order
    pub fn executed_queries(&self) -> Vec<StoreQuery> {
        self.executed
            .read()
            .map(|executed| executed.clone())
            .unwrap_or_default()
    }

    /// Number of stored records of an entity type
    pub fn len(&self, entity_type: &str) -> usize {
        self.records
            .read()
            .map(|records| records.get(entity_type).map_or(0, IndexMap::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, entity_type: &str) -> bool {
        self.len(entity_type) == 0
    }

    /// Store a record, allocating an id when it has none.
    ///
    /// Numeric ids supplied by the caller advance the sequence, and an
    /// allocated id never lands on a record that already exists.
    fn store(&self, mut record: Record) -> OrmResult<RecordId> {
        let mut records = self.write_records()?;
        let by_id = records.entry(record.entity_type().to_string()).or_default();
        let id = match record.id() {
            Some(id) => {
                if let Ok(numeric) = id.parse::<u64>() {
                    self.next_id.fetch_max(numeric, AtomicOrdering::SeqCst);
                }
                id.to_string()
            }
            None => loop {
                let candidate = self.allocate_id();
                if !by_id.contains_key(&candidate) {
                    break candidate;
                }
            },
        };
        record.set_id(id.clone());
        by_id.insert(id.clone(), record);
        Ok(id)
    }

    fn allocate_id(&self) -> RecordId {
        (self.next_id.fetch_add(1, AtomicOrdering::SeqCst) + 1).to_string()
    }

    fn read_records(&self) -> OrmResult<RwLockReadGuard<'_, IndexMap<String, IndexMap<RecordId, Record>>>> {
        self.records
            .read()
            .map_err(|_| OrmError::Store("memory store lock poisoned".to_string()))
    }

    fn write_records(&self) -> OrmResult<RwLockWriteGuard<'_, IndexMap<String, IndexMap<RecordId, Record>>>> {
        self.records
            .write()
            .map_err(|_| OrmError::Store("memory store lock poisoned".to_string()))
    }

    fn log_query(&self, query: &StoreQuery) {
        if let Ok(mut executed) = self.executed.write() {
            executed.push(query.clone());
        }
    }

    fn matching(&self, query: &StoreQuery) -> OrmResult<Vec<Record>> {
        let records = self.read_records()?;
        let mut matched: Vec<Record> = records
            .get(query.entity_type())
            .map(|by_id| {
                by_id
                    .values()
                    .filter(|record| matches_group(record, query.root()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if !query.sorts().is_empty() {
            matched.sort_by(|a, b| {
                for (field, direction) in query.sorts() {
                    let ordering = compare_first(a, b, field);
                    let ordering = match direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        Ok(matched)
    }
}

impl RecordStore for MemoryRecordStore {
    fn load(&self, entity_type: &str, id: &str) -> OrmResult<Option<Record>> {
        self.counters.loads.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(self
            .read_records()?
            .get(entity_type)
            .and_then(|by_id| by_id.get(id))
            .cloned())
    }

    fn load_multiple(&self, entity_type: &str, ids: &[RecordId]) -> OrmResult<Vec<Record>> {
        self.counters.loads.fetch_add(1, AtomicOrdering::Relaxed);
        let records = self.read_records()?;
        let Some(by_id) = records.get(entity_type) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| by_id.get(id)).cloned().collect())
    }

    fn execute(&self, query: &StoreQuery) -> OrmResult<Vec<RecordId>> {
        if query.is_count() {
            return Err(OrmError::Store(
                "count queries must be run through count()".to_string(),
            ));
        }
        self.counters.queries.fetch_add(1, AtomicOrdering::Relaxed);
        self.log_query(query);

        let matched = self.matching(query)?;
        let ids = matched.iter().filter_map(|record| record.id().map(str::to_string));
        Ok(match query.get_range() {
            Some((start, length)) => ids.skip(start).take(length).collect(),
            None => ids.collect(),
        })
    }

    fn count(&self, query: &StoreQuery) -> OrmResult<usize> {
        self.counters.counts.fetch_add(1, AtomicOrdering::Relaxed);
        self.log_query(query);
        Ok(self.matching(query)?.len())
    }

    fn aggregate(&self, query: &StoreQuery, aggregation: &Aggregation) -> OrmResult<Vec<AggregateRow>> {
        self.counters.aggregates.fetch_add(1, AtomicOrdering::Relaxed);
        self.log_query(query);

        let mut groups: IndexMap<Vec<String>, (Vec<Value>, Vec<Record>)> = IndexMap::new();
        for record in self.matching(query)? {
            let key_values: Vec<Value> = aggregation
                .group_by
                .iter()
                .map(|field| record.values_at(field).into_iter().next().unwrap_or(Value::Null))
                .collect();
            let key = key_values.iter().map(|v| v.to_string()).collect();
            groups
                .entry(key)
                .or_insert_with(|| (key_values, Vec::new()))
                .1
                .push(record);
        }

        let mut rows = Vec::with_capacity(groups.len());
        for (_, (key_values, records)) in groups {
            let mut row = AggregateRow::new();
            for (field, value) in aggregation.group_by.iter().zip(key_values) {
                row.insert(field.clone(), value);
            }
            for aggregate in &aggregation.aggregates {
                row.insert(
                    aggregate.alias.clone(),
                    compute_aggregate(&records, &aggregate.field, aggregate.function),
                );
            }
            rows.push(row);
        }
        Ok(rows)
    }

    fn save(&self, record: &mut Record) -> OrmResult<RecordId> {
        self.counters.saves.fetch_add(1, AtomicOrdering::Relaxed);
        let id = self.store(record.clone())?;
        record.set_id(id.clone());
        Ok(id)
    }

    fn delete(&self, record: &Record) -> OrmResult<()> {
        let Some(id) = record.id() else {
            return Err(OrmError::Store("cannot delete an unsaved record".to_string()));
        };
        self.counters.deletes.fetch_add(1, AtomicOrdering::Relaxed);
        if let Some(by_id) = self.write_records()?.get_mut(record.entity_type()) {
            by_id.shift_remove(id);
        }
        if let Ok(mut deleted) = self.deleted.write() {
            deleted.push((record.entity_type().to_string(), id.to_string()));
        }
        Ok(())
    }
}

fn matches_group(record: &Record, group: &PredicateGroup) -> bool {
    let mut results = group.predicates().iter().map(|p| matches_predicate(record, p));
    match group.conjunction() {
        Conjunction::And => results.all(|matched| matched),
        Conjunction::Or => results.any(|matched| matched),
    }
}

fn matches_predicate(record: &Record, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::NotExists { field } => record.values_at(field).is_empty(),
        Predicate::Group(group) => matches_group(record, group),
        Predicate::Compare {
            field,
            operator,
            value,
        } => {
            let values = record.values_at(field);
            if values.is_empty() {
                return false;
            }
            let list = value.as_array().map(Vec::as_slice).unwrap_or_default();
            match operator {
                Operator::Equal => values.iter().any(|v| loose_eq(v, value)),
                Operator::NotEqual => !values.iter().any(|v| loose_eq(v, value)),
                Operator::GreaterThan => any_ordering(&values, value, |o| o == Ordering::Greater),
                Operator::GreaterThanOrEqual => any_ordering(&values, value, |o| o != Ordering::Less),
                Operator::LessThan => any_ordering(&values, value, |o| o == Ordering::Less),
                Operator::LessThanOrEqual => any_ordering(&values, value, |o| o != Ordering::Greater),
                Operator::Like => text_match(&values, value, |text, pattern| like(text, pattern)),
                Operator::Contains => text_match(&values, value, |text, needle| text.contains(needle)),
                Operator::StartsWith => text_match(&values, value, |text, prefix| text.starts_with(prefix)),
                Operator::EndsWith => text_match(&values, value, |text, suffix| text.ends_with(suffix)),
                Operator::In => values.iter().any(|v| list.iter().any(|l| loose_eq(v, l))),
                Operator::NotIn => !values.iter().any(|v| list.iter().any(|l| loose_eq(v, l))),
                Operator::Between => match list {
                    [low, high] => values.iter().any(|v| {
                        matches!(compare_values(v, low), Some(Ordering::Greater | Ordering::Equal))
                            && matches!(compare_values(v, high), Some(Ordering::Less | Ordering::Equal))
                    }),
                    _ => false,
                },
            }
        }
    }
}

fn any_ordering(values: &[Value], value: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    values
        .iter()
        .any(|v| compare_values(v, value).is_some_and(&accept))
}

fn text_match(values: &[Value], value: &Value, accept: impl Fn(&str, &str) -> bool) -> bool {
    let pattern = as_text(value).to_lowercase();
    values
        .iter()
        .any(|v| accept(&as_text(v).to_lowercase(), &pattern))
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    a == b || compare_values(a, b) == Some(Ordering::Equal)
}

/// Order two stored values: numbers (including numeric strings) numerically, strings lexically
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

pub(crate) fn compare_first(a: &Record, b: &Record, field: &str) -> Ordering {
    let left = a.values_at(field).into_iter().next();
    let right = b.values_at(field).into_iter().next();
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(l), Some(r)) => compare_values(&l, &r).unwrap_or(Ordering::Equal),
    }
}

/// SQL LIKE with `%` and `_` wildcards
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '%')
}

fn compute_aggregate(records: &[Record], field: &str, function: AggregateFunction) -> Value {
    let values: Vec<Value> = records.iter().flat_map(|r| r.values_at(field)).collect();
    let numbers = || values.iter().filter_map(as_number);

    match function {
        AggregateFunction::Count => Value::from(values.len()),
        AggregateFunction::Sum => number_value(numbers().sum()),
        AggregateFunction::Avg => {
            let count = numbers().count();
            if count == 0 {
                Value::Null
            } else {
                number_value(numbers().sum::<f64>() / count as f64)
            }
        }
        AggregateFunction::Min => extreme(&values, Ordering::Less),
        AggregateFunction::Max => extreme(&values, Ordering::Greater),
    }
}

fn extreme(values: &[Value], wanted: Ordering) -> Value {
    values
        .iter()
        .fold(None::<&Value>, |best, v| match best {
            Some(b) if compare_values(v, b) != Some(wanted) => Some(b),
            _ => Some(v),
        })
        .cloned()
        .unwrap_or(Value::Null)
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Aggregate;
    use serde_json::json;

    fn seeded() -> MemoryRecordStore {
        let store = MemoryRecordStore::new();
        for (title, total, status) in [("alpha", 10, Some("open")), ("beta", 25, None), ("gamma", 40, Some("closed"))] {
            let mut record = Record::new("order", "order")
                .with_field("title", title)
                .with_field("total", total);
            if let Some(status) = status {
                record.set("status", status);
            }
            store.seed(record).unwrap();
        }
        store
    }

    fn titles(store: &MemoryRecordStore, query: &StoreQuery) -> Vec<String> {
        let ids = store.execute(query).unwrap();
        store
            .load_multiple("order", &ids)
            .unwrap()
            .iter()
            .map(|r| r.get("title").and_then(Value::as_str).unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_like_wildcards() {
        assert!(like("alphabet", "al%"));
        assert!(like("alphabet", "%bet"));
        assert!(like("alphabet", "a_pha%"));
        assert!(!like("alphabet", "beta%"));
        assert!(like("", "%"));
    }

    #[test]
    fn test_compare_and_sort() {
        let store = seeded();
        let mut query = StoreQuery::new("order");
        query
            .condition("total", Operator::GreaterThanOrEqual, json!("25"))
            .sort("total", SortDirection::Desc);
        assert_eq!(titles(&store, &query), vec!["gamma", "beta"]);
    }

    #[test]
    fn test_or_group_with_not_exists() {
        let store = seeded();
        let mut query = StoreQuery::new("order");
        let mut either = PredicateGroup::or();
        either
            .condition("status", Operator::NotEqual, json!("open"))
            .not_exists("status");
        query.or_group(either);
        assert_eq!(titles(&store, &query), vec!["beta", "gamma"]);
    }

    #[test]
    fn test_in_between_and_range() {
        let store = seeded();
        let mut query = StoreQuery::new("order");
        query.condition("title", Operator::In, json!(["alpha", "gamma", "zeta"]));
        assert_eq!(titles(&store, &query), vec!["alpha", "gamma"]);

        let mut query = StoreQuery::new("order");
        query
            .condition("total", Operator::Between, json!([20, 40]))
            .range(1, 5);
        assert_eq!(titles(&store, &query), vec!["gamma"]);
    }

    #[test]
    fn test_count_and_stats() {
        let store = seeded();
        let mut query = StoreQuery::new("order");
        query.condition("title", Operator::Contains, json!("MM")).count();
        assert_eq!(store.count(&query).unwrap(), 1);
        assert_eq!(store.stats().counts, 1);
        assert_eq!(store.stats().queries, 0);
    }

    #[test]
    fn test_aggregate_grouping() {
        let store = seeded();
        store
            .seed(Record::new("order", "order").with_field("title", "delta").with_field("total", 5).with_field("status", "open"))
            .unwrap();

        let aggregation = Aggregation {
            aggregates: vec![
                Aggregate { field: "total".to_string(), function: AggregateFunction::Sum, alias: "sum".to_string() },
                Aggregate { field: "id".to_string(), function: AggregateFunction::Count, alias: "count".to_string() },
            ],
            group_by: vec!["status".to_string()],
        };
        let rows = store.aggregate(&StoreQuery::new("order"), &aggregation).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["status"], json!("open"));
        assert_eq!(rows[0]["sum"], json!(15));
        assert_eq!(rows[0]["count"], json!(2));
        assert_eq!(rows[1]["status"], Value::Null);
    }

    #[test]
    fn test_save_assigns_sequential_ids_and_delete_logs() {
        let store = MemoryRecordStore::new();
        let mut record = Record::new("order", "order");
        assert_eq!(store.save(&mut record).unwrap(), "1");
        assert_eq!(record.id(), Some("1"));

        store.delete(&record).unwrap();
        assert_eq!(store.deleted(), vec![("order".to_string(), "1".to_string())]);
        assert!(store.is_empty("order"));
        assert!(store.delete(&Record::new("order", "order")).is_err());
    }

    #[test]
    fn test_seeded_ids_are_never_reallocated() {
        let store = MemoryRecordStore::new();
        store
            .seed(Record::new("order", "order").with_id("1").with_field("title", "seeded"))
            .unwrap();

        let mut fresh = Record::new("order", "order").with_field("title", "fresh");
        assert_eq!(store.save(&mut fresh).unwrap(), "2");
        assert_eq!(store.len("order"), 2);

        let seeded = store.load("order", "1").unwrap().unwrap();
        assert_eq!(seeded.get("title"), Some(&json!("seeded")));
    }

    #[test]
    fn test_allocation_skips_taken_non_sequential_ids() {
        let store = MemoryRecordStore::new();
        store.seed(Record::new("order", "order").with_id("x")).unwrap();
        store.seed(Record::new("order", "order")).unwrap();
        store.seed(Record::new("order", "order").with_id("3")).unwrap();

        let mut fresh = Record::new("order", "order");
        assert_eq!(store.save(&mut fresh).unwrap(), "4");
        assert_eq!(store.len("order"), 4);
    }
}
