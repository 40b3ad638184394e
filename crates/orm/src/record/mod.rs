//! Records and the record store boundary
//!
//! A record is one persisted entry identified by an entity type, a bundle
//! (sub-type) and a set of named fields. The ORM core never persists
//! anything itself: it talks to a [`RecordStore`].

pub mod memory;
pub mod predicate;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::OrmResult;
use crate::query::{AggregateRow, Aggregation};
use crate::relationships::Cardinality;

pub use memory::*;
pub use predicate::*;

/// Stored record identifier
pub type RecordId = String;

/// Pseudo-field addressing the record id in conditions
pub const ID_FIELD: &str = "id";

/// Pseudo-field addressing the record bundle in conditions
pub const BUNDLE_FIELD: &str = "bundle";

/// One persisted record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: Option<RecordId>,
    entity_type: String,
    bundle: String,
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Create a new, unsaved record
    pub fn new(entity_type: impl Into<String>, bundle: impl Into<String>) -> Self {
        Self {
            id: None,
            entity_type: entity_type.into(),
            bundle: bundle.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<RecordId>) {
        self.id = Some(id.into());
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn bundle(&self) -> &str {
        &self.bundle
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Resolve a field path (`field` or `field.column`) to its non-null values.
    ///
    /// Multi-valued fields yield one value per item; `id` and `bundle`
    /// address the record's own identity.
    pub fn values_at(&self, path: &str) -> Vec<Value> {
        match path {
            ID_FIELD => self.id.iter().map(|id| Value::String(id.clone())).collect(),
            BUNDLE_FIELD => vec![Value::String(self.bundle.clone())],
            _ => {
                let (field, column) = match path.split_once('.') {
                    Some((field, column)) => (field, Some(column)),
                    None => (path, None),
                };

                let Some(value) = self.fields.get(field) else {
                    return Vec::new();
                };

                let items: Vec<&Value> = match value {
                    Value::Array(items) => items.iter().collect(),
                    single => vec![single],
                };

                items
                    .into_iter()
                    .filter_map(|item| match column {
                        Some(column) => item.get(column).cloned(),
                        None => Some(item.clone()),
                    })
                    .filter(|value| !value.is_null())
                    .collect()
            }
        }
    }

    /// Ids stored in a reference field
    pub fn reference_ids(&self, field: &str, column: &str) -> Vec<RecordId> {
        self.values_at(&format!("{}.{}", field, column))
            .iter()
            .filter_map(value_to_id)
            .collect()
    }

    /// Overwrite a reference field with the given ids
    pub fn set_reference_ids(&mut self, field: &str, column: &str, ids: &[RecordId], cardinality: Cardinality) {
        let item = |id: &RecordId| {
            let mut map = Map::new();
            map.insert(column.to_string(), Value::String(id.clone()));
            Value::Object(map)
        };

        match (ids, cardinality) {
            ([], _) => {
                self.fields.remove(field);
            }
            ([id, ..], Cardinality::Single) => {
                self.fields.insert(field.to_string(), item(id));
            }
            (ids, Cardinality::Multiple) => {
                self.fields
                    .insert(field.to_string(), Value::Array(ids.iter().map(item).collect()));
            }
        }
    }
}

/// Interpret a stored value as a record id
pub fn value_to_id(value: &Value) -> Option<RecordId> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The persistence collaborator consumed by the ORM core.
///
/// All calls are blocking. Implementations are shared between sessions, so
/// they must be thread-safe even though a single session is not.
pub trait RecordStore: Send + Sync {
    /// Create a new, unsaved record
    fn create(&self, entity_type: &str, bundle: &str) -> OrmResult<Record> {
        Ok(Record::new(entity_type, bundle))
    }

    /// Load one record by id
    fn load(&self, entity_type: &str, id: &str) -> OrmResult<Option<Record>>;

    /// Load several records; missing ids are skipped and order follows `ids`
    fn load_multiple(&self, entity_type: &str, ids: &[RecordId]) -> OrmResult<Vec<Record>>;

    /// Start a store-native query
    fn query(&self, entity_type: &str) -> StoreQuery {
        StoreQuery::new(entity_type)
    }

    /// Execute a query and return the matching ids
    fn execute(&self, query: &StoreQuery) -> OrmResult<Vec<RecordId>>;

    /// Count the records matching a query
    fn count(&self, query: &StoreQuery) -> OrmResult<usize>;

    /// Run an aggregation over the records matching a query
    fn aggregate(&self, query: &StoreQuery, aggregation: &Aggregation) -> OrmResult<Vec<AggregateRow>>;

    /// Insert or update a record, returning its id
    fn save(&self, record: &mut Record) -> OrmResult<RecordId>;

    /// Delete a persisted record
    fn delete(&self, record: &Record) -> OrmResult<()>;
}
