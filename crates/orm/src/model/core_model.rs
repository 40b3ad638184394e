//! Core Model - identity, field access and relationship traversal

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::collection::Collection;
use crate::error::{OrmError, OrmResult};
use crate::query::Query;
use crate::record::{Record, RecordId};
use crate::relationships::registry::{ForeignKey, ResolvedRelationship};
use crate::relationships::{resolver, Cardinality, ModelType, Relationship, RelationshipSide};
use crate::session::Session;

use super::Related;

pub(crate) struct ModelInner {
    session: Session,
    model_type: Arc<ModelType>,
    key: String,
    record: RefCell<Record>,
    parents: RefCell<IndexMap<String, Model>>,
    children: RefCell<IndexMap<String, Collection>>,
}

impl ModelInner {
    pub(crate) fn clear_caches(&self) {
        self.parents.borrow_mut().clear();
        self.children.borrow_mut().clear();
    }
}

/// In-memory handle to one record plus its loaded relationships.
///
/// Handles are cheap to clone and compare by identity with [`Model::ptr_eq`].
/// The key is the stored id, or a session placeholder for unsaved records,
/// and never changes once the model exists.
#[derive(Clone)]
pub struct Model(Rc<ModelInner>);

impl Model {
    /// Wrap a freshly created, unsaved record of the given model type
    pub fn forge_new(session: &Session, model_type: &str) -> OrmResult<Model> {
        let model_type = session.registry().get(model_type)?;
        Self::forge_new_as(session, model_type)
    }

    pub(crate) fn forge_new_as(session: &Session, model_type: Arc<ModelType>) -> OrmResult<Model> {
        let record = session
            .store()
            .create(model_type.entity_type(), model_type.bundle())?;
        Ok(Self::forge_record_as(session, model_type, record))
    }

    /// Load a record by id; `None` when the store has no such record
    pub fn forge_by_id(session: &Session, model_type: &str, id: &str) -> OrmResult<Option<Model>> {
        let model_type = session.registry().get(model_type)?;
        let Some(record) = session.store().load(model_type.entity_type(), id)? else {
            return Ok(None);
        };
        if record.bundle() != model_type.bundle() {
            return Err(OrmError::invalid_type(
                format!("{}:{}", model_type.entity_type(), model_type.bundle()),
                format!("{}:{}", record.entity_type(), record.bundle()),
            ));
        }
        Ok(Some(Self::forge_record_as(session, model_type, record)))
    }

    /// Wrap an existing record, picking the model type from its bundle
    pub fn forge_record(session: &Session, record: Record) -> OrmResult<Model> {
        let model_type = session.registry().model_type_for_record(&record).ok_or_else(|| {
            OrmError::Configuration(format!(
                "No model type registered for {}:{}",
                record.entity_type(),
                record.bundle()
            ))
        })?;
        Ok(Self::forge_record_as(session, model_type, record))
    }

    pub(crate) fn forge_record_as(session: &Session, model_type: Arc<ModelType>, record: Record) -> Model {
        let key = match record.id() {
            Some(id) => id.to_string(),
            None => session.next_placeholder(),
        };
        let inner = Rc::new(ModelInner {
            session: session.clone(),
            model_type,
            key,
            record: RefCell::new(record),
            parents: RefCell::new(IndexMap::new()),
            children: RefCell::new(IndexMap::new()),
        });
        session.track(&inner);
        Model(inner)
    }

    pub fn key(&self) -> &str {
        &self.0.key
    }

    pub fn id(&self) -> Option<RecordId> {
        self.0.record.borrow().id().map(str::to_string)
    }

    pub fn is_new(&self) -> bool {
        self.0.record.borrow().is_new()
    }

    pub fn model_type(&self) -> &Arc<ModelType> {
        &self.0.model_type
    }

    pub fn entity_type(&self) -> &str {
        self.0.model_type.entity_type()
    }

    pub fn bundle(&self) -> &str {
        self.0.model_type.bundle()
    }

    pub fn session(&self) -> &Session {
        &self.0.session
    }

    /// Borrow the underlying record
    pub fn record(&self) -> Ref<'_, Record> {
        self.0.record.borrow()
    }

    pub fn get_field(&self, field: &str) -> Option<Value> {
        self.0.record.borrow().get(field).cloned()
    }

    pub fn set_field(&self, field: &str, value: impl Into<Value>) {
        self.0.record.borrow_mut().set(field, value);
    }

    /// Same underlying model (not merely the same record)
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn relationship(&self, name: &str) -> OrmResult<&Relationship> {
        self.0.model_type.relationship(name)
    }

    pub fn has_relationship(&self, name: &str) -> bool {
        self.0.model_type.has_relationship(name)
    }

    /// Names among `names` that are defined and currently loaded; undefined names are skipped
    pub fn loaded_relationships(&self, names: &[&str]) -> Vec<String> {
        let parents = self.0.parents.borrow();
        let children = self.0.children.borrow();
        names
            .iter()
            .filter(|name| self.has_relationship(name))
            .filter(|name| parents.contains_key(**name) || children.contains_key(**name))
            .map(|name| name.to_string())
            .collect()
    }

    /// Forget whatever is loaded for a relationship
    pub fn clear_relationship(&self, name: &str) {
        self.0.parents.borrow_mut().shift_remove(name);
        self.0.children.borrow_mut().shift_remove(name);
    }

    /// Read a relationship (or dotted path) from memory; never queries.
    ///
    /// Single-valued relationships with nothing loaded give [`Related::None`];
    /// multi-valued ones give an empty collection.
    pub fn get(&self, path: &str) -> OrmResult<Related> {
        let (name, rest) = split_first(path);
        let resolved = self.resolve(name)?;
        let related = if holds_single(&resolved) {
            self.cached_parent(name).map(Related::Model).unwrap_or_default()
        } else {
            Related::Collection(self.children_or_insert_resolved(name, &resolved)?)
        };
        match rest {
            Some(rest) => related.get(rest),
            None => Ok(related),
        }
    }

    /// Query one relationship and wire both directions of the result.
    ///
    /// For a dotted path every segment but the last must already be loaded.
    pub fn fetch(&self, path: &str) -> OrmResult<Related> {
        self.fetch_inner(path, None)
    }

    /// Like [`Model::fetch`], copying conditions and sorting from `query`
    pub fn fetch_with(&self, path: &str, query: &Query) -> OrmResult<Related> {
        self.fetch_inner(path, Some(query))
    }

    pub(crate) fn fetch_inner(&self, path: &str, copy_from: Option<&Query>) -> OrmResult<Related> {
        match path.rsplit_once('.') {
            Some((prefix, last)) => match self.get(prefix)? {
                Related::None => Ok(Related::None),
                Related::Model(model) => model.fetch_inner(last, copy_from),
                Related::Collection(collection) => collection
                    .fetch_inner(last, copy_from)
                    .map(Related::Collection),
            },
            None => {
                resolver::fetch_relationship(self.session(), &[self.clone()], path, copy_from)?;
                self.get(path)
            }
        }
    }

    /// Attach a model to a relationship, stamping foreign keys and wiring the inverse
    pub fn put(&self, name: &str, model: &Model) -> OrmResult<()> {
        let resolved = self.resolve(name)?;
        let far_type = model.model_type().name();
        if !resolved.far_model_types.iter().any(|t| t == far_type) {
            return Err(OrmError::invalid_type(resolved.far_model_types.join(" | "), far_type));
        }
        let inverse = resolved.inverse_on(far_type).map(str::to_string);

        match resolved.side {
            RelationshipSide::Parent => {
                if holds_single(&resolved) {
                    self.set_parent(name, model.clone());
                } else {
                    self.children_or_insert_resolved(name, &resolved)?
                        .put(model.clone())?;
                }
                if let Some(id) = model.id() {
                    self.add_reference_id(&resolved.foreign_key, id, resolved.cardinality);
                }
                if let Some(inverse) = inverse {
                    model.children_or_insert(&inverse)?.put(self.clone())?;
                }
            }
            RelationshipSide::Child => {
                self.children_or_insert_resolved(name, &resolved)?
                    .put(model.clone())?;
                if let Some(inverse) = inverse {
                    if resolved.cardinality == Cardinality::Single {
                        model.set_parent(&inverse, self.clone());
                    } else {
                        model.children_or_insert(&inverse)?.put(self.clone())?;
                    }
                }
                if let Some(id) = self.id() {
                    model.add_reference_id(&resolved.foreign_key, id, resolved.cardinality);
                }
            }
        }
        Ok(())
    }

    /// Id stored in the foreign key of a parent-side relationship
    pub fn get_parent_id(&self, name: &str) -> OrmResult<Option<RecordId>> {
        Ok(self.get_parent_ids(name)?.into_iter().next())
    }

    pub fn get_parent_ids(&self, name: &str) -> OrmResult<Vec<RecordId>> {
        let (field, column) = self.relationship(name)?.foreign_key_field()?;
        Ok(self.0.record.borrow().reference_ids(field, column))
    }

    pub(crate) fn resolve(&self, name: &str) -> OrmResult<ResolvedRelationship> {
        self.session()
            .registry()
            .resolve(self.0.model_type.name(), name)
    }

    pub(crate) fn cached_parent(&self, name: &str) -> Option<Model> {
        self.0.parents.borrow().get(name).cloned()
    }

    pub(crate) fn cached_children(&self, name: &str) -> Option<Collection> {
        self.0.children.borrow().get(name).cloned()
    }

    pub(crate) fn cached_parents(&self) -> Vec<(String, Model)> {
        self.0
            .parents
            .borrow()
            .iter()
            .map(|(name, model)| (name.clone(), model.clone()))
            .collect()
    }

    pub(crate) fn cached_collections(&self) -> Vec<(String, Collection)> {
        self.0
            .children
            .borrow()
            .iter()
            .map(|(name, collection)| (name.clone(), collection.clone()))
            .collect()
    }

    pub(crate) fn set_parent(&self, name: &str, model: Model) {
        self.0.parents.borrow_mut().insert(name.to_string(), model);
    }

    pub(crate) fn remove_parent(&self, name: &str) -> Option<Model> {
        self.0.parents.borrow_mut().shift_remove(name)
    }

    pub(crate) fn set_children(&self, name: &str, collection: Collection) {
        self.0
            .children
            .borrow_mut()
            .insert(name.to_string(), collection);
    }

    /// The loaded collection of a relationship, created empty when missing
    pub(crate) fn children_or_insert(&self, name: &str) -> OrmResult<Collection> {
        if let Some(collection) = self.cached_children(name) {
            return Ok(collection);
        }
        let resolved = self.resolve(name)?;
        self.children_or_insert_resolved(name, &resolved)
    }

    fn children_or_insert_resolved(&self, name: &str, resolved: &ResolvedRelationship) -> OrmResult<Collection> {
        if let Some(collection) = self.cached_children(name) {
            return Ok(collection);
        }
        let collection = Collection::for_relationship(self.session(), resolved)?;
        self.set_children(name, collection.clone());
        Ok(collection)
    }

    pub(crate) fn add_reference_id(&self, key: &ForeignKey, id: RecordId, cardinality: Cardinality) {
        let mut record = self.0.record.borrow_mut();
        let ids = match cardinality {
            Cardinality::Single => vec![id],
            Cardinality::Multiple => {
                let mut ids = record.reference_ids(&key.field, &key.column);
                if !ids.contains(&id) {
                    ids.push(id);
                }
                ids
            }
        };
        record.set_reference_ids(&key.field, &key.column, &ids, cardinality);
    }

    pub(crate) fn remove_reference_id(&self, key: &ForeignKey, id: &str, cardinality: Cardinality) {
        let mut record = self.0.record.borrow_mut();
        let mut ids = record.reference_ids(&key.field, &key.column);
        ids.retain(|existing| existing != id);
        record.set_reference_ids(&key.field, &key.column, &ids, cardinality);
    }

    pub(crate) fn set_reference_ids(&self, key: &ForeignKey, ids: &[RecordId], cardinality: Cardinality) {
        self.0
            .record
            .borrow_mut()
            .set_reference_ids(&key.field, &key.column, ids, cardinality);
    }

    pub(crate) fn with_record_mut<T>(&self, f: impl FnOnce(&mut Record) -> T) -> T {
        f(&mut self.0.record.borrow_mut())
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("key", &self.0.key)
            .field("model_type", &self.0.model_type.name())
            .field("id", &self.id())
            .finish()
    }
}

/// Whether a relationship is cached as a single parent model
pub(crate) fn holds_single(resolved: &ResolvedRelationship) -> bool {
    resolved.side == RelationshipSide::Parent && resolved.cardinality == Cardinality::Single
}

pub(crate) fn split_first(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((first, rest)) => (first, Some(rest)),
        None => (path, None),
    }
}
