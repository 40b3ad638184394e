//! Collections - ordered, keyed sets of models
//!
//! A collection tracks its current members and a snapshot of the members it
//! was loaded with. Saving a collection upserts every current member and then
//! deletes persisted members that were removed since the snapshot.

pub mod polymorphic;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{OrmError, OrmResult};
use crate::model::core_model::split_first;
use crate::model::{Model, Related, ViolationList};
use crate::query::{Query, SortDirection};
use crate::record::memory::compare_first;
use crate::record::{Record, RecordId};
use crate::relationships::registry::ResolvedRelationship;
use crate::relationships::{resolver, ModelType, RelationshipSide};
use crate::session::Session;

/// Which models a collection accepts
#[derive(Debug, Clone)]
pub enum TypeConstraint {
    /// Exactly one model type
    Model(Arc<ModelType>),
    /// Any model type of one entity type, fixed by the first member
    Polymorphic { entity_type: Option<String> },
}

struct CollectionInner {
    session: Session,
    constraint: TypeConstraint,
    models: IndexMap<String, Model>,
    original_models: IndexMap<String, Model>,
}

/// Shared handle to an ordered, keyed set of models
#[derive(Clone)]
pub struct Collection(Rc<RefCell<CollectionInner>>);

impl Collection {
    pub fn new(session: &Session, model_type: Arc<ModelType>) -> Self {
        Self::with_constraint(session, TypeConstraint::Model(model_type))
    }

    /// Collection accepting any model type of one entity type
    pub fn polymorphic(session: &Session, entity_type: Option<&str>) -> Self {
        Self::with_constraint(
            session,
            TypeConstraint::Polymorphic {
                entity_type: entity_type.map(str::to_string),
            },
        )
    }

    pub fn for_model_type(session: &Session, model_type: &str) -> OrmResult<Self> {
        Ok(Self::new(session, session.registry().get(model_type)?))
    }

    /// Empty collection able to hold the far side of a relationship
    pub(crate) fn for_relationship(session: &Session, resolved: &ResolvedRelationship) -> OrmResult<Self> {
        let far = resolved.far_model_types.first().ok_or_else(|| {
            OrmError::Configuration(format!("Relationship '{}' has no target model type", resolved.name))
        })?;
        let far = session.registry().get(far)?;
        if resolved.polymorphic {
            Ok(Self::polymorphic(session, Some(far.entity_type())))
        } else {
            Ok(Self::new(session, far))
        }
    }

    fn with_constraint(session: &Session, constraint: TypeConstraint) -> Self {
        Self(Rc::new(RefCell::new(CollectionInner {
            session: session.clone(),
            constraint,
            models: IndexMap::new(),
            original_models: IndexMap::new(),
        })))
    }

    /// Load the records with the given ids into a new collection
    pub fn forge_by_ids(session: &Session, model_type: &str, ids: &[RecordId]) -> OrmResult<Self> {
        let model_type = session.registry().get(model_type)?;
        let collection = Self::new(session, model_type.clone());
        for record in session.store().load_multiple(model_type.entity_type(), ids)? {
            if record.bundle() != model_type.bundle() {
                return Err(OrmError::invalid_type(model_type.bundle(), record.bundle()));
            }
            collection.put_fetched(Model::forge_record_as(session, model_type.clone(), record))?;
        }
        Ok(collection)
    }

    pub fn session(&self) -> Session {
        self.0.borrow().session.clone()
    }

    pub fn constraint(&self) -> TypeConstraint {
        self.0.borrow().constraint.clone()
    }

    /// The member model type; unset for polymorphic collections
    pub fn model_type(&self) -> Option<Arc<ModelType>> {
        match self.constraint() {
            TypeConstraint::Model(model_type) => Some(model_type),
            TypeConstraint::Polymorphic { .. } => None,
        }
    }

    pub fn ptr_eq(&self, other: &Collection) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn admit(&self, model: &Model) -> OrmResult<()> {
        let mut inner = self.0.borrow_mut();
        match &mut inner.constraint {
            TypeConstraint::Model(model_type) => {
                if model_type.name() != model.model_type().name() {
                    return Err(OrmError::invalid_type(model_type.name(), model.model_type().name()));
                }
                Ok(())
            }
            TypeConstraint::Polymorphic { entity_type } => polymorphic::admit(entity_type, model),
        }
    }

    /// Add a model to the current members
    pub fn put(&self, model: Model) -> OrmResult<()> {
        self.admit(&model)?;
        let key = model.key().to_string();
        self.0.borrow_mut().models.insert(key, model);
        Ok(())
    }

    /// Add a model to the original snapshot only
    pub fn put_original(&self, model: Model) -> OrmResult<()> {
        self.admit(&model)?;
        let key = model.key().to_string();
        self.0.borrow_mut().original_models.insert(key, model);
        Ok(())
    }

    /// Add a loaded model to both the members and the snapshot
    pub(crate) fn put_fetched(&self, model: Model) -> OrmResult<()> {
        self.admit(&model)?;
        let key = model.key().to_string();
        let mut inner = self.0.borrow_mut();
        inner.original_models.insert(key.clone(), model.clone());
        inner.models.insert(key, model);
        Ok(())
    }

    /// Create a new model of the member type and add it
    pub fn put_new(&self) -> OrmResult<Model> {
        let Some(model_type) = self.model_type() else {
            return Err(polymorphic::unsupported("put_new"));
        };
        let model = Model::forge_new_as(&self.session(), model_type)?;
        self.put(model.clone())?;
        Ok(model)
    }

    /// Remove a member by key; the snapshot is left untouched
    pub fn remove(&self, key: &str) -> Option<Model> {
        self.0.borrow_mut().models.shift_remove(key)
    }

    pub fn remove_model(&self, model: &Model) -> Option<Model> {
        let key = self.key_of(model)?;
        self.remove(&key)
    }

    fn key_of(&self, model: &Model) -> Option<String> {
        self.0
            .borrow()
            .models
            .iter()
            .find(|(_, member)| member.ptr_eq(model))
            .map(|(key, _)| key.clone())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().models.contains_key(key)
    }

    pub fn contains_model(&self, model: &Model) -> bool {
        self.key_of(model).is_some()
    }

    pub fn get_model(&self, key: &str) -> Option<Model> {
        self.0.borrow().models.get(key).cloned()
    }

    pub fn models(&self) -> Vec<Model> {
        self.0.borrow().models.values().cloned().collect()
    }

    pub fn original_models(&self) -> Vec<Model> {
        self.0.borrow().original_models.values().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, Model)> {
        self.0
            .borrow()
            .models
            .iter()
            .map(|(key, model)| (key.clone(), model.clone()))
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().models.keys().cloned().collect()
    }

    /// Stored ids of the members that have one
    pub fn ids(&self) -> Vec<RecordId> {
        self.models().iter().filter_map(Model::id).collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().models.is_empty()
    }

    pub fn first(&self) -> Option<Model> {
        self.0.borrow().models.values().next().cloned()
    }

    /// Copies of the member records
    pub fn entities(&self) -> Vec<Record> {
        self.models().iter().map(|model| model.record().clone()).collect()
    }

    /// Reorder members by the first value of a field; missing values sort first
    pub fn sort_by_field(&self, field: &str, direction: SortDirection) {
        let records: IndexMap<String, Record> = self
            .entries()
            .into_iter()
            .map(|(key, model)| (key, model.record().clone()))
            .collect();
        let mut inner = self.0.borrow_mut();
        inner.models.sort_by(|left, _, right, _| {
            let ordering = match (records.get(left), records.get(right)) {
                (Some(a), Some(b)) => compare_first(a, b, field),
                _ => std::cmp::Ordering::Equal,
            };
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }

    /// Re-key a member under its stored id after it was saved.
    ///
    /// Position is kept in both the members and the snapshot. Returns
    /// `false` when there is no such member or it has no id yet.
    pub fn replace_old_model_key(&self, old_key: &str) -> bool {
        let Some(new_key) = self.get_model(old_key).and_then(|model| model.id()) else {
            return false;
        };
        if new_key == old_key {
            return true;
        }

        let rekey = |map: &mut IndexMap<String, Model>| {
            *map = map
                .drain(..)
                .map(|(key, model)| if key == old_key { (new_key.clone(), model) } else { (key, model) })
                .collect();
        };
        let mut inner = self.0.borrow_mut();
        rekey(&mut inner.models);
        rekey(&mut inner.original_models);
        true
    }

    pub fn has_relationship(&self, name: &str) -> OrmResult<bool> {
        match self.model_type() {
            Some(model_type) => Ok(model_type.has_relationship(name)),
            None => Err(polymorphic::unsupported("has_relationship")),
        }
    }

    /// Merge what every member has loaded for a relationship (or dotted path).
    ///
    /// Pure in-memory projection: nothing loaded yields an empty collection.
    pub fn get(&self, path: &str) -> OrmResult<Collection> {
        let (name, rest) = split_first(path);
        let members = self.models();
        let result = self.empty_for(name, &members)?;
        let polymorphic = self.is_polymorphic();

        for model in members {
            if polymorphic && !model.has_relationship(name) {
                continue;
            }
            match model.get(name)? {
                Related::None => {}
                Related::Model(related) => result.put_fetched(related)?,
                Related::Collection(related) => {
                    for member in related.models() {
                        result.put(member)?;
                    }
                    for original in related.original_models() {
                        result.put_original(original)?;
                    }
                }
            }
        }

        match rest {
            Some(rest) => result.get(rest),
            None => Ok(result),
        }
    }

    fn empty_for(&self, name: &str, members: &[Model]) -> OrmResult<Collection> {
        let session = self.session();
        let owner = match self.constraint() {
            TypeConstraint::Model(model_type) => Some(model_type),
            TypeConstraint::Polymorphic { .. } => members
                .iter()
                .find(|model| model.has_relationship(name))
                .map(|model| model.model_type().clone()),
        };
        match owner {
            Some(owner) => {
                let resolved = session.registry().resolve(owner.name(), name)?;
                Collection::for_relationship(&session, &resolved)
            }
            None => Ok(Collection::polymorphic(&session, None)),
        }
    }

    /// Fetch a relationship for every member with one batched query per
    /// model type, then return the merged result
    pub fn fetch(&self, path: &str) -> OrmResult<Collection> {
        self.fetch_inner(path, None)
    }

    pub fn fetch_with(&self, path: &str, query: &Query) -> OrmResult<Collection> {
        self.fetch_inner(path, Some(query))
    }

    pub(crate) fn fetch_inner(&self, path: &str, copy_from: Option<&Query>) -> OrmResult<Collection> {
        match path.rsplit_once('.') {
            Some((prefix, last)) => self.get(prefix)?.fetch_inner(last, copy_from),
            None => {
                resolver::fetch_relationship(&self.session(), &self.models(), path, copy_from)?;
                self.get(path)
            }
        }
    }

    /// Save the members, or one relationship of every member.
    ///
    /// Without a relationship all upserts happen before any delete.
    pub fn save(&self, relationship: Option<&str>) -> OrmResult<()> {
        let Some(path) = relationship else {
            return self.save_members();
        };
        self.ensure_single_type("save with a relationship")?;

        if let Some((prefix, last)) = path.rsplit_once('.') {
            return self.get(prefix)?.save(Some(last));
        }

        let Some(model_type) = self.model_type() else {
            return Err(polymorphic::unsupported("save with a relationship"));
        };
        let resolved = self.session().registry().resolve(model_type.name(), path)?;
        match resolved.side {
            RelationshipSide::Parent => {
                self.get(path)?.save_models()?;
                for model in self.models() {
                    model.sync_foreign_key(path)?;
                }
            }
            RelationshipSide::Child => {
                for model in self.models() {
                    model.save(Some(path))?;
                }
            }
        }
        Ok(())
    }

    fn save_members(&self) -> OrmResult<()> {
        self.save_models()?;
        let removed = self.get_models_to_delete();
        for model in &removed {
            model.delete()?;
        }
        if !removed.is_empty() {
            tracing::debug!("Deleted {} models removed from collection", removed.len());
        }
        self.mark_saved();
        Ok(())
    }

    /// Upsert every current member
    pub(crate) fn save_models(&self) -> OrmResult<()> {
        for model in self.models() {
            model.save(None)?;
        }
        Ok(())
    }

    /// Validate every member, or one relationship of every member
    pub fn validate(&self, relationship: Option<&str>) -> OrmResult<ViolationList> {
        if relationship.is_some() {
            self.ensure_single_type("validate with a relationship")?;
        }
        let mut violations = ViolationList::new();
        for (key, model) in self.entries() {
            violations.merge_prefixed(model.validate(relationship)?, &key);
        }
        Ok(violations)
    }

    /// Persisted models removed since the snapshot
    pub fn get_models_to_delete(&self) -> Vec<Model> {
        let inner = self.0.borrow();
        inner
            .original_models
            .iter()
            .filter(|(key, _)| !inner.models.contains_key(*key))
            .filter(|(_, model)| !model.is_new())
            .map(|(_, model)| model.clone())
            .collect()
    }

    /// Make the current members the new snapshot
    pub(crate) fn mark_saved(&self) {
        let mut inner = self.0.borrow_mut();
        inner.original_models = inner.models.clone();
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        let constraint = match &inner.constraint {
            TypeConstraint::Model(model_type) => model_type.name().to_string(),
            TypeConstraint::Polymorphic { entity_type } => {
                format!("polymorphic({})", entity_type.as_deref().unwrap_or("?"))
            }
        };
        f.debug_struct("Collection")
            .field("constraint", &constraint)
            .field("models", &inner.models.keys().collect::<Vec<_>>())
            .field("original_models", &inner.original_models.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemoryRecordStore;
    use crate::relationships::ModelRegistry;

    fn setup() -> (Arc<MemoryRecordStore>, Session) {
        let registry = ModelRegistry::builder()
            .register(ModelType::new("Order", "order", "order").with_required_field("title"))
            .register(ModelType::new("Invoice", "order", "invoice"))
            .build()
            .unwrap();
        let store = Arc::new(MemoryRecordStore::new());
        let session = Session::new(store.clone(), Arc::new(registry));
        (store, session)
    }

    #[test]
    fn test_typed_collection_rejects_other_model_types() {
        let (_, session) = setup();
        let orders = Collection::for_model_type(&session, "Order").unwrap();
        let invoice = Model::forge_new(&session, "Invoice").unwrap();

        assert!(matches!(orders.put(invoice), Err(OrmError::InvalidType { .. })));
        assert!(orders.is_empty());
    }

    #[test]
    fn test_remove_keeps_snapshot() {
        let (_, session) = setup();
        let orders = Collection::for_model_type(&session, "Order").unwrap();
        let order = orders.put_new().unwrap();
        orders.put_original(order.clone()).unwrap();

        orders.remove(order.key());
        assert!(orders.is_empty());
        assert_eq!(orders.original_models().len(), 1);
        // never saved, so nothing to delete
        assert!(orders.get_models_to_delete().is_empty());
    }

    #[test]
    fn test_save_upserts_then_deletes_removed() {
        let (store, session) = setup();
        let orders = Collection::for_model_type(&session, "Order").unwrap();
        let kept = orders.put_new().unwrap();
        let dropped = orders.put_new().unwrap();
        orders.save(None).unwrap();

        orders.remove_model(&dropped);
        assert_eq!(orders.get_models_to_delete().len(), 1);
        orders.save(None).unwrap();

        assert!(orders.get_models_to_delete().is_empty());
        assert_eq!(store.deleted(), vec![("order".to_string(), dropped.id().unwrap())]);
        assert!(orders.contains_model(&kept));
    }

    #[test]
    fn test_replace_old_model_key_keeps_position() {
        let (_, session) = setup();
        let orders = Collection::for_model_type(&session, "Order").unwrap();
        let first = orders.put_new().unwrap();
        let second = orders.put_new().unwrap();
        assert!(!orders.replace_old_model_key(first.key()));

        first.save(None).unwrap();
        assert!(orders.replace_old_model_key(first.key()));
        assert_eq!(orders.keys(), vec![first.id().unwrap(), second.key().to_string()]);
        // the model itself keeps its placeholder key
        assert!(first.key().starts_with("PLH"));
    }

    #[test]
    fn test_sort_by_field() {
        let (_, session) = setup();
        let orders = Collection::for_model_type(&session, "Order").unwrap();
        for title in ["b", "c", "a"] {
            orders.put_new().unwrap().set_field("title", title);
        }

        orders.sort_by_field("title", SortDirection::Desc);
        let titles: Vec<_> = orders
            .models()
            .iter()
            .filter_map(|model| model.get_field("title"))
            .collect();
        assert_eq!(titles, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_validate_prefixes_member_keys() {
        let (_, session) = setup();
        let orders = Collection::for_model_type(&session, "Order").unwrap();
        let order = orders.put_new().unwrap();

        let violations = orders.validate(None).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations.iter().next().map(|v| v.path().to_string()),
            Some(format!("{}.title", order.key()))
        );
    }
}
