//! Model persistence - save, delete and validation

use serde_json::Value;

use crate::error::{OrmError, OrmResult};
use crate::record::RecordId;
use crate::relationships::{Cardinality, RelationshipSide};

use super::core_model::{holds_single, split_first};
use super::{Model, Related, Violation, ViolationList, NOT_BLANK_MESSAGE};

impl Model {
    /// Save this model, or one of its relationships.
    ///
    /// With `None` the record itself is inserted or updated after foreign
    /// keys are refreshed from loaded parents, which must be saved first. With a relationship name:
    /// parent side saves the related models and restamps this model's
    /// foreign key (this record is not saved); child side stamps this
    /// model's id onto every child and saves them, deleting (cascading) or
    /// unlinking removed children.
    pub fn save(&self, relationship: Option<&str>) -> OrmResult<()> {
        match relationship {
            None => self.save_record(),
            Some(path) => match path.rsplit_once('.') {
                Some((prefix, last)) => self.get(prefix)?.save(Some(last)),
                None => self.save_relationship(path),
            },
        }
    }

    fn save_record(&self) -> OrmResult<()> {
        self.sync_foreign_keys()?;
        let session = self.session().clone();
        let id = self.with_record_mut(|record| session.store().save(record))?;
        tracing::debug!("Saved {} '{}' as {}", self.model_type().name(), self.key(), id);
        Ok(())
    }

    fn save_relationship(&self, name: &str) -> OrmResult<()> {
        let resolved = self.resolve(name)?;

        match resolved.side {
            RelationshipSide::Parent => {
                if holds_single(&resolved) {
                    if let Some(parent) = self.cached_parent(name) {
                        parent.save(None)?;
                    }
                } else if let Some(collection) = self.cached_children(name) {
                    // referenced models are not owned; removing one only drops the reference
                    collection.save_models()?;
                }
                self.sync_foreign_key(name)
            }
            RelationshipSide::Child => {
                let Some(id) = self.id() else {
                    return Err(OrmError::UnsavedModel {
                        key: self.key().to_string(),
                        relationship: name.to_string(),
                    });
                };
                let Some(collection) = self.cached_children(name) else {
                    return Ok(());
                };

                for child in collection.models() {
                    child.add_reference_id(&resolved.foreign_key, id.clone(), resolved.cardinality);
                }

                if self.relationship(name)?.cascading_delete() {
                    return collection.save(None);
                }

                for child in collection.models() {
                    child.save(None)?;
                }
                for removed in collection.get_models_to_delete() {
                    removed.remove_reference_id(&resolved.foreign_key, &id, resolved.cardinality);
                    if let Some(inverse) = resolved.inverse_on(removed.model_type().name()) {
                        removed.unlink(inverse, self);
                    }
                    removed.save(None)?;
                    tracing::debug!("Unlinked {} '{}' from '{}'", removed.model_type().name(), removed.key(), self.key());
                }
                collection.mark_saved();
                Ok(())
            }
        }
    }

    /// Drop a cached inverse link to `owner`
    fn unlink(&self, relationship: &str, owner: &Model) {
        if self
            .cached_parent(relationship)
            .is_some_and(|parent| parent.ptr_eq(owner))
        {
            self.remove_parent(relationship);
        }
        if let Some(collection) = self.cached_children(relationship) {
            collection.remove_model(owner);
        }
    }

    /// Refresh every parent-side foreign key from loaded related models
    fn sync_foreign_keys(&self) -> OrmResult<()> {
        for (name, _) in self.cached_parents() {
            self.sync_foreign_key(&name)?;
        }
        for (name, _) in self.cached_collections() {
            if self.resolve(&name)?.side == RelationshipSide::Parent {
                self.sync_foreign_key(&name)?;
            }
        }
        Ok(())
    }

    /// Restamp the foreign key of a parent-side relationship.
    ///
    /// Every loaded related model must already be stored, otherwise the
    /// reference could not be written and `UnsavedModel` is returned.
    pub(crate) fn sync_foreign_key(&self, name: &str) -> OrmResult<()> {
        let resolved = self.resolve(name)?;
        match resolved.cardinality {
            Cardinality::Single => {
                let Some(parent) = self.cached_parent(name) else {
                    return Ok(());
                };
                let id = stored_id(&parent, name)?;
                self.set_reference_ids(&resolved.foreign_key, &[id], Cardinality::Single);
            }
            Cardinality::Multiple => {
                let Some(collection) = self.cached_children(name) else {
                    return Ok(());
                };
                for member in collection.models() {
                    stored_id(&member, name)?;
                }
                let removed: Vec<_> = collection
                    .original_models()
                    .iter()
                    .filter(|model| !collection.contains_model(model))
                    .filter_map(Model::id)
                    .collect();
                let mut ids = self.get_parent_ids(name)?;
                ids.retain(|id| !removed.contains(id));
                for id in collection.ids() {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                self.set_reference_ids(&resolved.foreign_key, &ids, Cardinality::Multiple);
            }
        }
        Ok(())
    }

    /// Delete this model's record.
    ///
    /// Child-side relationships flagged as cascading are fetched and their
    /// members deleted first. Unsaved models are left alone.
    pub fn delete(&self) -> OrmResult<()> {
        if self.is_new() {
            tracing::debug!("Skipping delete of unsaved {} '{}'", self.model_type().name(), self.key());
            return Ok(());
        }

        let cascading: Vec<String> = self
            .model_type()
            .relationships()
            .values()
            .filter(|r| r.cascading_delete() && r.side() == RelationshipSide::Child)
            .map(|r| r.name().to_string())
            .collect();
        for name in cascading {
            for child in self.fetch(&name)?.models() {
                child.delete()?;
            }
        }

        self.session().store().delete(&self.record())?;
        tracing::debug!("Deleted {} '{}'", self.model_type().name(), self.key());
        Ok(())
    }

    /// Validate this model, or the models loaded under a relationship path.
    ///
    /// Nested violation paths are prefixed with the relationship name and,
    /// for collections, the member key.
    pub fn validate(&self, relationship: Option<&str>) -> OrmResult<ViolationList> {
        let Some(path) = relationship else {
            return Ok(self.validate_record());
        };

        let (name, rest) = split_first(path);
        let nested = match self.get(name)? {
            Related::None => ViolationList::new(),
            related => related.validate(rest)?,
        };
        let mut violations = ViolationList::new();
        violations.merge_prefixed(nested, name);
        Ok(violations)
    }

    fn validate_record(&self) -> ViolationList {
        let mut violations = ViolationList::new();
        let record = self.record();

        for field in self.model_type().required_fields() {
            if is_blank(record.get(field)) {
                violations.add(Violation::new(field.clone(), NOT_BLANK_MESSAGE));
            }
        }
        for validator in self.model_type().validators() {
            violations.extend(validator(&record));
        }
        violations
    }
}

fn stored_id(related: &Model, relationship: &str) -> OrmResult<RecordId> {
    related.id().ok_or_else(|| {
        tracing::warn!(
            "Cannot reference unsaved {} '{}' through '{}'",
            related.model_type().name(),
            related.key(),
            relationship
        );
        OrmError::UnsavedModel {
            key: related.key().to_string(),
            relationship: relationship.to_string(),
        }
    })
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_blank() {
        assert!(is_blank(None));
        assert!(is_blank(Some(&json!(null))));
        assert!(is_blank(Some(&json!("  "))));
        assert!(is_blank(Some(&json!([]))));
        assert!(!is_blank(Some(&json!(0))));
        assert!(!is_blank(Some(&json!(false))));
    }
}
