//! Polymorphic collections
//!
//! A polymorphic collection accepts any model type as long as every member
//! shares one entity type. The entity type is fixed by the first model put.
//! Operations that need a single model type are rejected.

use crate::error::{OrmError, OrmResult};
use crate::model::Model;

use super::{Collection, TypeConstraint};

/// Check a prospective member against a polymorphic constraint, fixing the
/// entity type when this is the first member
pub(super) fn admit(entity_type: &mut Option<String>, model: &Model) -> OrmResult<()> {
    match entity_type {
        Some(expected) if *expected != model.entity_type() => Err(OrmError::Polymorphic(format!(
            "Cannot put {} '{}' of entity type '{}' into a collection of '{}'",
            model.model_type().name(),
            model.key(),
            model.entity_type(),
            expected
        ))),
        Some(_) => Ok(()),
        None => {
            *entity_type = Some(model.entity_type().to_string());
            Ok(())
        }
    }
}

/// Error for operations that need one concrete model type
pub(super) fn unsupported(operation: &str) -> OrmError {
    OrmError::Polymorphic(format!("{} is not supported on a polymorphic collection", operation))
}

impl Collection {
    pub fn is_polymorphic(&self) -> bool {
        matches!(self.constraint(), TypeConstraint::Polymorphic { .. })
    }

    /// The entity type shared by all members; for a polymorphic collection
    /// it stays unset until the first model is put
    pub fn entity_type(&self) -> Option<String> {
        match self.constraint() {
            TypeConstraint::Model(model_type) => Some(model_type.entity_type().to_string()),
            TypeConstraint::Polymorphic { entity_type } => entity_type,
        }
    }

    pub(super) fn ensure_single_type(&self, operation: &str) -> OrmResult<()> {
        if self.is_polymorphic() {
            return Err(unsupported(operation));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::record::MemoryRecordStore;
    use crate::relationships::{ModelRegistry, ModelType};
    use crate::session::Session;

    fn session() -> Session {
        let registry = ModelRegistry::builder()
            .register(ModelType::new("Article", "node", "article"))
            .register(ModelType::new("Page", "node", "page"))
            .register(ModelType::new("User", "user", "user"))
            .build()
            .unwrap();
        Session::new(Arc::new(MemoryRecordStore::new()), Arc::new(registry))
    }

    #[test]
    fn test_first_put_fixes_entity_type() {
        let session = session();
        let collection = Collection::polymorphic(&session, None);
        assert_eq!(collection.entity_type(), None);

        collection.put(Model::forge_new(&session, "Article").unwrap()).unwrap();
        collection.put(Model::forge_new(&session, "Page").unwrap()).unwrap();
        assert_eq!(collection.entity_type().as_deref(), Some("node"));
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn test_mixed_entity_types_are_rejected() {
        let session = session();
        let collection = Collection::polymorphic(&session, None);
        collection.put(Model::forge_new(&session, "Article").unwrap()).unwrap();

        let result = collection.put(Model::forge_new(&session, "User").unwrap());
        assert!(matches!(result, Err(OrmError::Polymorphic(_))));
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn test_single_type_operations_are_rejected() {
        let session = session();
        let collection = Collection::polymorphic(&session, Some("node"));

        assert!(matches!(collection.put_new(), Err(OrmError::Polymorphic(_))));
        assert!(matches!(collection.has_relationship("comments"), Err(OrmError::Polymorphic(_))));
        assert!(matches!(collection.save(Some("comments")), Err(OrmError::Polymorphic(_))));
        assert!(matches!(collection.validate(Some("comments")), Err(OrmError::Polymorphic(_))));
    }
}
