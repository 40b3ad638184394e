//! Model Registry - Model type descriptors and memoised relationship resolution

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;

use crate::error::{OrmError, OrmResult};
use crate::model::Violation;
use crate::record::Record;

use super::types::{Cardinality, Relationship, RelationshipKind, RelationshipSide, RelationshipTarget};

/// Custom validation hook attached to a model type
pub type Validator = Arc<dyn Fn(&Record) -> Vec<Violation> + Send + Sync>;

/// Descriptor of one concrete model type (an entity type + bundle pair)
#[derive(Clone)]
pub struct ModelType {
    name: String,
    entity_type: String,
    bundle: String,
    relationships: IndexMap<String, Relationship>,
    required_fields: Vec<String>,
    validators: Vec<Validator>,
}

impl ModelType {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>, bundle: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            bundle: bundle.into(),
            relationships: IndexMap::new(),
            required_fields: Vec::new(),
            validators: Vec::new(),
        }
    }

    /// Declare a relationship; the relationship's source becomes this type
    pub fn with_relationship(mut self, mut relationship: Relationship) -> Self {
        relationship.set_source(&self.name);
        self.relationships
            .insert(relationship.name().to_string(), relationship);
        self
    }

    pub fn with_required_field(mut self, field: impl Into<String>) -> Self {
        self.required_fields.push(field.into());
        self
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Record) -> Vec<Violation> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn bundle(&self) -> &str {
        &self.bundle
    }

    pub fn relationships(&self) -> &IndexMap<String, Relationship> {
        &self.relationships
    }

    pub fn has_relationship(&self, name: &str) -> bool {
        self.relationships.contains_key(name)
    }

    pub fn relationship(&self, name: &str) -> OrmResult<&Relationship> {
        self.relationships
            .get(name)
            .ok_or_else(|| OrmError::relationship_not_defined(&self.name, name))
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("entity_type", &self.entity_type)
            .field("bundle", &self.bundle)
            .field("relationships", &self.relationships.keys().collect::<Vec<_>>())
            .field("required_fields", &self.required_fields)
            .field("validators", &self.validators.len())
            .finish()
    }
}

/// Foreign key location: a reference field and the column inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub field: String,
    pub column: String,
}

impl ForeignKey {
    /// Condition path of this key (`field.column`)
    pub fn path(&self) -> String {
        format!("{}.{}", self.field, self.column)
    }
}

/// A relationship with its counterpart resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelationship {
    pub name: String,
    pub side: RelationshipSide,
    /// Where the key lives: on the declaring record for the parent side,
    /// on the far records for the child side
    pub foreign_key: ForeignKey,
    pub cardinality: Cardinality,
    pub polymorphic: bool,
    pub far_model_types: Vec<String>,
    /// Far model type -> name of the inverse relationship declared there
    pub inverses: IndexMap<String, String>,
}

impl ResolvedRelationship {
    pub fn inverse_on(&self, model_type: &str) -> Option<&str> {
        self.inverses.get(model_type).map(String::as_str)
    }
}

type ResolvedMap = Arc<IndexMap<String, ResolvedRelationship>>;

/// Registry of all model types known to a session
#[derive(Debug, Default)]
pub struct ModelRegistry {
    types: IndexMap<String, Arc<ModelType>>,
    bundles: HashMap<(String, String), String>,
    resolved: DashMap<String, ResolvedMap>,
}

impl ModelRegistry {
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    pub fn get(&self, model_type: &str) -> OrmResult<Arc<ModelType>> {
        self.types
            .get(model_type)
            .cloned()
            .ok_or_else(|| OrmError::Configuration(format!("Unknown model type '{}'", model_type)))
    }

    pub fn contains(&self, model_type: &str) -> bool {
        self.types.contains_key(model_type)
    }

    /// The model type registered for a record's entity type and bundle
    pub fn model_type_for_bundle(&self, entity_type: &str, bundle: &str) -> Option<Arc<ModelType>> {
        self.bundles
            .get(&(entity_type.to_string(), bundle.to_string()))
            .and_then(|name| self.types.get(name))
            .cloned()
    }

    pub fn model_type_for_record(&self, record: &Record) -> Option<Arc<ModelType>> {
        self.model_type_for_bundle(record.entity_type(), record.bundle())
    }

    pub fn model_types(&self) -> impl Iterator<Item = &Arc<ModelType>> {
        self.types.values()
    }

    /// Resolve every relationship of a model type.
    ///
    /// Counterparts are looked up the first time a type is asked for and the
    /// result is cached for the lifetime of the registry.
    pub fn resolved_relationships(&self, model_type: &str) -> OrmResult<ResolvedMap> {
        if let Some(resolved) = self.resolved.get(model_type) {
            return Ok(resolved.clone());
        }

        let descriptor = self.get(model_type)?;
        let mut resolved = IndexMap::new();
        for relationship in descriptor.relationships().values() {
            resolved.insert(
                relationship.name().to_string(),
                self.resolve_relationship(&descriptor, relationship)?,
            );
        }

        tracing::trace!("Resolved {} relationships of {}", resolved.len(), model_type);
        let resolved = self
            .resolved
            .entry(model_type.to_string())
            .or_insert_with(|| Arc::new(resolved))
            .clone();
        Ok(resolved)
    }

    /// Resolve one relationship of a model type
    pub fn resolve(&self, model_type: &str, relationship: &str) -> OrmResult<ResolvedRelationship> {
        self.resolved_relationships(model_type)?
            .get(relationship)
            .cloned()
            .ok_or_else(|| OrmError::relationship_not_defined(model_type, relationship))
    }

    /// Number of model types whose relationships have been resolved so far
    pub fn resolved_type_count(&self) -> usize {
        self.resolved.len()
    }

    fn resolve_relationship(&self, owner: &ModelType, relationship: &Relationship) -> OrmResult<ResolvedRelationship> {
        let name = relationship.name().to_string();
        match relationship.kind() {
            RelationshipKind::Field(field) => {
                let far_model_types = field.target.model_types();
                let mut inverses = IndexMap::new();
                for far in &far_model_types {
                    if let Some(inverse) = self.find_inverse(far, owner.name(), &name)? {
                        inverses.insert(far.clone(), inverse);
                    }
                }
                Ok(ResolvedRelationship {
                    name,
                    side: RelationshipSide::Parent,
                    foreign_key: ForeignKey {
                        field: field.field.clone(),
                        column: field.column.clone(),
                    },
                    cardinality: field.cardinality,
                    polymorphic: matches!(field.target, RelationshipTarget::Polymorphic(_)),
                    far_model_types,
                    inverses,
                })
            }
            RelationshipKind::Parent(parent) => {
                let mut inverses = IndexMap::new();
                if let Some(inverse) = self.find_inverse(&parent.model_type, owner.name(), &name)? {
                    inverses.insert(parent.model_type.clone(), inverse);
                }
                Ok(ResolvedRelationship {
                    name,
                    side: RelationshipSide::Parent,
                    foreign_key: ForeignKey {
                        field: parent.field.clone(),
                        column: parent.column.clone(),
                    },
                    cardinality: Cardinality::Single,
                    polymorphic: false,
                    far_model_types: vec![parent.model_type.clone()],
                    inverses,
                })
            }
            RelationshipKind::Referenced(referenced) => {
                let counterpart = self.counterpart(&referenced.model_type, &referenced.field_relationship)?;
                let RelationshipKind::Field(field) = counterpart.kind() else {
                    return Err(OrmError::InvalidRelationshipType {
                        relationship: counterpart.name().to_string(),
                        expected: "FieldRelationship".to_string(),
                        found: counterpart.kind_name().to_string(),
                    });
                };
                if !field.target.model_types().iter().any(|t| t == owner.name()) {
                    return Err(OrmError::Configuration(format!(
                        "{}::{} does not point at {}",
                        referenced.model_type,
                        referenced.field_relationship,
                        owner.name()
                    )));
                }
                Ok(ResolvedRelationship {
                    name,
                    side: RelationshipSide::Child,
                    foreign_key: ForeignKey {
                        field: field.field.clone(),
                        column: field.column.clone(),
                    },
                    cardinality: field.cardinality,
                    polymorphic: false,
                    far_model_types: vec![referenced.model_type.clone()],
                    inverses: IndexMap::from([(
                        referenced.model_type.clone(),
                        referenced.field_relationship.clone(),
                    )]),
                })
            }
            RelationshipKind::Child(child) => {
                let counterpart = self.counterpart(&child.model_type, &child.parent_relationship)?;
                let RelationshipKind::Parent(parent) = counterpart.kind() else {
                    return Err(OrmError::InvalidRelationshipType {
                        relationship: counterpart.name().to_string(),
                        expected: "ParentRelationship".to_string(),
                        found: counterpart.kind_name().to_string(),
                    });
                };
                Ok(ResolvedRelationship {
                    name,
                    side: RelationshipSide::Child,
                    foreign_key: ForeignKey {
                        field: parent.field.clone(),
                        column: parent.column.clone(),
                    },
                    cardinality: Cardinality::Single,
                    polymorphic: false,
                    far_model_types: vec![child.model_type.clone()],
                    inverses: IndexMap::from([(
                        child.model_type.clone(),
                        child.parent_relationship.clone(),
                    )]),
                })
            }
        }
    }

    fn counterpart(&self, model_type: &str, relationship: &str) -> OrmResult<Relationship> {
        self.get(model_type)?.relationship(relationship).cloned()
    }

    /// Name of the child-side relationship on `far` that inverts `owner::name`
    fn find_inverse(&self, far: &str, owner: &str, name: &str) -> OrmResult<Option<String>> {
        let far = self.get(far)?;
        Ok(far
            .relationships()
            .values()
            .find(|candidate| match candidate.kind() {
                RelationshipKind::Referenced(r) => r.model_type == owner && r.field_relationship == name,
                RelationshipKind::Child(c) => c.model_type == owner && c.parent_relationship == name,
                _ => false,
            })
            .map(|inverse| inverse.name().to_string()))
    }
}

/// Collects model types and validates them into a [`ModelRegistry`]
#[derive(Debug, Default)]
pub struct ModelRegistryBuilder {
    types: Vec<ModelType>,
}

impl ModelRegistryBuilder {
    pub fn register(mut self, model_type: ModelType) -> Self {
        self.types.push(model_type);
        self
    }

    pub fn build(self) -> OrmResult<ModelRegistry> {
        let mut registry = ModelRegistry::default();

        for model_type in self.types {
            let name = model_type.name().to_string();
            let bundle_key = (model_type.entity_type().to_string(), model_type.bundle().to_string());

            if registry.types.contains_key(&name) {
                return Err(OrmError::Configuration(format!("Model type '{}' registered twice", name)));
            }
            if let Some(existing) = registry.bundles.get(&bundle_key) {
                return Err(OrmError::Configuration(format!(
                    "Bundle {}:{} is already mapped to '{}'",
                    bundle_key.0, bundle_key.1, existing
                )));
            }

            registry.bundles.insert(bundle_key, name.clone());
            registry.types.insert(name, Arc::new(model_type));
        }

        registry.check_targets()?;
        tracing::debug!("Model registry built with {} model types", registry.types.len());
        Ok(registry)
    }
}

impl ModelRegistry {
    fn check_targets(&self) -> OrmResult<()> {
        for model_type in self.types.values() {
            for relationship in model_type.relationships().values() {
                let targets = match relationship.kind() {
                    RelationshipKind::Field(field) => field.target.model_types(),
                    RelationshipKind::Referenced(r) => vec![r.model_type.clone()],
                    RelationshipKind::Parent(p) => vec![p.model_type.clone()],
                    RelationshipKind::Child(c) => vec![c.model_type.clone()],
                };

                let mut entity_types = Vec::new();
                for target in &targets {
                    let far = self.types.get(target).ok_or_else(|| {
                        OrmError::Configuration(format!("{} points at unknown model type '{}'", relationship, target))
                    })?;
                    if !entity_types.contains(&far.entity_type()) {
                        entity_types.push(far.entity_type());
                    }
                }

                if relationship.is_polymorphic() && entity_types.len() > 1 {
                    return Err(OrmError::Polymorphic(format!(
                        "{} targets more than one entity type: {}",
                        relationship,
                        entity_types.join(", ")
                    )));
                }

                let same_entity = entity_types.iter().all(|e| *e == model_type.entity_type());
                let self_referential = matches!(
                    relationship.kind(),
                    RelationshipKind::Parent(_) | RelationshipKind::Child(_)
                );
                if self_referential && !same_entity {
                    return Err(OrmError::Configuration(format!(
                        "{} must stay within entity type '{}'",
                        relationship,
                        model_type.entity_type()
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ModelRegistry {
        ModelRegistry::builder()
            .register(
                ModelType::new("Customer", "customer", "customer")
                    .with_relationship(Relationship::referenced("orders", "Order", "customer")),
            )
            .register(
                ModelType::new("Order", "order", "order")
                    .with_relationship(Relationship::field("customer", "customer_ref", "Customer")),
            )
            .register(
                ModelType::new("Category", "category", "category")
                    .with_relationship(Relationship::parent("parent", "parent_ref", "Category"))
                    .with_relationship(Relationship::child("children", "Category", "parent")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_field_relationship_finds_inverse() {
        let registry = registry();
        let resolved = registry.resolve("Order", "customer").unwrap();

        assert_eq!(resolved.side, RelationshipSide::Parent);
        assert_eq!(resolved.foreign_key.path(), "customer_ref.target_id");
        assert_eq!(resolved.inverse_on("Customer"), Some("orders"));
    }

    #[test]
    fn test_referenced_relationship_uses_counterpart_key() {
        let registry = registry();
        let resolved = registry.resolve("Customer", "orders").unwrap();

        assert_eq!(resolved.side, RelationshipSide::Child);
        assert_eq!(resolved.foreign_key.field, "customer_ref");
        assert_eq!(resolved.far_model_types, vec!["Order"]);
        assert_eq!(resolved.inverse_on("Order"), Some("customer"));
    }

    #[test]
    fn test_self_referential_pair() {
        let registry = registry();
        assert_eq!(
            registry.resolve("Category", "parent").unwrap().inverse_on("Category"),
            Some("children")
        );
        assert_eq!(
            registry.resolve("Category", "children").unwrap().inverse_on("Category"),
            Some("parent")
        );
    }

    #[test]
    fn test_resolution_is_memoised_per_type() {
        let registry = registry();
        assert_eq!(registry.resolved_type_count(), 0);

        let first = registry.resolved_relationships("Order").unwrap();
        let second = registry.resolved_relationships("Order").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.resolved_type_count(), 1);
    }

    #[test]
    fn test_unknown_relationship() {
        let registry = registry();
        assert_eq!(
            registry.resolve("Order", "lines"),
            Err(OrmError::RelationshipNotDefined {
                model_type: "Order".to_string(),
                relationship: "lines".to_string(),
            })
        );
    }

    #[test]
    fn test_referenced_must_point_at_field_relationship() {
        let registry = ModelRegistry::builder()
            .register(
                ModelType::new("Category", "category", "category")
                    .with_relationship(Relationship::parent("parent", "parent_ref", "Category"))
                    .with_relationship(Relationship::referenced("wrong", "Category", "parent")),
            )
            .build()
            .unwrap();

        assert!(matches!(
            registry.resolve("Category", "wrong"),
            Err(OrmError::InvalidRelationshipType { .. })
        ));
    }

    #[test]
    fn test_build_rejects_unknown_targets_and_duplicate_bundles() {
        let unknown = ModelRegistry::builder()
            .register(
                ModelType::new("Order", "order", "order")
                    .with_relationship(Relationship::field("customer", "customer_ref", "Customer")),
            )
            .build();
        assert!(matches!(unknown, Err(OrmError::Configuration(_))));

        let duplicate = ModelRegistry::builder()
            .register(ModelType::new("A", "node", "page"))
            .register(ModelType::new("B", "node", "page"))
            .build();
        assert!(matches!(duplicate, Err(OrmError::Configuration(_))));
    }

    #[test]
    fn test_bundle_lookup() {
        let registry = registry();
        let model_type = registry.model_type_for_bundle("order", "order").unwrap();
        assert_eq!(model_type.name(), "Order");
        assert!(registry.model_type_for_bundle("order", "invoice").is_none());
    }
}
