//! Relationship Types - Declarative edges of the model graph
//!
//! Four kinds exist. `Field` and `Parent` relationships hold the foreign key
//! on the declaring record; `Referenced` and `Child` relationships are their
//! inverses and hold nothing.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conditions::Condition;
use crate::error::{OrmError, OrmResult};
use crate::query::{ModelQuery, MultiModelQuery, RelationshipQuery};
use crate::record::ID_FIELD;

use super::registry::ModelRegistry;

/// Default column of a reference field
pub const DEFAULT_REFERENCE_COLUMN: &str = "target_id";

/// How many references a foreign key field can hold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    #[default]
    Single,
    Multiple,
}

/// Which side of an edge holds the foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipSide {
    /// The declaring record stores the foreign key
    Parent,
    /// The related records store a foreign key pointing back
    Child,
}

/// The model type(s) a field relationship points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipTarget {
    Model(String),
    Polymorphic(Vec<String>),
}

impl RelationshipTarget {
    pub fn model_types(&self) -> Vec<String> {
        match self {
            RelationshipTarget::Model(model_type) => vec![model_type.clone()],
            RelationshipTarget::Polymorphic(model_types) => model_types.clone(),
        }
    }
}

/// The declaring record stores a foreign key to another record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRelationship {
    pub field: String,
    pub column: String,
    pub target: RelationshipTarget,
    pub cardinality: Cardinality,
    /// Access to the declaring record is decided by access to the referenced one
    pub parent_access: bool,
}

/// Inverse of a [`FieldRelationship`] declared on another model type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedRelationship {
    pub model_type: String,
    pub field_relationship: String,
}

/// Self-referential foreign key within one entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRelationship {
    pub field: String,
    pub column: String,
    pub model_type: String,
}

/// Inverse of a [`ParentRelationship`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRelationship {
    pub model_type: String,
    pub parent_relationship: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    Field(FieldRelationship),
    Referenced(ReferencedRelationship),
    Parent(ParentRelationship),
    Child(ChildRelationship),
}

/// A named relationship declared by a model type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    name: String,
    source: String,
    cascading_delete: bool,
    kind: RelationshipKind,
}

impl Relationship {
    fn new(name: impl Into<String>, kind: RelationshipKind) -> Self {
        Self {
            name: name.into(),
            source: String::new(),
            cascading_delete: false,
            kind,
        }
    }

    /// Foreign key field pointing at one model type
    pub fn field(name: impl Into<String>, field: impl Into<String>, model_type: impl Into<String>) -> Self {
        Self::new(
            name,
            RelationshipKind::Field(FieldRelationship {
                field: field.into(),
                column: DEFAULT_REFERENCE_COLUMN.to_string(),
                target: RelationshipTarget::Model(model_type.into()),
                cardinality: Cardinality::Single,
                parent_access: false,
            }),
        )
    }

    /// Foreign key field that may point at any of several model types sharing one entity type
    pub fn polymorphic_field(name: impl Into<String>, field: impl Into<String>, model_types: &[&str]) -> Self {
        Self::new(
            name,
            RelationshipKind::Field(FieldRelationship {
                field: field.into(),
                column: DEFAULT_REFERENCE_COLUMN.to_string(),
                target: RelationshipTarget::Polymorphic(
                    model_types.iter().map(|t| t.to_string()).collect(),
                ),
                cardinality: Cardinality::Single,
                parent_access: false,
            }),
        )
    }

    /// Field relationship whose target also grants access to the declaring record
    pub fn parent_access_field(name: impl Into<String>, field: impl Into<String>, model_type: impl Into<String>) -> Self {
        let mut relationship = Self::field(name, field, model_type);
        if let RelationshipKind::Field(field) = &mut relationship.kind {
            field.parent_access = true;
        }
        relationship
    }

    /// Inverse of `field_relationship` declared on `model_type`
    pub fn referenced(
        name: impl Into<String>,
        model_type: impl Into<String>,
        field_relationship: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            RelationshipKind::Referenced(ReferencedRelationship {
                model_type: model_type.into(),
                field_relationship: field_relationship.into(),
            }),
        )
    }

    /// Self-referential foreign key (tree-shaped data)
    pub fn parent(name: impl Into<String>, field: impl Into<String>, model_type: impl Into<String>) -> Self {
        Self::new(
            name,
            RelationshipKind::Parent(ParentRelationship {
                field: field.into(),
                column: DEFAULT_REFERENCE_COLUMN.to_string(),
                model_type: model_type.into(),
            }),
        )
    }

    /// Inverse of `parent_relationship` declared on `model_type`
    pub fn child(
        name: impl Into<String>,
        model_type: impl Into<String>,
        parent_relationship: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            RelationshipKind::Child(ChildRelationship {
                model_type: model_type.into(),
                parent_relationship: parent_relationship.into(),
            }),
        )
    }

    /// Use a different column of the reference field
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        match &mut self.kind {
            RelationshipKind::Field(field) => field.column = column.into(),
            RelationshipKind::Parent(parent) => parent.column = column.into(),
            _ => {}
        }
        self
    }

    /// Set how many references the foreign key field holds
    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        if let RelationshipKind::Field(field) = &mut self.kind {
            field.cardinality = cardinality;
        }
        self
    }

    /// Delete related records removed from this relationship when it is saved
    pub fn cascading(mut self, cascading_delete: bool) -> Self {
        self.cascading_delete = cascading_delete;
        self
    }

    pub(crate) fn set_source(&mut self, source: &str) {
        self.source = source.to_string();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The model type that declared this relationship
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn cascading_delete(&self) -> bool {
        self.cascading_delete
    }

    pub fn kind(&self) -> &RelationshipKind {
        &self.kind
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            RelationshipKind::Field(field) if field.parent_access => "ParentAccessFieldRelationship",
            RelationshipKind::Field(_) => "FieldRelationship",
            RelationshipKind::Referenced(_) => "ReferencedRelationship",
            RelationshipKind::Parent(_) => "ParentRelationship",
            RelationshipKind::Child(_) => "ChildRelationship",
        }
    }

    pub fn side(&self) -> RelationshipSide {
        match self.kind {
            RelationshipKind::Field(_) | RelationshipKind::Parent(_) => RelationshipSide::Parent,
            RelationshipKind::Referenced(_) | RelationshipKind::Child(_) => RelationshipSide::Child,
        }
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(
            &self.kind,
            RelationshipKind::Field(FieldRelationship {
                target: RelationshipTarget::Polymorphic(_),
                ..
            })
        )
    }

    pub fn is_parent_access(&self) -> bool {
        matches!(&self.kind, RelationshipKind::Field(field) if field.parent_access)
    }

    /// The single model type on the far side, unset for polymorphic relationships
    pub fn model_type(&self) -> Option<&str> {
        match &self.kind {
            RelationshipKind::Field(FieldRelationship {
                target: RelationshipTarget::Model(model_type),
                ..
            }) => Some(model_type),
            RelationshipKind::Field(_) => None,
            RelationshipKind::Referenced(referenced) => Some(&referenced.model_type),
            RelationshipKind::Parent(parent) => Some(&parent.model_type),
            RelationshipKind::Child(child) => Some(&child.model_type),
        }
    }

    /// Candidate model types of a polymorphic relationship
    pub fn polymorphic_model_types(&self) -> &[String] {
        match &self.kind {
            RelationshipKind::Field(FieldRelationship {
                target: RelationshipTarget::Polymorphic(model_types),
                ..
            }) => model_types,
            _ => &[],
        }
    }

    /// Every model type declared on the far side
    pub fn target_model_types(&self) -> Vec<String> {
        match &self.kind {
            RelationshipKind::Field(field) => field.target.model_types(),
            _ => self.model_type().map(str::to_string).into_iter().collect(),
        }
    }

    /// References per foreign key; for child-side relationships this is the
    /// cardinality of the counterpart field
    pub fn cardinality(&self, registry: &ModelRegistry) -> OrmResult<Cardinality> {
        Ok(registry.resolve(&self.source, &self.name)?.cardinality)
    }

    /// Foreign key field and column held by the declaring record
    pub fn foreign_key_field(&self) -> OrmResult<(&str, &str)> {
        match &self.kind {
            RelationshipKind::Field(field) => Ok((&field.field, &field.column)),
            RelationshipKind::Parent(parent) => Ok((&parent.field, &parent.column)),
            _ => Err(OrmError::InvalidRelationshipType {
                relationship: self.name.clone(),
                expected: "FieldRelationship or ParentRelationship".to_string(),
                found: self.kind_name().to_string(),
            }),
        }
    }

    /// Condition template for traversing this relationship; the resolver fills in the ids
    pub fn condition(&self, registry: &ModelRegistry) -> OrmResult<Condition> {
        let resolved = registry.resolve(&self.source, &self.name)?;
        let field = match resolved.side {
            RelationshipSide::Parent => ID_FIELD.to_string(),
            RelationshipSide::Child => resolved.foreign_key.path(),
        };
        Ok(Condition::in_list(field, Vec::<Value>::new()).required())
    }

    /// Query over the far side of this relationship
    pub fn relationship_query(&self, registry: &ModelRegistry) -> OrmResult<RelationshipQuery> {
        let resolved = registry.resolve(&self.source, &self.name)?;
        let mut model_types = resolved
            .far_model_types
            .iter()
            .map(|name| registry.get(name))
            .collect::<OrmResult<Vec<_>>>()?;

        if model_types.len() == 1 {
            if let Some(model_type) = model_types.pop() {
                return Ok(RelationshipQuery::Model(ModelQuery::new(model_type)));
            }
        }
        Ok(RelationshipQuery::MultiModel(MultiModelQuery::new(model_types)?))
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} ({})", self.source, self.name, self.kind_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_relationship_metadata() {
        let relationship = Relationship::field("customer", "customer_ref", "Customer");
        assert_eq!(relationship.side(), RelationshipSide::Parent);
        assert_eq!(relationship.model_type(), Some("Customer"));
        assert!(!relationship.is_polymorphic());
        assert_eq!(
            relationship.foreign_key_field().unwrap(),
            ("customer_ref", DEFAULT_REFERENCE_COLUMN)
        );
    }

    #[test]
    fn test_polymorphic_field_has_no_single_model_type() {
        let relationship =
            Relationship::polymorphic_field("subject", "subject_ref", &["Article", "Page"]).with_column("entity_id");
        assert!(relationship.is_polymorphic());
        assert_eq!(relationship.model_type(), None);
        assert_eq!(relationship.polymorphic_model_types(), ["Article", "Page"]);
        assert_eq!(relationship.target_model_types(), vec!["Article", "Page"]);
        assert_eq!(relationship.foreign_key_field().unwrap().1, "entity_id");
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(
            Relationship::parent_access_field("order", "order_ref", "Order").kind_name(),
            "ParentAccessFieldRelationship"
        );
        assert_eq!(Relationship::child("children", "Category", "parent").kind_name(), "ChildRelationship");
    }

    #[test]
    fn test_child_side_has_no_foreign_key_field() {
        let relationship = Relationship::referenced("lines", "OrderLine", "order").cascading(true);
        assert!(relationship.cascading_delete());
        assert_eq!(relationship.side(), RelationshipSide::Child);
        assert!(matches!(
            relationship.foreign_key_field(),
            Err(OrmError::InvalidRelationshipType { .. })
        ));
    }
}
