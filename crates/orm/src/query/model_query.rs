//! Model queries - queries that wrap their results into models

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::collection::Collection;
use crate::conditions::Condition;
use crate::error::{OrmError, OrmResult};
use crate::model::Model;
use crate::record::{Record, BUNDLE_FIELD};
use crate::relationships::ModelType;
use crate::session::Session;

use super::builder::Query;
use super::bundle::BundleQuery;

/// Query over the bundle of one model type
#[derive(Debug, Clone)]
pub struct ModelQuery {
    model_type: Arc<ModelType>,
    query: BundleQuery,
}

impl ModelQuery {
    pub fn new(model_type: Arc<ModelType>) -> Self {
        let query = BundleQuery::new(model_type.entity_type(), model_type.bundle());
        Self { model_type, query }
    }

    pub fn model_type(&self) -> &Arc<ModelType> {
        &self.model_type
    }

    /// Fetch all matches as a loaded collection
    pub fn fetch_collection(&self, session: &Session) -> OrmResult<Collection> {
        let collection = Collection::new(session, self.model_type.clone());
        for record in self.fetch(session)? {
            collection.put_fetched(Model::forge_record_as(session, self.model_type.clone(), record))?;
        }
        Ok(collection)
    }

    pub fn fetch_models(&self, session: &Session) -> OrmResult<Vec<Model>> {
        Ok(self
            .fetch(session)?
            .into_iter()
            .map(|record| Model::forge_record_as(session, self.model_type.clone(), record))
            .collect())
    }

    pub fn fetch_single_model(&self, session: &Session) -> OrmResult<Option<Model>> {
        Ok(self
            .fetch_single(session)?
            .map(|record| Model::forge_record_as(session, self.model_type.clone(), record)))
    }
}

impl Deref for ModelQuery {
    type Target = Query;

    fn deref(&self) -> &Query {
        &self.query
    }
}

impl DerefMut for ModelQuery {
    fn deref_mut(&mut self) -> &mut Query {
        &mut self.query
    }
}

/// Query over several bundles of one entity type.
///
/// Each result is wrapped in the model type registered for its bundle.
#[derive(Debug, Clone)]
pub struct MultiModelQuery {
    model_types: Vec<Arc<ModelType>>,
    query: Query,
}

impl MultiModelQuery {
    pub fn new(model_types: Vec<Arc<ModelType>>) -> OrmResult<Self> {
        let entity_type = match model_types.first() {
            Some(first) => first.entity_type().to_string(),
            None => return Err(OrmError::InvalidQuery("A multi-model query needs at least one model type".to_string())),
        };
        if let Some(other) = model_types.iter().find(|t| t.entity_type() != entity_type) {
            return Err(OrmError::Polymorphic(format!(
                "Model type {} is a '{}', expected '{}'",
                other.name(),
                other.entity_type(),
                entity_type
            )));
        }

        let bundles: Vec<String> = model_types.iter().map(|t| t.bundle().to_string()).collect();
        let mut query = Query::new(entity_type);
        query.add_base_condition(Condition::in_list(BUNDLE_FIELD, bundles));
        Ok(Self { model_types, query })
    }

    pub fn model_types(&self) -> &[Arc<ModelType>] {
        &self.model_types
    }

    /// Fetch all matches as a loaded polymorphic collection
    pub fn fetch_collection(&self, session: &Session) -> OrmResult<Collection> {
        let collection = Collection::polymorphic(session, Some(self.query.entity_type()));
        for model in self.fetch_models(session)? {
            collection.put_fetched(model)?;
        }
        Ok(collection)
    }

    pub fn fetch_models(&self, session: &Session) -> OrmResult<Vec<Model>> {
        Ok(self
            .fetch(session)?
            .into_iter()
            .filter_map(|record| self.wrap(session, record))
            .collect())
    }

    pub fn fetch_single_model(&self, session: &Session) -> OrmResult<Option<Model>> {
        Ok(self
            .fetch_single(session)?
            .and_then(|record| self.wrap(session, record)))
    }

    fn wrap(&self, session: &Session, record: Record) -> Option<Model> {
        let model_type = self
            .model_types
            .iter()
            .find(|t| t.bundle() == record.bundle())
            .cloned();
        match model_type {
            Some(model_type) => Some(Model::forge_record_as(session, model_type, record)),
            None => {
                tracing::warn!(
                    "Skipping {} record {:?}: bundle '{}' maps to none of the queried model types",
                    record.entity_type(),
                    record.id(),
                    record.bundle()
                );
                None
            }
        }
    }
}

impl Deref for MultiModelQuery {
    type Target = Query;

    fn deref(&self) -> &Query {
        &self.query
    }
}

impl DerefMut for MultiModelQuery {
    fn deref_mut(&mut self) -> &mut Query {
        &mut self.query
    }
}

/// The query a relationship produces for its far side
#[derive(Debug, Clone)]
pub enum RelationshipQuery {
    Model(ModelQuery),
    MultiModel(MultiModelQuery),
}

impl RelationshipQuery {
    pub fn fetch_models(&self, session: &Session) -> OrmResult<Vec<Model>> {
        match self {
            RelationshipQuery::Model(query) => query.fetch_models(session),
            RelationshipQuery::MultiModel(query) => query.fetch_models(session),
        }
    }

    pub fn fetch_collection(&self, session: &Session) -> OrmResult<Collection> {
        match self {
            RelationshipQuery::Model(query) => query.fetch_collection(session),
            RelationshipQuery::MultiModel(query) => query.fetch_collection(session),
        }
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self, RelationshipQuery::MultiModel(_))
    }
}

impl Deref for RelationshipQuery {
    type Target = Query;

    fn deref(&self) -> &Query {
        match self {
            RelationshipQuery::Model(query) => &**query,
            RelationshipQuery::MultiModel(query) => &**query,
        }
    }
}

impl DerefMut for RelationshipQuery {
    fn deref_mut(&mut self) -> &mut Query {
        match self {
            RelationshipQuery::Model(query) => &mut **query,
            RelationshipQuery::MultiModel(query) => &mut **query,
        }
    }
}
