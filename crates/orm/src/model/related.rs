//! The result of reading a relationship off a model

use crate::collection::Collection;
use crate::error::OrmResult;

use super::{Model, ViolationList};

/// What a relationship currently resolves to
#[derive(Debug, Clone, Default)]
pub enum Related {
    /// Single-valued relationship with nothing loaded
    #[default]
    None,
    Model(Model),
    Collection(Collection),
}

impl Related {
    pub fn is_none(&self) -> bool {
        matches!(self, Related::None)
    }

    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Related::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Related::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn into_model(self) -> Option<Model> {
        match self {
            Related::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn into_collection(self) -> Option<Collection> {
        match self {
            Related::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    /// Every model reachable through this value
    pub fn models(&self) -> Vec<Model> {
        match self {
            Related::None => Vec::new(),
            Related::Model(model) => vec![model.clone()],
            Related::Collection(collection) => collection.models(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Related::None => 0,
            Related::Model(_) => 1,
            Related::Collection(collection) => collection.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a further relationship off whatever this resolves to
    pub fn get(&self, path: &str) -> OrmResult<Related> {
        match self {
            Related::None => Ok(Related::None),
            Related::Model(model) => model.get(path),
            Related::Collection(collection) => collection.get(path).map(Related::Collection),
        }
    }

    pub fn fetch(&self, path: &str) -> OrmResult<Related> {
        match self {
            Related::None => Ok(Related::None),
            Related::Model(model) => model.fetch(path),
            Related::Collection(collection) => collection.fetch(path).map(Related::Collection),
        }
    }

    pub fn save(&self, relationship: Option<&str>) -> OrmResult<()> {
        match self {
            Related::None => Ok(()),
            Related::Model(model) => model.save(relationship),
            Related::Collection(collection) => collection.save(relationship),
        }
    }

    pub fn validate(&self, relationship: Option<&str>) -> OrmResult<ViolationList> {
        match self {
            Related::None => Ok(ViolationList::new()),
            Related::Model(model) => model.validate(relationship),
            Related::Collection(collection) => collection.validate(relationship),
        }
    }
}

impl From<Model> for Related {
    fn from(model: Model) -> Self {
        Related::Model(model)
    }
}

impl From<Collection> for Related {
    fn from(collection: Collection) -> Self {
        Related::Collection(collection)
    }
}
