//! Session - one unit of work over a record store
//!
//! A session owns everything a request needs to navigate the model graph:
//! the store, the model registry, configuration, the placeholder sequence
//! for unsaved models and the registered access policies. Models and
//! collections keep a handle to the session that forged them.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::OrmConfig;
use crate::error::{OrmError, OrmResult};
use crate::model::ModelInner;
use crate::query::{AccessPolicy, AggregateQuery, AggregateRow, Aggregation, ModelQuery, MultiModelQuery, Query};
use crate::record::{RecordId, RecordStore, StoreQuery, ACCESS_POLICY_TAG};
use crate::relationships::ModelRegistry;

struct SessionInner {
    store: Arc<dyn RecordStore>,
    registry: Arc<ModelRegistry>,
    config: OrmConfig,
    placeholders: Cell<u64>,
    access_policies: RefCell<IndexMap<String, Arc<dyn AccessPolicy>>>,
    forged: RefCell<Vec<Weak<ModelInner>>>,
}

/// Handle to a unit of work; cheap to clone, not thread-safe
#[derive(Clone)]
pub struct Session(Rc<SessionInner>);

impl Session {
    pub fn new(store: Arc<dyn RecordStore>, registry: Arc<ModelRegistry>) -> Self {
        Self::build(store, registry, OrmConfig::default())
    }

    /// Create a session with explicit configuration
    pub fn with_config(store: Arc<dyn RecordStore>, registry: Arc<ModelRegistry>, config: OrmConfig) -> OrmResult<Self> {
        config.validate()?;
        Ok(Self::build(store, registry, config))
    }

    fn build(store: Arc<dyn RecordStore>, registry: Arc<ModelRegistry>, config: OrmConfig) -> Self {
        Self(Rc::new(SessionInner {
            store,
            registry,
            config,
            placeholders: Cell::new(0),
            access_policies: RefCell::new(IndexMap::new()),
            forged: RefCell::new(Vec::new()),
        }))
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.0.store.as_ref()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.0.registry
    }

    pub fn config(&self) -> &OrmConfig {
        &self.0.config
    }

    pub fn ptr_eq(&self, other: &Session) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Next placeholder key for an unsaved model (`PLH1`, `PLH2`, ...)
    pub fn next_placeholder(&self) -> String {
        let next = self.0.placeholders.get() + 1;
        self.0.placeholders.set(next);
        format!("{}{}", self.0.config.placeholder_prefix, next)
    }

    pub fn register_access_policy(&self, policy: Arc<dyn AccessPolicy>) {
        self.0
            .access_policies
            .borrow_mut()
            .insert(policy.name().to_string(), policy);
    }

    /// Plain query using the configured default conjunction
    pub fn query(&self, entity_type: &str) -> Query {
        let mut query = Query::new(entity_type);
        query.set_conjunction(self.0.config.default_conjunction);
        query
    }

    pub fn model_query(&self, model_type: &str) -> OrmResult<ModelQuery> {
        let mut query = ModelQuery::new(self.registry().get(model_type)?);
        query.set_conjunction(self.0.config.default_conjunction);
        Ok(query)
    }

    pub fn multi_model_query(&self, model_types: &[&str]) -> OrmResult<MultiModelQuery> {
        let model_types = model_types
            .iter()
            .map(|name| self.registry().get(name))
            .collect::<OrmResult<Vec<_>>>()?;
        let mut query = MultiModelQuery::new(model_types)?;
        query.set_conjunction(self.0.config.default_conjunction);
        Ok(query)
    }

    pub fn aggregate_query(&self, entity_type: &str) -> AggregateQuery {
        AggregateQuery::from_query(self.query(entity_type))
    }

    /// Execute a compiled query, applying its access policy first
    pub fn execute(&self, query: &StoreQuery) -> OrmResult<Vec<RecordId>> {
        let query = self.prepare(query)?;
        self.trace(&query);
        self.store().execute(&query)
    }

    pub fn count(&self, query: &StoreQuery) -> OrmResult<usize> {
        let query = self.prepare(query)?;
        self.trace(&query);
        self.store().count(&query)
    }

    pub fn aggregate(&self, query: &StoreQuery, aggregation: &Aggregation) -> OrmResult<Vec<AggregateRow>> {
        let query = self.prepare(query)?;
        self.trace(&query);
        self.store().aggregate(&query, aggregation)
    }

    fn prepare<'q>(&self, query: &'q StoreQuery) -> OrmResult<Cow<'q, StoreQuery>> {
        if !query.has_tag(ACCESS_POLICY_TAG) {
            return Ok(Cow::Borrowed(query));
        }

        let name = query.access_policy().ok_or_else(|| {
            OrmError::Configuration("Query is tagged for access checks but names no policy".to_string())
        })?;
        let policy = self
            .0
            .access_policies
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::Configuration(format!("Access policy '{}' is not registered", name)))?;

        let mut rewritten = query.clone();
        policy.rewrite(&mut rewritten)?;
        tracing::trace!("Access policy '{}' applied to {} query", name, query.entity_type());
        Ok(Cow::Owned(rewritten))
    }

    fn trace(&self, query: &StoreQuery) {
        if self.0.config.trace_queries {
            tracing::debug!("Executing store query: {:?}", query);
        }
    }

    pub(crate) fn track(&self, model: &Rc<ModelInner>) {
        let mut forged = self.0.forged.borrow_mut();
        // prune dead handles only when the buffer would grow
        if forged.len() == forged.capacity() {
            forged.retain(|weak| weak.strong_count() > 0);
        }
        forged.push(Rc::downgrade(model));
    }

    /// Number of models forged by this session that are still alive
    pub fn live_models(&self) -> usize {
        self.0
            .forged
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// End the unit of work.
    ///
    /// Clears the relationship caches of every model forged by this session,
    /// releasing the reference cycles created by inverse wiring.
    pub fn close(&self) {
        let forged: Vec<_> = self.0.forged.borrow_mut().drain(..).collect();
        let mut cleared = 0;
        for model in forged.iter().filter_map(Weak::upgrade) {
            model.clear_caches();
            cleared += 1;
        }
        tracing::debug!("Session closed, cleared {} models", cleared);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.0.config)
            .field("placeholders", &self.0.placeholders.get())
            .field("access_policies", &self.0.access_policies.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}
