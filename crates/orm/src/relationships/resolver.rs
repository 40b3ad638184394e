//! Relationship Resolver - batched fetching with inverse wiring
//!
//! One entry point serves single models and whole collections. Members are
//! grouped by model type; each group issues one `IN (...)` query per batch
//! for the relationship, the results are distributed back to the members
//! they belong to and the inverse relationship is populated on the results,
//! so both directions are navigable without a second query.

use indexmap::IndexMap;
use serde_json::Value;

use crate::collection::Collection;
use crate::conditions::Condition;
use crate::error::{OrmError, OrmResult};
use crate::model::Model;
use crate::query::{Query, RelationshipQuery};
use crate::record::RecordId;
use crate::session::Session;

use super::registry::ResolvedRelationship;
use super::types::{Cardinality, RelationshipSide};

/// Fetch `name` for every member and wire the results into the members'
/// relationship caches. Previously loaded results are replaced; related
/// models that were put but never saved are kept.
pub(crate) fn fetch_relationship(
    session: &Session,
    members: &[Model],
    name: &str,
    copy_from: Option<&Query>,
) -> OrmResult<()> {
    let mut groups: IndexMap<String, Vec<Model>> = IndexMap::new();
    for member in members {
        groups
            .entry(member.model_type().name().to_string())
            .or_default()
            .push(member.clone());
    }

    let mut defined = false;
    for (model_type, group) in &groups {
        let descriptor = session.registry().get(model_type)?;
        if !descriptor.has_relationship(name) && groups.len() > 1 {
            // mixed membership: only the types declaring the relationship take part
            continue;
        }
        let relationship = descriptor.relationship(name)?;
        defined = true;

        let resolved = session.registry().resolve(model_type, name)?;
        let mut query = relationship.relationship_query(session.registry())?;
        if let Some(copy_from) = copy_from {
            query.copy_from(copy_from);
        }
        let template = relationship.condition(session.registry())?;

        tracing::debug!(
            "Fetching {}::{} for {} models",
            model_type,
            name,
            group.len()
        );
        match resolved.side {
            RelationshipSide::Parent => fetch_parent_side(session, group, &resolved, &query, &template)?,
            RelationshipSide::Child => fetch_child_side(session, group, &resolved, &query, &template)?,
        }
    }

    match groups.first() {
        Some((model_type, _)) if !defined => Err(OrmError::relationship_not_defined(model_type, name)),
        _ => Ok(()),
    }
}

/// The members hold the foreign key: collect it and load the targets by id
fn fetch_parent_side(
    session: &Session,
    members: &[Model],
    resolved: &ResolvedRelationship,
    query: &RelationshipQuery,
    template: &Condition,
) -> OrmResult<()> {
    let name = resolved.name.as_str();
    let single = resolved.cardinality == Cardinality::Single;

    // a member holding an unsaved parent keeps it
    let members: Vec<&Model> = members
        .iter()
        .filter(|member| !(single && member.cached_parent(name).is_some_and(|parent| parent.is_new())))
        .collect();

    let mut ids: Vec<RecordId> = Vec::new();
    for member in &members {
        if single {
            member.remove_parent(name);
        } else {
            reset_children(session, member, resolved)?;
        }
        for id in member.get_parent_ids(name)? {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    if ids.is_empty() {
        return Ok(());
    }

    let targets = run_batched(session, query, template, &ids)?;

    for member in members {
        for id in member.get_parent_ids(name)? {
            let Some(target) = targets.get(&id) else {
                continue;
            };
            if single {
                member.set_parent(name, target.clone());
            } else {
                member.children_or_insert(name)?.put_fetched(target.clone())?;
            }

            if let Some(inverse) = resolved.inverse_on(target.model_type().name()) {
                let siblings = target.children_or_insert(inverse)?;
                if member.is_new() {
                    siblings.put(member.clone())?;
                } else {
                    siblings.put_fetched(member.clone())?;
                }
            }
        }
    }
    Ok(())
}

/// The far records hold the foreign key: query them by the members' ids
fn fetch_child_side(
    session: &Session,
    members: &[Model],
    resolved: &ResolvedRelationship,
    query: &RelationshipQuery,
    template: &Condition,
) -> OrmResult<()> {
    let name = resolved.name.as_str();

    let mut owners: IndexMap<RecordId, Model> = IndexMap::new();
    for member in members {
        reset_children(session, member, resolved)?;
        if let Some(id) = member.id() {
            owners.insert(id, member.clone());
        }
    }
    if owners.is_empty() {
        return Ok(());
    }

    let ids: Vec<RecordId> = owners.keys().cloned().collect();
    let children = run_batched(session, query, template, &ids)?;

    for child in children.values() {
        let inverse = resolved.inverse_on(child.model_type().name());
        let owner_ids = child
            .record()
            .reference_ids(&resolved.foreign_key.field, &resolved.foreign_key.column);
        for owner_id in owner_ids {
            let Some(owner) = owners.get(&owner_id) else {
                continue;
            };
            owner.children_or_insert(name)?.put_fetched(child.clone())?;

            if let Some(inverse) = inverse {
                if resolved.cardinality == Cardinality::Single {
                    child.set_parent(inverse, owner.clone());
                } else {
                    child.children_or_insert(inverse)?.put_fetched(owner.clone())?;
                }
            }
        }
    }
    Ok(())
}

/// Replace the cached collection with an empty one, carrying over unsaved members
fn reset_children(session: &Session, member: &Model, resolved: &ResolvedRelationship) -> OrmResult<()> {
    let fresh = Collection::for_relationship(session, resolved)?;
    if let Some(previous) = member.cached_children(&resolved.name) {
        for pending in previous.models().into_iter().filter(Model::is_new) {
            fresh.put(pending)?;
        }
    }
    member.set_children(&resolved.name, fresh);
    Ok(())
}

/// Run the relationship query once per batch of ids, keyed by result id
fn run_batched(
    session: &Session,
    query: &RelationshipQuery,
    template: &Condition,
    ids: &[RecordId],
) -> OrmResult<IndexMap<RecordId, Model>> {
    let batch_size = session
        .config()
        .fetch_batch_size
        .unwrap_or(ids.len())
        .max(1);

    let mut results = IndexMap::new();
    for batch in ids.chunks(batch_size) {
        let mut condition = template.clone();
        condition.set_value(Value::from(batch.to_vec()));

        let mut batch_query = query.clone();
        batch_query.add_base_condition(condition);
        for model in batch_query.fetch_models(session)? {
            if let Some(id) = model.id() {
                results.insert(id, model);
            }
        }
    }
    tracing::trace!("Relationship query returned {} models", results.len());
    Ok(results)
}
