mod common;

use std::sync::Arc;

use common::{seed_customer, seed_order, setup};
use elif_graph_orm::{
    AggregateFunction, Condition, ConditionGroup, Conjunction, FnAccessPolicy, MemoryRecordStore, Operator,
    OrmError, Record, Session, SortDirection, StoreQuery,
};
use serde_json::json;

/// Orders totalling 10 (open), 20 (open), 30 (closed) and 40 (no status)
fn seed_orders(store: &MemoryRecordStore) {
    let customer = seed_customer(store, "Ann");
    seed_order(store, &customer, "open", 10.0);
    seed_order(store, &customer, "open", 20.0);
    seed_order(store, &customer, "closed", 30.0);
    store
        .seed(Record::new("order", "order").with_field("total", 40))
        .unwrap();
}

fn fetch_totals(session: &Session, query: &elif_graph_orm::Query) -> Vec<i64> {
    query
        .fetch(session)
        .unwrap()
        .iter()
        .filter_map(|record| record.get("total").and_then(|v| v.as_f64()))
        .map(|total| total as i64)
        .collect()
}

#[test]
fn test_or_logic_selects_referenced_conditions_only() {
    let (store, session) = setup();
    seed_orders(&store);

    let mut query = session.query("order");
    query
        .add_condition(Condition::eq("status", "open"))
        .add_condition(Condition::new("total", Operator::GreaterThan, 100))
        .add_condition(Condition::eq("status", "closed"))
        .set_condition_logic("OR(1,3,4)")
        .add_sort_order("total", SortDirection::Asc);

    assert_eq!(fetch_totals(&session, &query), vec![10, 20, 30]);
}

#[test]
fn test_nested_logic() {
    let (store, session) = setup();
    seed_orders(&store);

    let mut query = session.query("order");
    query
        .add_condition(Condition::new("total", Operator::GreaterThanOrEqual, 20))
        .add_condition(Condition::eq("status", "open"))
        .add_condition(Condition::eq("status", "closed"))
        .set_condition_logic("AND(1,OR(2,3))")
        .add_sort_order("total", SortDirection::Desc);

    assert_eq!(fetch_totals(&session, &query), vec![30, 20]);
}

#[test]
fn test_default_conjunction_combines_all_conditions() {
    let (store, session) = setup();
    seed_orders(&store);

    let mut query = session.query("order");
    query
        .add_condition(Condition::eq("status", "open"))
        .add_condition(Condition::new("total", Operator::LessThan, 15));
    assert_eq!(fetch_totals(&session, &query), vec![10]);

    query.set_conjunction(Conjunction::Or).add_sort_order("total", SortDirection::Asc);
    assert_eq!(fetch_totals(&session, &query), vec![10, 20]);
}

#[test]
fn test_condition_groups_are_anded_onto_the_query() {
    let (store, session) = setup();
    seed_orders(&store);

    let mut recent = ConditionGroup::with_conjunction(Conjunction::Or);
    recent
        .add_condition(Condition::eq("status", "closed"))
        .add_condition(Condition::new("total", Operator::LessThan, 15));

    let mut query = session.query("order");
    query
        .add_condition(Condition::ne("status", "cancelled").required())
        .add_condition_group(recent)
        .add_sort_order("total", SortDirection::Asc);

    assert_eq!(fetch_totals(&session, &query), vec![10, 30]);
}

#[test]
fn test_not_equal_matches_records_missing_the_field() {
    let (store, session) = setup();
    seed_orders(&store);

    let mut loose = session.query("order");
    loose.add_condition(Condition::ne("status", "open"));
    assert_eq!(loose.fetch_total_count(&session).unwrap(), 2);

    let mut strict = session.query("order");
    strict.add_condition(Condition::ne("status", "open").required());
    assert_eq!(strict.fetch_total_count(&session).unwrap(), 1);
}

#[test]
fn test_sequence_value_with_single_value_operator_is_rejected() {
    let (_store, session) = setup();

    let condition = Condition::new("status", Operator::Equal, json!([1, 2]));
    assert!(matches!(condition.validate_values(), Err(OrmError::InvalidOperator { .. })));

    let mut query = session.query("order");
    query.add_condition(condition);
    assert!(matches!(query.fetch_ids(&session), Err(OrmError::InvalidOperator { .. })));
}

#[test]
fn test_malformed_logic_is_rejected() {
    let (_store, session) = setup();

    for logic in ["AND(1,2", "AND(1,2))", "NOT(1)"] {
        let mut query = session.query("order");
        query
            .add_condition(Condition::eq("status", "open"))
            .add_condition(Condition::eq("status", "closed"))
            .set_condition_logic(logic);
        assert!(
            matches!(query.fetch_ids(&session), Err(OrmError::InvalidQuery(_))),
            "logic {:?} should be rejected",
            logic
        );
    }
}

#[test]
fn test_range_and_total_count() {
    let (store, session) = setup();
    seed_orders(&store);

    let mut query = session.query("order");
    query.add_sort_order("total", SortDirection::Asc).set_range(1, 2);

    assert_eq!(fetch_totals(&session, &query), vec![20, 30]);
    assert_eq!(query.fetch_total_count(&session).unwrap(), 4);
    assert_eq!(store.stats().counts, 1);

    let first = query.fetch_single(&session).unwrap().unwrap();
    assert_eq!(first.get("total"), Some(&json!(20.0)));
}

#[test]
fn test_model_query_returns_forged_models() {
    let (store, session) = setup();
    seed_orders(&store);

    let mut query = session.model_query("Order").unwrap();
    query
        .add_condition(Condition::eq("status", "open"))
        .add_sort_order("total", SortDirection::Desc);

    let collection = query.fetch_collection(&session).unwrap();
    assert_eq!(collection.len(), 2);
    assert!(collection.models().iter().all(|m| m.model_type().name() == "Order"));

    let top = query.fetch_single_model(&session).unwrap().unwrap();
    assert_eq!(top.get_field("total"), Some(json!(20.0)));
}

#[test]
fn test_multi_model_query_spans_bundles() {
    let (store, session) = setup();
    store.seed(Record::new("node", "article").with_field("title", "News")).unwrap();
    store.seed(Record::new("node", "page").with_field("title", "About")).unwrap();
    store.seed(Record::new("node", "landing").with_field("title", "Home")).unwrap();

    let mut query = session.multi_model_query(&["Article", "Page"]).unwrap();
    query.add_sort_order("title", SortDirection::Asc);

    let collection = query.fetch_collection(&session).unwrap();
    assert!(collection.is_polymorphic());
    let types: Vec<_> = collection
        .models()
        .iter()
        .map(|m| m.model_type().name().to_string())
        .collect();
    assert_eq!(types, vec!["Page".to_string(), "Article".to_string()]);

    assert!(matches!(
        session.multi_model_query(&["Article", "User"]),
        Err(OrmError::Polymorphic(_))
    ));
}

#[test]
fn test_aggregate_query_groups_rows() {
    let (store, session) = setup();
    seed_orders(&store);

    let mut query = session.aggregate_query("order");
    query
        .add_group_by("status")
        .add_aggregate("total", AggregateFunction::Sum, "sum_total")
        .add_aggregate("id", AggregateFunction::Count, "orders");
    query.add_condition(Condition::new("total", Operator::LessThan, 35));

    let rows = query.fetch_rows(&session).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["status"], json!("open"));
    assert_eq!(rows[0]["sum_total"], json!(30));
    assert_eq!(rows[0]["orders"], json!(2));
    assert_eq!(rows[1]["status"], json!("closed"));
    assert_eq!(store.stats().aggregates, 1);
}

#[test]
fn test_access_policy_rewrites_tagged_queries() {
    let (store, session) = setup();
    seed_orders(&store);

    session.register_access_policy(Arc::new(FnAccessPolicy::new("open_only", |query: &mut StoreQuery| {
        query.condition("status", Operator::Equal, json!("open"));
        Ok(())
    })));

    let mut query = session.query("order");
    query.set_access_policy("open_only");
    assert_eq!(query.fetch_total_count(&session).unwrap(), 2);
    assert_eq!(query.fetch_ids(&session).unwrap().len(), 2);

    let mut unknown = session.query("order");
    unknown.set_access_policy("nobody");
    assert!(matches!(unknown.fetch_ids(&session), Err(OrmError::Configuration(_))));
}
