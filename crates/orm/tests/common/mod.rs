//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use elif_graph_orm::{
    Cardinality, MemoryRecordStore, ModelRegistry, ModelType, OrmConfig, Record, RecordId, Relationship, Session,
    Violation,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

/// Shop and content model graph:
///
/// - `Customer` <- `Order.customer`, exposed back as `Customer.orders`
/// - `OrderLine.order` -> `Order`, exposed back as the cascading `Order.lines`
/// - `Order.tags` -> many `Tag`
/// - `Category.parent` / `Category.children` tree
/// - `Comment.subject` -> `Article | Page` (both entity type `node`)
pub fn registry() -> ModelRegistry {
    ModelRegistry::builder()
        .register(
            ModelType::new("Customer", "customer", "customer")
                .with_required_field("name")
                .with_relationship(Relationship::referenced("orders", "Order", "customer")),
        )
        .register(
            ModelType::new("Order", "order", "order")
                .with_relationship(Relationship::field("customer", "customer_ref", "Customer"))
                .with_relationship(Relationship::referenced("lines", "OrderLine", "order").cascading(true))
                .with_relationship(
                    Relationship::field("tags", "tag_refs", "Tag").with_cardinality(Cardinality::Multiple),
                )
                .with_validator(|record: &Record| match record.get("total").and_then(Value::as_f64) {
                    Some(total) if total < 0.0 => vec![Violation::new("total", "must not be negative")],
                    _ => Vec::new(),
                }),
        )
        .register(
            ModelType::new("OrderLine", "order_line", "order_line")
                .with_required_field("sku")
                .with_relationship(Relationship::parent_access_field("order", "order_ref", "Order")),
        )
        .register(ModelType::new("Tag", "tag", "tag"))
        .register(
            ModelType::new("Category", "category", "category")
                .with_relationship(Relationship::parent("parent", "parent_ref", "Category"))
                .with_relationship(Relationship::child("children", "Category", "parent")),
        )
        .register(
            ModelType::new("Article", "node", "article")
                .with_relationship(Relationship::referenced("comments", "Comment", "subject")),
        )
        .register(
            ModelType::new("Page", "node", "page")
                .with_relationship(Relationship::referenced("comments", "Comment", "subject")),
        )
        .register(
            ModelType::new("Comment", "comment", "comment")
                .with_relationship(Relationship::polymorphic_field("subject", "subject_ref", &["Article", "Page"])),
        )
        .register(ModelType::new("User", "user", "user"))
        .build()
        .expect("fixture registry is valid")
}

pub fn setup() -> (Arc<MemoryRecordStore>, Session) {
    setup_with(OrmConfig::default())
}

pub fn setup_with(config: OrmConfig) -> (Arc<MemoryRecordStore>, Session) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let store = Arc::new(MemoryRecordStore::new());
    let session = Session::with_config(store.clone(), Arc::new(registry()), config).expect("valid config");
    (store, session)
}

/// Foreign key value pointing at `id`
pub fn reference(id: &str) -> Value {
    json!({ "target_id": id })
}

pub fn seed_customer(store: &MemoryRecordStore, name: &str) -> RecordId {
    store
        .seed(Record::new("customer", "customer").with_field("name", name))
        .expect("seed customer")
}

pub fn seed_order(store: &MemoryRecordStore, customer: &str, status: &str, total: f64) -> RecordId {
    store
        .seed(
            Record::new("order", "order")
                .with_field("customer_ref", reference(customer))
                .with_field("status", status)
                .with_field("total", total),
        )
        .expect("seed order")
}

pub fn seed_line(store: &MemoryRecordStore, order: &str, sku: &str) -> RecordId {
    store
        .seed(
            Record::new("order_line", "order_line")
                .with_field("order_ref", reference(order))
                .with_field("sku", sku),
        )
        .expect("seed order line")
}
