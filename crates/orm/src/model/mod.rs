//! Model System - in-memory handles over persisted records
//!
//! - `core_model`: identity, field access, relationship get/fetch/put
//! - `persistence`: save, delete and validation
//! - `related`: what a relationship resolves to
//! - `validation`: violation reporting

pub mod core_model;
pub mod persistence;
pub mod related;
pub mod validation;

pub(crate) use core_model::ModelInner;
pub use core_model::Model;
pub use related::Related;
pub use validation::{Violation, ViolationList, NOT_BLANK_MESSAGE};
