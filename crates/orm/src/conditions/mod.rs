//! Query Conditions
//!
//! Single predicates, condition groups and the positional AND/OR logic
//! compiler that turns them into store predicate trees.

pub mod condition;
pub mod group;
pub mod logic;
pub mod parser;

pub use condition::*;
pub use group::*;
pub use logic::*;
pub use parser::*;
