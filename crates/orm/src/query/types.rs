//! Query Types - Core types and enums shared by queries and the record store

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OrmError;

/// How the entries of a predicate group are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Conjunction {
    #[default]
    And,
    Or,
}

impl Conjunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

impl fmt::Display for Conjunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Conjunction {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AND" => Ok(Conjunction::And),
            "OR" => Ok(Conjunction::Or),
            other => Err(OrmError::InvalidQuery(format!(
                "unknown conjunction '{}', expected AND or OR",
                other
            ))),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Aggregate functions supported by aggregate queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Count => write!(f, "COUNT"),
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Min => write!(f, "MIN"),
            AggregateFunction::Max => write!(f, "MAX"),
            AggregateFunction::Avg => write!(f, "AVG"),
        }
    }
}

/// One aggregate expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub field: String,
    pub function: AggregateFunction,
    pub alias: String,
}

/// The aggregate expressions and grouping of an aggregate query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub aggregates: Vec<Aggregate>,
    pub group_by: Vec<String>,
}

/// One aggregated row, keyed by group field names and aggregate aliases
pub type AggregateRow = IndexMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conjunction_parsing() {
        assert_eq!("and".parse::<Conjunction>().unwrap(), Conjunction::And);
        assert_eq!(" OR ".parse::<Conjunction>().unwrap(), Conjunction::Or);
        assert!("XOR".parse::<Conjunction>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Conjunction::Or.to_string(), "OR");
        assert_eq!(SortDirection::Desc.to_string(), "DESC");
        assert_eq!(AggregateFunction::Avg.to_string(), "AVG");
    }
}
