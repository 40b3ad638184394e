//! A single `(field, operator, value)` predicate

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OrmError, OrmResult};
use crate::record::{PredicateGroup, BUNDLE_FIELD, ID_FIELD};

/// Condition operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    Contains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Between,
}

impl Operator {
    pub const SINGLE_VALUE: [Operator; 10] = [
        Operator::Equal,
        Operator::NotEqual,
        Operator::GreaterThan,
        Operator::GreaterThanOrEqual,
        Operator::LessThan,
        Operator::LessThanOrEqual,
        Operator::Like,
        Operator::Contains,
        Operator::StartsWith,
        Operator::EndsWith,
    ];

    pub const MULTI_VALUE: [Operator; 3] = [Operator::In, Operator::NotIn, Operator::Between];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "<>",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::Like => "LIKE",
            Operator::Contains => "CONTAINS",
            Operator::StartsWith => "STARTS_WITH",
            Operator::EndsWith => "ENDS_WITH",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Between => "BETWEEN",
        }
    }

    /// Returns true if the operator takes a sequence of values
    pub fn is_multi_value(&self) -> bool {
        Self::MULTI_VALUE.contains(self)
    }

    /// Returns true for the negative operators that must also match absent fields
    pub fn is_negation(&self) -> bool {
        matches!(self, Operator::NotEqual | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operator {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        Self::SINGLE_VALUE
            .iter()
            .chain(Self::MULTI_VALUE.iter())
            .find(|op| op.as_str() == normalized)
            .copied()
            .or(match normalized.as_str() {
                "!=" => Some(Operator::NotEqual),
                _ => None,
            })
            .ok_or_else(|| OrmError::InvalidOperator {
                field: String::new(),
                operator: s.to_string(),
                message: "unknown operator".to_string(),
            })
    }
}

/// A single predicate against one field of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    field: String,
    operator: Operator,
    value: Value,
    field_may_be_absent: bool,
}

impl Condition {
    /// Create a new condition; arity is checked by `validate_values`
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        let field = field.into();
        let field_may_be_absent = field != ID_FIELD && field != BUNDLE_FIELD;
        Self {
            field,
            operator,
            value: value.into(),
            field_may_be_absent,
        }
    }

    /// Create a condition from a textual operator such as `"NOT IN"`
    pub fn parse(field: impl Into<String>, operator: &str, value: impl Into<Value>) -> OrmResult<Self> {
        let field = field.into();
        let operator = operator.parse::<Operator>().map_err(|_| OrmError::InvalidOperator {
            field: field.clone(),
            operator: operator.to_string(),
            message: "unknown operator".to_string(),
        })?;
        Ok(Self::new(field, operator, value))
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Equal, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::NotEqual, value)
    }

    pub fn in_list<T: Into<Value>>(field: impl Into<String>, values: Vec<T>) -> Self {
        Self::new(field, Operator::In, values_array(values))
    }

    pub fn not_in<T: Into<Value>>(field: impl Into<String>, values: Vec<T>) -> Self {
        Self::new(field, Operator::NotIn, values_array(values))
    }

    pub fn between<T: Into<Value>>(field: impl Into<String>, low: T, high: T) -> Self {
        Self::new(field, Operator::Between, Value::Array(vec![low.into(), high.into()]))
    }

    /// Mark the field as always present, disabling the absent-field match of `<>` and `NOT IN`
    pub fn required(mut self) -> Self {
        self.field_may_be_absent = false;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<Value>) -> &mut Self {
        self.value = value.into();
        self
    }

    pub fn set_operator(&mut self, operator: Operator) -> &mut Self {
        self.operator = operator;
        self
    }

    pub fn field_may_be_absent(&self) -> bool {
        self.field_may_be_absent
    }

    /// Check that the value cardinality matches the operator
    pub fn validate_values(&self) -> OrmResult<()> {
        let is_sequence = self.value.is_array();

        if is_sequence && !self.operator.is_multi_value() {
            return Err(self.operator_error(format!(
                "a list of values requires one of {}",
                operator_list(&Operator::MULTI_VALUE)
            )));
        }

        if !is_sequence && self.operator.is_multi_value() {
            return Err(self.operator_error("a single value cannot be used with a multi-value operator".to_string()));
        }

        if self.operator == Operator::Between {
            let len = self.value.as_array().map(|v| v.len()).unwrap_or(0);
            if len != 2 {
                return Err(self.operator_error(format!(
                    "BETWEEN requires exactly 2 values, got {}",
                    len
                )));
            }
        }

        Ok(())
    }

    /// Add this condition to a store predicate group
    pub fn apply_on(&self, target: &mut PredicateGroup) -> OrmResult<()> {
        self.validate_values()?;

        if self.operator.is_negation() && self.field_may_be_absent {
            // A missing field is neither equal to nor in anything
            let mut either = PredicateGroup::or();
            either.condition(&self.field, self.operator, self.value.clone());
            either.not_exists(&self.field);
            target.add_group(either);
        } else {
            target.condition(&self.field, self.operator, self.value.clone());
        }

        Ok(())
    }

    fn operator_error(&self, message: String) -> OrmError {
        OrmError::InvalidOperator {
            field: self.field.clone(),
            operator: self.operator.to_string(),
            message,
        }
    }
}

fn values_array<T: Into<Value>>(values: Vec<T>) -> Value {
    Value::Array(values.into_iter().map(Into::into).collect())
}

fn operator_list(operators: &[Operator]) -> String {
    operators
        .iter()
        .map(|op| op.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
