//! Condition groups: ordered conditions combined by an optional logic expression

use crate::error::OrmResult;
use crate::query::Conjunction;
use crate::record::PredicateGroup;

use super::condition::Condition;
use super::logic::LogicExpr;

/// An entry of a condition group, addressed by its 1-based position
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionEntry {
    Condition(Condition),
    Group(ConditionGroup),
}

impl From<Condition> for ConditionEntry {
    fn from(condition: Condition) -> Self {
        ConditionEntry::Condition(condition)
    }
}

impl From<ConditionGroup> for ConditionEntry {
    fn from(group: ConditionGroup) -> Self {
        ConditionEntry::Group(group)
    }
}

/// A logically composed set of conditions
///
/// Without explicit logic every entry is combined with the group's default
/// conjunction, in insertion order:
///
/// ```
/// use elif_graph_orm::{Condition, ConditionGroup, PredicateGroup};
///
/// let mut group = ConditionGroup::new();
/// group
///     .add_condition(Condition::eq("status", "open"))
///     .add_condition(Condition::eq("status", "pending"))
///     .add_condition(Condition::eq("priority", "high"))
///     .set_logic("AND(OR(1,2),3)");
///
/// let mut target = PredicateGroup::and();
/// group.apply_conditions_on(&mut target).unwrap();
/// assert_eq!(target.predicates().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionGroup {
    entries: Vec<ConditionEntry>,
    logic: Option<String>,
    conjunction: Conjunction,
}

impl ConditionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a group whose entries are combined with `conjunction` when no logic is set
    pub fn with_conjunction(conjunction: Conjunction) -> Self {
        Self {
            conjunction,
            ..Self::default()
        }
    }

    pub fn add_condition(&mut self, condition: Condition) -> &mut Self {
        self.entries.push(ConditionEntry::Condition(condition));
        self
    }

    pub fn add_condition_group(&mut self, group: ConditionGroup) -> &mut Self {
        self.entries.push(ConditionEntry::Group(group));
        self
    }

    pub fn set_logic(&mut self, logic: impl Into<String>) -> &mut Self {
        self.logic = Some(logic.into());
        self
    }

    pub fn clear_logic(&mut self) -> &mut Self {
        self.logic = None;
        self
    }

    pub fn set_conjunction(&mut self, conjunction: Conjunction) -> &mut Self {
        self.conjunction = conjunction;
        self
    }

    pub fn logic(&self) -> Option<&str> {
        self.logic.as_deref()
    }

    pub fn conjunction(&self) -> Conjunction {
        self.conjunction
    }

    pub fn entries(&self) -> &[ConditionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compile the logic (explicit or synthesized) into a typed tree
    pub fn compile(&self) -> OrmResult<Vec<LogicExpr>> {
        let logic = match &self.logic {
            Some(logic) => logic.clone(),
            None => LogicExpr::default_logic(self.conjunction, self.entries.len()),
        };
        LogicExpr::compile(&logic, self.entries.len())
    }

    /// Compile this group onto a store predicate group
    pub fn apply_conditions_on(&self, target: &mut PredicateGroup) -> OrmResult<()> {
        if self.entries.is_empty() && self.logic.is_none() {
            return Ok(());
        }

        let compiled = self.compile()?;
        self.apply_expressions(&compiled, target)
    }

    fn apply_expressions(&self, expressions: &[LogicExpr], target: &mut PredicateGroup) -> OrmResult<()> {
        for expression in expressions {
            match expression {
                LogicExpr::Condition(index) => match &self.entries[*index] {
                    ConditionEntry::Condition(condition) => condition.apply_on(target)?,
                    ConditionEntry::Group(group) => group.apply_conditions_on(target)?,
                },
                LogicExpr::Group {
                    conjunction,
                    children,
                } => {
                    let mut subgroup = PredicateGroup::new(*conjunction);
                    self.apply_expressions(children, &mut subgroup)?;
                    target.add_group(subgroup);
                }
            }
        }
        Ok(())
    }
}
