//! Typed logic expression tree compiled from the positional AND/OR DSL

use crate::error::{OrmError, OrmResult};
use crate::query::Conjunction;

use super::parser::{LogicToken, ParenthesisParser};

/// Compiled logic: leaves are 0-based condition indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicExpr {
    Condition(usize),
    Group {
        conjunction: Conjunction,
        children: Vec<LogicExpr>,
    },
}

impl LogicExpr {
    /// Build the logic used when none is given: `"AND(1,2,...,N)"`
    pub fn default_logic(conjunction: Conjunction, condition_count: usize) -> String {
        let indices = (1..=condition_count)
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!("{}({})", conjunction, indices)
    }

    /// Parse and compile an expression against `condition_count` declared conditions.
    ///
    /// Returns the expressions that apply directly to the base group. Indices
    /// outside `1..=condition_count` are dropped.
    pub fn compile(expression: &str, condition_count: usize) -> OrmResult<Vec<LogicExpr>> {
        if expression.trim().is_empty() {
            return Err(OrmError::InvalidQuery(
                "condition logic cannot be empty".to_string(),
            ));
        }

        let tokens = ParenthesisParser::parse(expression)?;
        if tokens.is_empty() {
            return Err(OrmError::InvalidQuery(format!(
                "condition logic '{}' contains no tokens",
                expression
            )));
        }

        let mut base = Vec::new();
        compile_tokens(&tokens, condition_count, &mut base)?;
        tracing::trace!("Compiled condition logic '{}' into {:?}", expression, base);
        Ok(base)
    }

    /// Condition indices referenced by this expression, in walk order
    pub fn condition_indices(&self) -> Vec<usize> {
        match self {
            LogicExpr::Condition(index) => vec![*index],
            LogicExpr::Group { children, .. } => children
                .iter()
                .flat_map(|child| child.condition_indices())
                .collect(),
        }
    }
}

fn compile_tokens(tokens: &[LogicToken], condition_count: usize, base: &mut Vec<LogicExpr>) -> OrmResult<()> {
    let mut open: Option<(Conjunction, Vec<LogicExpr>)> = None;

    for token in tokens {
        match token {
            LogicToken::Word(word) => {
                if let Ok(conjunction) = word.parse::<Conjunction>() {
                    flush(open.take(), base);
                    open = Some((conjunction, Vec::new()));
                    continue;
                }

                let index = word.parse::<usize>().map_err(|_| {
                    OrmError::InvalidQuery(format!("unexpected token '{}' in condition logic", word))
                })?;

                if index == 0 || index > condition_count {
                    tracing::trace!(
                        "Ignoring condition index {} (only {} conditions declared)",
                        index,
                        condition_count
                    );
                    continue;
                }

                let target = match open.as_mut() {
                    Some((_, children)) => children,
                    None => &mut *base,
                };
                target.push(LogicExpr::Condition(index - 1));
            }
            LogicToken::List(block) => {
                let Some((_, children)) = open.as_mut() else {
                    return Err(OrmError::InvalidQuery(
                        "parenthesized block must follow AND or OR".to_string(),
                    ));
                };
                compile_tokens(block, condition_count, children)?;
            }
        }
    }

    flush(open, base);
    Ok(())
}

fn flush(open: Option<(Conjunction, Vec<LogicExpr>)>, base: &mut Vec<LogicExpr>) {
    if let Some((conjunction, children)) = open {
        // A group whose indices were all dropped constrains nothing
        if !children.is_empty() {
            base.push(LogicExpr::Group {
                conjunction,
                children,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(conjunction: Conjunction, children: Vec<LogicExpr>) -> LogicExpr {
        LogicExpr::Group {
            conjunction,
            children,
        }
    }

    #[test]
    fn test_default_logic() {
        assert_eq!(LogicExpr::default_logic(Conjunction::And, 3), "AND(1,2,3)");
        assert_eq!(LogicExpr::default_logic(Conjunction::Or, 1), "OR(1)");
    }

    #[test]
    fn test_nested_compile() {
        let compiled = LogicExpr::compile("AND(1,2,OR(3,4))", 4).unwrap();
        assert_eq!(
            compiled,
            vec![group(
                Conjunction::And,
                vec![
                    LogicExpr::Condition(0),
                    LogicExpr::Condition(1),
                    group(
                        Conjunction::Or,
                        vec![LogicExpr::Condition(2), LogicExpr::Condition(3)]
                    ),
                ]
            )]
        );
    }

    #[test]
    fn test_out_of_range_indices_are_ignored() {
        let compiled = LogicExpr::compile("OR(1,3,4)", 3).unwrap();
        assert_eq!(
            compiled,
            vec![group(
                Conjunction::Or,
                vec![LogicExpr::Condition(0), LogicExpr::Condition(2)]
            )]
        );

        // A group left empty by dropped indices disappears
        let compiled = LogicExpr::compile("AND(1,OR(7,8))", 2).unwrap();
        assert_eq!(
            compiled,
            vec![group(Conjunction::And, vec![LogicExpr::Condition(0)])]
        );
    }

    #[test]
    fn test_repeated_index_is_kept() {
        let compiled = LogicExpr::compile("OR(AND(1,2),AND(1,3))", 3).unwrap();
        let indices: Vec<usize> = compiled.iter().flat_map(|e| e.condition_indices()).collect();
        assert_eq!(indices, vec![0, 1, 0, 2]);
    }

    #[test]
    fn test_block_without_conjunction_is_an_error() {
        assert!(matches!(
            LogicExpr::compile("AND(1,2),OR(3)", 3),
            Err(OrmError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_invalid_tokens() {
        assert!(LogicExpr::compile("XOR(1,2)", 2).is_err());
        assert!(LogicExpr::compile("", 2).is_err());
        assert!(LogicExpr::compile("()", 2).is_err());
    }
}
