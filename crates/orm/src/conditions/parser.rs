//! Parenthesis parser for condition logic expressions
//!
//! The grammar is flat: tokens separated by `(`, `)` and `,`. A word directly
//! followed by `(` becomes the head of the nested list, so
//! `"AND(1,2,OR(3,4))"` parses to `["AND", "1", "2", ["OR", "3", "4"]]`.

use std::mem;

use crate::error::{OrmError, OrmResult};

/// One element of a parsed logic expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicToken {
    Word(String),
    List(Vec<LogicToken>),
}

impl LogicToken {
    pub fn word(word: impl Into<String>) -> Self {
        LogicToken::Word(word.into())
    }

    pub fn list(tokens: Vec<LogicToken>) -> Self {
        LogicToken::List(tokens)
    }
}

/// Tokenizer for the positional AND/OR logic DSL
pub struct ParenthesisParser;

impl ParenthesisParser {
    /// Parse an expression into a nested token list
    pub fn parse(expression: &str) -> OrmResult<Vec<LogicToken>> {
        let mut stack: Vec<Vec<LogicToken>> = Vec::new();
        let mut current: Vec<LogicToken> = Vec::new();
        let mut pending = String::new();

        for (position, ch) in expression.chars().enumerate() {
            match ch {
                '(' => {
                    let mut next = Vec::new();
                    if !pending.is_empty() {
                        next.push(LogicToken::Word(mem::take(&mut pending)));
                    }
                    stack.push(mem::replace(&mut current, next));
                }
                ')' => {
                    flush(&mut pending, &mut current);
                    let parent = stack.pop().ok_or_else(|| {
                        OrmError::InvalidQuery(format!(
                            "unbalanced ')' at position {} in '{}'",
                            position, expression
                        ))
                    })?;
                    let finished = mem::replace(&mut current, parent);
                    current.push(LogicToken::List(finished));
                }
                ',' => flush(&mut pending, &mut current),
                c if c.is_whitespace() => {}
                c => pending.push(c),
            }
        }

        if !stack.is_empty() {
            return Err(OrmError::InvalidQuery(format!(
                "{} unclosed '(' in '{}'",
                stack.len(),
                expression
            )));
        }
        flush(&mut pending, &mut current);

        // Strip enclosing wrappers: "(1,2)" and "AND(...)" both describe one list
        while let [LogicToken::List(_)] = current.as_slice() {
            if let Some(LogicToken::List(inner)) = current.pop() {
                current = inner;
            }
        }

        Ok(current)
    }
}

fn flush(pending: &mut String, current: &mut Vec<LogicToken>) {
    if !pending.is_empty() {
        current.push(LogicToken::Word(mem::take(pending)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(s: &str) -> LogicToken {
        LogicToken::word(s)
    }

    #[test]
    fn test_nested_expression() {
        let parsed = ParenthesisParser::parse("AND(1,2,OR(3,4))").unwrap();
        assert_eq!(
            parsed,
            vec![
                w("AND"),
                w("1"),
                w("2"),
                LogicToken::list(vec![w("OR"), w("3"), w("4")]),
            ]
        );
    }

    #[test]
    fn test_empty_expression() {
        assert_eq!(ParenthesisParser::parse("").unwrap(), Vec::<LogicToken>::new());
        assert_eq!(ParenthesisParser::parse("   ").unwrap(), Vec::<LogicToken>::new());
    }

    #[test]
    fn test_redundant_outer_parens_are_stripped() {
        assert_eq!(ParenthesisParser::parse("(1,2)").unwrap(), vec![w("1"), w("2")]);
        assert_eq!(
            ParenthesisParser::parse("((OR(1, 2)))").unwrap(),
            vec![w("OR"), w("1"), w("2")]
        );
    }

    #[test]
    fn test_whitespace_is_ignored() {
        assert_eq!(
            ParenthesisParser::parse(" OR ( 1 , 2 ) ").unwrap(),
            vec![w("OR"), w("1"), w("2")]
        );
    }

    #[test]
    fn test_unbalanced_parens_are_errors() {
        assert!(matches!(
            ParenthesisParser::parse("AND(1,2"),
            Err(OrmError::InvalidQuery(_))
        ));
        assert!(matches!(
            ParenthesisParser::parse("AND(1,2))"),
            Err(OrmError::InvalidQuery(_))
        ));
        assert!(ParenthesisParser::parse(")(").is_err());
    }
}
