//! Error types for expression parsing and evaluation.

use crate::value::{NumberError, ValueError};

/// The lexer or parser could not structure an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    /// A character outside the expression alphabet.
    #[error("Invalid expression: illegal token {literal:?} at position {position}")]
    IllegalToken {
        /// The offending text.
        literal: String,
        /// Byte offset in the expression.
        position: usize,
    },
    /// A token that does not fit the grammar at this point.
    #[error("Invalid expression: expected {expected}, found {found:?} at position {position}")]
    UnexpectedToken {
        /// What the grammar required.
        expected: String,
        /// What the lexer produced.
        found: String,
        /// Byte offset in the expression.
        position: usize,
    },
    /// The expression ended in the middle of a construct.
    #[error("Invalid expression: unexpected end of expression, expected {expected}")]
    UnexpectedEof {
        /// What the grammar required.
        expected: String,
    },
    /// Blank expression text.
    #[error("Invalid expression: the expression can not be empty")]
    Empty,
    /// Expression text longer than DynamoDB accepts.
    #[error("Invalid expression: Expression size has exceeded the maximum allowed size; size: {0}")]
    TooLong(usize),
    /// Groups, `NOT` or function calls nested past the parser's limit.
    #[error("Invalid expression: The expression is nested too deeply; depth limit: {0}")]
    TooDeep(usize),
    /// An update keyword used twice.
    #[error(
        "Invalid UpdateExpression: The \"{0}\" section can only be used once in an update expression"
    )]
    DuplicateClause(&'static str),
}

/// A parsed expression could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    /// Parsing failed.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    /// `#name` missing from the attribute name map.
    #[error(
        "An expression attribute name used in the document path is not defined; attribute name: {0}"
    )]
    UnresolvedName(String),
    /// `:name` missing from the attribute value map.
    #[error(
        "An expression attribute value used in expression is not defined; attribute value: {0}"
    )]
    UnresolvedValue(String),
    /// The key condition has a shape the index lookup cannot use.
    #[error("Invalid KeyConditionExpression: {0}")]
    InvalidKeyCondition(String),
    /// A function or operator received operands it does not support.
    #[error("Invalid expression: {0}")]
    Evaluation(String),
    /// A condition produced something other than a boolean.
    #[error("Invalid expression: the expression must evaluate to a boolean, got {0}")]
    NotBoolean(&'static str),
    /// An update action could not be applied to the item.
    #[error("Invalid UpdateExpression: {0}")]
    InvalidUpdate(String),
    /// The native interpreter has no handler for this text.
    #[error("unhandled expression: table={table} expression={expression:?}")]
    Unhandled {
        /// Table the expression was issued against.
        table: String,
        /// The exact expression text.
        expression: String,
    },
    /// An arithmetic result outside the number range.
    #[error(transparent)]
    Number(#[from] NumberError),
    /// A placeholder value that cannot be converted.
    #[error(transparent)]
    Value(#[from] ValueError),
}
