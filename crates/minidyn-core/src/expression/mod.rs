//! The expression language: condition, key-condition, filter, update and
//! projection expressions.
//!
//! The pipeline is:
//!
//! 1. **Lexing**: [`lexer::Lexer`] yields tokens lazily.
//! 2. **Parsing**: [`parser`] builds an [`Expr`] or [`UpdateExpression`] by
//!    recursive descent with one token of lookahead.
//! 3. **Validation**: [`tree::ConditionTree`] checks the shape of key
//!    conditions.
//! 4. **Evaluation**: [`evaluator::Environment`] tests conditions, applies
//!    updates and projects attributes.

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod tree;

pub use ast::{AttributePath, CompareOp, Expr, PathElement, UpdateExpression};
pub use error::{ExpressionError, SyntaxError};
pub use evaluator::{Environment, Step};
pub use functions::FunctionName;
pub use parser::{parse_condition, parse_projection, parse_update};
pub use tree::{ConditionTree, KeyClause, validate_key_condition};
