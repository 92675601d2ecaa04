//! An in-memory DynamoDB engine.
//!
//! [`MiniDyn`] is the client: it owns the tables, evaluates condition,
//! filter, update and projection expressions through the active
//! [`Interpreter`], serves queries and scans with DynamoDB pagination
//! semantics and commits multi-table transactions atomically.
#![allow(missing_docs, clippy::doc_markdown, clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod expression;
pub mod fault;
pub mod interpreter;
pub mod logging;
pub mod provider;
pub mod query;
pub mod state;
pub mod storage;
pub mod transaction;
pub mod value;

pub use config::{InterpreterKind, MiniDynConfig};
pub use fault::FailureCondition;
pub use interpreter::{Interpreter, LanguageInterpreter, NativeInterpreter};
pub use logging::init_tracing;
pub use provider::MiniDyn;
pub use value::{Item, Number, Value};
