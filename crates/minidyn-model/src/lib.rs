//! Data shapes for minidyn, the in-memory DynamoDB engine.
//!
//! Requests go in as the `input` structs and come back as the `output`
//! structs or a [`DynamoDBError`]. Items are maps of [`AttributeValue`].
//! Everything derives serde in DynamoDB's JSON shape, so a network front end
//! can decode straight into these types.
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(missing_docs)]

pub mod attribute_value;
pub mod error;
pub mod input;
pub mod operations;
pub mod output;
pub mod types;

pub use attribute_value::AttributeValue;
pub use error::{DynamoDBError, DynamoDBErrorCode};
pub use operations::Operation;
