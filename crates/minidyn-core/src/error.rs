//! Conversions from engine errors to the client-facing [`DynamoDBError`].

use minidyn_model::error::DynamoDBError;

use crate::expression::ExpressionError;
use crate::storage::StorageError;
use crate::value::ValueError;

/// Convert a storage error into a DynamoDB validation error.
///
/// A missing key attribute becomes the `MissingKeys` validation error.
/// The storage error is kept as the source.
#[must_use]
pub fn storage_error_to_dynamodb(e: StorageError) -> DynamoDBError {
    let err = match &e {
        StorageError::MissingKeyAttribute { attr } => DynamoDBError::missing_keys(attr),
        _ => DynamoDBError::validation(e.to_string()),
    };
    err.with_source(e)
}

/// Convert an expression error into a DynamoDB validation error.
#[must_use]
pub fn expression_error_to_dynamodb(e: ExpressionError) -> DynamoDBError {
    DynamoDBError::validation(e.to_string()).with_source(e)
}

/// Convert a value conversion error into a DynamoDB validation error.
#[must_use]
pub fn value_error_to_dynamodb(e: ValueError) -> DynamoDBError {
    DynamoDBError::validation(e.to_string()).with_source(e)
}

/// Wrap an unexpected failure as `InternalServerError`.
#[must_use]
#[allow(clippy::needless_pass_by_value)]
pub fn internal_error_to_dynamodb(e: anyhow::Error) -> DynamoDBError {
    DynamoDBError::internal_error(format!("{e:#}"))
}
