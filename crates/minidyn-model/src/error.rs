//! The error every operation returns.
//!
//! Messages copy DynamoDB's wording so tests written against the real
//! service can match on them.

use std::error::Error as StdError;
use std::fmt;

use crate::types::CancellationReason;

const MISSING_KEYS_MESSAGE: &str = "One of the required keys was not given a value";

const FORCED_FAILURE_MESSAGE: &str = "forced failure response";

/// The DynamoDB exception names this engine can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum DynamoDBErrorCode {
    ResourceInUseException,
    ResourceNotFoundException,
    ConditionalCheckFailedException,
    TransactionCanceledException,
    #[default]
    ValidationException,
    InternalServerError,
}

impl DynamoDBErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceInUseException => "ResourceInUseException",
            Self::ResourceNotFoundException => "ResourceNotFoundException",
            Self::ConditionalCheckFailedException => "ConditionalCheckFailedException",
            Self::TransactionCanceledException => "TransactionCanceledException",
            Self::ValidationException => "ValidationException",
            Self::InternalServerError => "InternalServerError",
        }
    }
}

impl fmt::Display for DynamoDBErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed operation. Displays as `"<code>: <message>"`.
#[derive(Debug)]
pub struct DynamoDBError {
    pub code: DynamoDBErrorCode,
    pub message: String,
    /// What an HTTP front end should answer with: 500 for internal errors,
    /// 400 for everything else.
    pub status_code: http::StatusCode,
    /// One entry per transaction member, empty for every other code.
    pub cancellation_reasons: Vec<CancellationReason>,
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl fmt::Display for DynamoDBError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl StdError for DynamoDBError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn StdError + 'static))
    }
}

impl DynamoDBError {
    #[must_use]
    pub fn with_message(code: DynamoDBErrorCode, message: impl Into<String>) -> Self {
        let status_code = match code {
            DynamoDBErrorCode::InternalServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
            _ => http::StatusCode::BAD_REQUEST,
        };
        Self {
            code,
            message: message.into(),
            status_code,
            cancellation_reasons: Vec::new(),
            source: None,
        }
    }

    /// Keep the engine error this one was translated from.
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// True for the validation error raised when a key attribute is absent.
    #[must_use]
    pub fn is_missing_keys(&self) -> bool {
        self.code == DynamoDBErrorCode::ValidationException
            && self.message.starts_with(MISSING_KEYS_MESSAGE)
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_message(DynamoDBErrorCode::ValidationException, message)
    }

    #[must_use]
    pub fn missing_keys(detail: impl fmt::Display) -> Self {
        Self::validation(format!("{MISSING_KEYS_MESSAGE}: {detail}"))
    }

    #[must_use]
    pub fn resource_in_use(message: impl Into<String>) -> Self {
        Self::with_message(DynamoDBErrorCode::ResourceInUseException, message)
    }

    #[must_use]
    pub fn resource_not_found(message: impl Into<String>) -> Self {
        Self::with_message(DynamoDBErrorCode::ResourceNotFoundException, message)
    }

    #[must_use]
    pub fn table_not_found() -> Self {
        Self::resource_not_found("Cannot do operations on a non-existent table")
    }

    #[must_use]
    pub fn conditional_check_failed() -> Self {
        Self::with_message(
            DynamoDBErrorCode::ConditionalCheckFailedException,
            "The conditional request failed",
        )
    }

    /// The message lists every member's code in request order.
    #[must_use]
    pub fn transaction_canceled(reasons: Vec<CancellationReason>) -> Self {
        let codes = reasons
            .iter()
            .map(|r| r.code.as_deref().unwrap_or("None"))
            .collect::<Vec<_>>()
            .join(", ");
        let message = format!(
            "Transaction cancelled, please refer cancellation reasons for specific reasons [{codes}]"
        );
        Self {
            cancellation_reasons: reasons,
            ..Self::with_message(DynamoDBErrorCode::TransactionCanceledException, message)
        }
    }

    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::with_message(DynamoDBErrorCode::InternalServerError, message)
    }

    /// Returned by every operation while forced failure is switched on.
    #[must_use]
    pub fn forced_failure() -> Self {
        Self::internal_error(FORCED_FAILURE_MESSAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_display_code_and_message() {
        let err = DynamoDBError::table_not_found();
        assert_eq!(
            err.to_string(),
            "ResourceNotFoundException: Cannot do operations on a non-existent table"
        );
        assert_eq!(err.status_code, http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_should_answer_500_for_forced_failure() {
        let err = DynamoDBError::forced_failure();
        assert_eq!(err.status_code, http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, FORCED_FAILURE_MESSAGE);
    }

    #[test]
    fn test_should_recognize_missing_keys() {
        let err = DynamoDBError::missing_keys("id");
        assert!(err.is_missing_keys());
        assert!(!DynamoDBError::validation("other").is_missing_keys());
    }

    #[test]
    fn test_should_expose_source_error() {
        let cause = std::io::Error::other("disk gone");
        let err = DynamoDBError::internal_error("write failed").with_source(cause);
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("disk gone")
        );
        assert!(DynamoDBError::conditional_check_failed().source().is_none());
    }

    #[test]
    fn test_should_list_cancellation_codes() {
        let err = DynamoDBError::transaction_canceled(vec![
            CancellationReason::none(),
            CancellationReason::conditional_check_failed(),
        ]);
        assert_eq!(err.code, DynamoDBErrorCode::TransactionCanceledException);
        assert!(err.message.ends_with("[None, ConditionalCheckFailed]"));
        assert_eq!(err.cancellation_reasons.len(), 2);
    }
}
