//! Fault injection for exercising client retry logic.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use minidyn_model::Operation;
use minidyn_model::error::DynamoDBError;

use crate::config::MiniDynConfig;

/// An error every data-plane operation reports until cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureCondition {
    #[default]
    None,
    /// Fail with `InternalServerError`.
    InternalServerError,
    /// Fail as if the table had been removed.
    DeprecatedTable,
}

/// Test-only switches consulted before every data-plane operation.
#[derive(Debug, Default)]
pub struct FaultInjector {
    force_failure: AtomicBool,
    return_unprocessed_items: AtomicBool,
    condition: RwLock<FailureCondition>,
}

impl FaultInjector {
    #[must_use]
    pub fn from_config(config: &MiniDynConfig) -> Self {
        Self {
            force_failure: AtomicBool::new(config.force_failure),
            return_unprocessed_items: AtomicBool::new(config.return_unprocessed_items),
            condition: RwLock::new(FailureCondition::None),
        }
    }

    pub fn set_force_failure(&self, on: bool) {
        self.force_failure.store(on, Ordering::SeqCst);
    }

    pub fn set_return_unprocessed_items(&self, on: bool) {
        self.return_unprocessed_items.store(on, Ordering::SeqCst);
    }

    #[must_use]
    pub fn return_unprocessed_items(&self) -> bool {
        self.return_unprocessed_items.load(Ordering::SeqCst)
    }

    pub fn emulate(&self, condition: FailureCondition) {
        *self.condition.write() = condition;
    }

    #[must_use]
    pub fn condition(&self) -> FailureCondition {
        *self.condition.read()
    }

    /// Fail `operation` if a fault is armed. Table management is never
    /// affected.
    pub fn check(&self, operation: Operation) -> Result<(), DynamoDBError> {
        if !operation.is_data_plane() {
            return Ok(());
        }
        if self.force_failure.load(Ordering::SeqCst) {
            warn!(operation = %operation, "forced failure");
            return Err(DynamoDBError::forced_failure());
        }
        match self.condition() {
            FailureCondition::None => Ok(()),
            FailureCondition::InternalServerError => {
                warn!(operation = %operation, "emulated internal server error");
                Err(DynamoDBError::internal_error("emulated internal server error"))
            }
            FailureCondition::DeprecatedTable => {
                warn!(operation = %operation, "emulated deprecated table");
                Err(DynamoDBError::table_not_found())
            }
        }
    }
}
