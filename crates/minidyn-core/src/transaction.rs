//! `TransactWriteItems`: all-or-nothing writes across tables.
//!
//! Every table the transaction touches is write-locked in table-name order,
//! so two transactions over overlapping tables cannot deadlock. Conditions
//! and updates are evaluated against the state before the transaction; only
//! when every operation passes are the writes applied.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info};

use minidyn_model::Operation;
use minidyn_model::error::DynamoDBError;
use minidyn_model::input::TransactWriteItemsInput;
use minidyn_model::output::TransactWriteItemsOutput;
use minidyn_model::types::{CancellationReason, TransactWriteItem};

use crate::error::storage_error_to_dynamodb;
use crate::provider::{MiniDyn, to_item};
use crate::storage::{PrimaryKey, TableData};
use crate::value::{Item, Value};

/// Maximum number of operations in one transaction.
const MAX_TRANSACT_ITEMS: usize = 100;

/// What a transaction operation does to its item.
#[derive(Debug, Clone)]
enum Action {
    Put,
    Update(String),
    Delete,
    ConditionCheck,
}

/// One operation of a transaction, converted to engine values.
#[derive(Debug)]
struct TransactOp {
    table_name: String,
    action: Action,
    /// The full item for a put, the key otherwise.
    item: Item,
    condition: Option<String>,
    names: HashMap<String, String>,
    values: HashMap<String, Value>,
}

impl TransactOp {
    fn from_request(request: TransactWriteItem) -> Result<Self, DynamoDBError> {
        let op = match (
            request.put,
            request.update,
            request.delete,
            request.condition_check,
        ) {
            (Some(put), None, None, None) => Self {
                action: Action::Put,
                item: to_item(&put.item)?,
                values: to_item(&put.expression_attribute_values)?,
                table_name: put.table_name,
                condition: put.condition_expression,
                names: put.expression_attribute_names,
            },
            (None, Some(update), None, None) => Self {
                action: Action::Update(update.update_expression),
                item: to_item(&update.key)?,
                values: to_item(&update.expression_attribute_values)?,
                table_name: update.table_name,
                condition: update.condition_expression,
                names: update.expression_attribute_names,
            },
            (None, None, Some(delete), None) => Self {
                action: Action::Delete,
                item: to_item(&delete.key)?,
                values: to_item(&delete.expression_attribute_values)?,
                table_name: delete.table_name,
                condition: delete.condition_expression,
                names: delete.expression_attribute_names,
            },
            (None, None, None, Some(check)) => Self {
                action: Action::ConditionCheck,
                item: to_item(&check.key)?,
                values: to_item(&check.expression_attribute_values)?,
                table_name: check.table_name,
                condition: Some(check.condition_expression),
                names: check.expression_attribute_names,
            },
            _ => {
                return Err(DynamoDBError::validation(
                    "TransactItems can only contain one of Check, Put, Update or Delete",
                ));
            }
        };
        Ok(op)
    }

    /// The primary key this operation targets.
    fn key(&self, data: &TableData) -> Result<PrimaryKey, DynamoDBError> {
        match self.action {
            Action::Put => data.validate(&self.item),
            _ => data.key_schema.parse_key(&self.item),
        }
        .map_err(storage_error_to_dynamodb)
    }
}

/// The write an operation resolves to once its checks pass.
enum Write {
    Put(Item),
    Delete(PrimaryKey),
    Nothing,
}

impl MiniDyn {
    /// Handle `TransactWriteItems`.
    pub fn transact_write_items(
        &self,
        input: TransactWriteItemsInput,
    ) -> Result<TransactWriteItemsOutput, DynamoDBError> {
        self.check_faults(Operation::TransactWriteItems)?;
        let count = input.transact_items.len();
        if !(1..=MAX_TRANSACT_ITEMS).contains(&count) {
            return Err(DynamoDBError::validation(format!(
                "1 validation error detected: Value at 'transactItems' failed to satisfy \
                 constraint: Member must have length between 1 and {MAX_TRANSACT_ITEMS}"
            )));
        }
        let ops = input
            .transact_items
            .into_iter()
            .map(TransactOp::from_request)
            .collect::<Result<Vec<_>, _>>()?;

        let tables = ops
            .iter()
            .map(|op| {
                self.state
                    .require_table(&op.table_name)
                    .map(|t| (op.table_name.clone(), t))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        let mut guards: BTreeMap<&str, _> = tables
            .iter()
            .map(|(name, table)| (name.as_str(), table.write()))
            .collect();

        let mut seen = HashSet::new();
        let mut keys = Vec::with_capacity(ops.len());
        for op in &ops {
            let key = op.key(&guards[op.table_name.as_str()])?;
            if !seen.insert((op.table_name.as_str(), key.clone())) {
                return Err(DynamoDBError::validation(
                    "Transaction request cannot include multiple operations on one item",
                ));
            }
            keys.push(key);
        }

        let mut reasons = Vec::with_capacity(ops.len());
        let mut writes = Vec::with_capacity(ops.len());
        for (op, key) in ops.iter().zip(keys) {
            let data = &guards[op.table_name.as_str()];
            match self.check(op, key, data) {
                Ok(write) => {
                    reasons.push(CancellationReason::none());
                    writes.push(write);
                }
                Err(reason) => {
                    reasons.push(reason);
                    writes.push(Write::Nothing);
                }
            }
        }
        if reasons.iter().any(|r| *r != CancellationReason::none()) {
            debug!(operations = count, "transaction canceled");
            return Err(DynamoDBError::transaction_canceled(reasons));
        }

        for (op, write) in ops.iter().zip(writes) {
            let Some(data) = guards.get_mut(op.table_name.as_str()) else {
                continue;
            };
            match write {
                Write::Put(item) => {
                    data.put(item).map_err(storage_error_to_dynamodb)?;
                }
                Write::Delete(key) => {
                    data.delete(&key);
                }
                Write::Nothing => {}
            }
        }
        info!(operations = count, tables = guards.len(), "transaction committed");
        Ok(TransactWriteItemsOutput {})
    }

    /// Evaluate one operation against the state before the transaction.
    fn check(
        &self,
        op: &TransactOp,
        key: PrimaryKey,
        data: &TableData,
    ) -> Result<Write, CancellationReason> {
        let current = data.get(&key);
        let passed = self
            .condition_holds(
                &op.table_name,
                op.condition.as_deref(),
                current,
                &op.names,
                &op.values,
            )
            .map_err(|e| CancellationReason::validation_error(e.to_string()))?;
        if !passed {
            return Err(CancellationReason::conditional_check_failed());
        }

        match &op.action {
            Action::Put => Ok(Write::Put(op.item.clone())),
            Action::Delete => Ok(Write::Delete(key)),
            Action::ConditionCheck => Ok(Write::Nothing),
            Action::Update(expression) => {
                let base = current.cloned().unwrap_or_else(|| op.item.clone());
                let updated = self
                    .updated_item(
                        &op.table_name,
                        &data.key_schema,
                        expression,
                        &base,
                        &op.names,
                        &op.values,
                    )
                    .map_err(|e| CancellationReason::validation_error(e.message))?;
                data.validate(&updated)
                    .map_err(|e| CancellationReason::validation_error(e.to_string()))?;
                Ok(Write::Put(updated))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use minidyn_model::DynamoDBErrorCode;
    use minidyn_model::attribute_value::AttributeValue;
    use minidyn_model::input::{CreateTableInput, GetItemInput, PutItemInput};
    use minidyn_model::types::{
        AttributeDefinition, BillingMode, ConditionCheck, KeySchemaElement, ScalarAttributeType,
        TransactDelete, TransactPut, TransactUpdate,
    };

    use super::*;

    fn s(v: &str) -> AttributeValue {
        AttributeValue::S(v.to_owned())
    }

    fn key(id: &str) -> HashMap<String, AttributeValue> {
        HashMap::from([("id".to_owned(), s(id))])
    }

    fn setup() -> MiniDyn {
        let client = MiniDyn::default();
        for name in ["pokemons", "trainers"] {
            client
                .create_table(CreateTableInput {
                    table_name: name.to_owned(),
                    key_schema: vec![KeySchemaElement::hash("id")],
                    attribute_definitions: vec![AttributeDefinition::new(
                        "id",
                        ScalarAttributeType::S,
                    )],
                    billing_mode: Some(BillingMode::PayPerRequest),
                    ..Default::default()
                })
                .unwrap();
        }
        client
            .put_item(PutItemInput {
                table_name: "pokemons".to_owned(),
                item: HashMap::from([("id".to_owned(), s("001")), ("owner".to_owned(), s("ash"))]),
                ..Default::default()
            })
            .unwrap();
        client
    }

    fn get(client: &MiniDyn, table: &str, id: &str) -> Option<HashMap<String, AttributeValue>> {
        client
            .get_item(GetItemInput {
                table_name: table.to_owned(),
                key: key(id),
                ..Default::default()
            })
            .unwrap()
            .item
    }

    fn put_trainer(id: &str) -> TransactWriteItem {
        TransactWriteItem {
            put: Some(TransactPut {
                table_name: "trainers".to_owned(),
                item: key(id),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn check_owner(owner: &str) -> TransactWriteItem {
        TransactWriteItem {
            condition_check: Some(ConditionCheck {
                table_name: "pokemons".to_owned(),
                key: key("001"),
                condition_expression: "#o = :o".to_owned(),
                expression_attribute_names: HashMap::from([("#o".to_owned(), "owner".to_owned())]),
                expression_attribute_values: HashMap::from([(":o".to_owned(), s(owner))]),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_should_commit_across_tables() {
        let client = setup();
        let update = TransactWriteItem {
            update: Some(TransactUpdate {
                table_name: "pokemons".to_owned(),
                key: key("001"),
                update_expression: "SET #o = :o".to_owned(),
                expression_attribute_names: HashMap::from([("#o".to_owned(), "owner".to_owned())]),
                expression_attribute_values: HashMap::from([(":o".to_owned(), s("misty"))]),
                ..Default::default()
            }),
            ..Default::default()
        };
        client
            .transact_write_items(TransactWriteItemsInput {
                transact_items: vec![put_trainer("misty"), update],
            })
            .unwrap();
        assert!(get(&client, "trainers", "misty").is_some());
        assert_eq!(get(&client, "pokemons", "001").unwrap()["owner"], s("misty"));
    }

    #[test]
    fn test_should_apply_nothing_when_a_condition_fails() {
        let client = setup();
        let err = client
            .transact_write_items(TransactWriteItemsInput {
                transact_items: vec![put_trainer("brock"), check_owner("gary")],
            })
            .unwrap_err();
        assert_eq!(err.code, DynamoDBErrorCode::TransactionCanceledException);
        assert_eq!(
            err.cancellation_reasons,
            vec![
                CancellationReason::none(),
                CancellationReason::conditional_check_failed()
            ]
        );
        assert!(get(&client, "trainers", "brock").is_none());
    }

    #[test]
    fn test_should_reject_two_operations_on_one_item() {
        let client = setup();
        let delete = TransactWriteItem {
            delete: Some(TransactDelete {
                table_name: "pokemons".to_owned(),
                key: key("001"),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = client
            .transact_write_items(TransactWriteItemsInput {
                transact_items: vec![check_owner("ash"), delete],
            })
            .unwrap_err();
        assert_eq!(err.code, DynamoDBErrorCode::ValidationException);
        assert!(get(&client, "pokemons", "001").is_some());
    }

    #[test]
    fn test_should_report_expression_errors_as_reasons() {
        let client = setup();
        let bad = TransactWriteItem {
            put: Some(TransactPut {
                table_name: "trainers".to_owned(),
                item: key("gary"),
                condition_expression: Some("attribute_not_exists(#missing)".to_owned()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = client
            .transact_write_items(TransactWriteItemsInput {
                transact_items: vec![bad, check_owner("ash")],
            })
            .unwrap_err();
        assert_eq!(
            err.cancellation_reasons[0].code.as_deref(),
            Some("ValidationError")
        );
        assert_eq!(err.cancellation_reasons[1], CancellationReason::none());
    }

    #[test]
    fn test_should_bound_transaction_size() {
        let client = setup();
        let err = client
            .transact_write_items(TransactWriteItemsInput::default())
            .unwrap_err();
        assert_eq!(err.code, DynamoDBErrorCode::ValidationException);

        let err = client
            .transact_write_items(TransactWriteItemsInput {
                transact_items: vec![put_trainer("x"); 101],
            })
            .unwrap_err();
        assert_eq!(err.code, DynamoDBErrorCode::ValidationException);
    }

    #[test]
    fn test_should_fail_on_missing_table() {
        let client = setup();
        let mut op = put_trainer("ash");
        if let Some(put) = op.put.as_mut() {
            put.table_name = "gyms".to_owned();
        }
        let err = client
            .transact_write_items(TransactWriteItemsInput {
                transact_items: vec![op],
            })
            .unwrap_err();
        assert_eq!(err.code, DynamoDBErrorCode::ResourceNotFoundException);
    }
}
