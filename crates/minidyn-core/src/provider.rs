//! The `MiniDyn` client: table management, item operations, query, scan and
//! batch operations. Transactions live in [`crate::transaction`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::RwLock;
use tracing::{debug, info};

use minidyn_model::attribute_value::AttributeValue;
use minidyn_model::error::DynamoDBError;
use minidyn_model::input::{
    BatchGetItemInput, BatchWriteItemInput, CreateTableInput, DeleteItemInput, DeleteTableInput,
    DescribeTableInput, GetItemInput, ListTablesInput, PutItemInput, QueryInput, ScanInput,
    UpdateItemInput, UpdateTableInput,
};
use minidyn_model::output::{
    BatchGetItemOutput, BatchWriteItemOutput, CreateTableOutput, DeleteItemOutput,
    DeleteTableOutput, DescribeTableOutput, GetItemOutput, ListTablesOutput, PutItemOutput,
    QueryOutput, ScanOutput, UpdateItemOutput, UpdateTableOutput,
};
use minidyn_model::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndexUpdate, KeySchemaElement, KeyType,
    ReturnValue, ScalarAttributeType, Select, TableStatus,
};
use minidyn_model::Operation;

use crate::config::{InterpreterKind, MiniDynConfig};
use crate::error::{
    expression_error_to_dynamodb, internal_error_to_dynamodb, storage_error_to_dynamodb,
    value_error_to_dynamodb,
};
use crate::expression::{AttributePath, Environment, ExpressionError, parse_projection};
use crate::fault::{FailureCondition, FaultInjector};
use crate::interpreter::{ExpressionInput, Interpreter, LanguageInterpreter, NativeInterpreter};
use crate::query::{Entries, cursor_for, paginate, query_entries, resolve_key_condition, scan_entries};
use crate::state::{ServiceState, Table};
use crate::storage::{IndexKind, KeySchema, PrimaryKey, SecondaryIndex, TableData};
use crate::value::{Item, Value, item_from_attributes, item_to_attributes};

/// Maximum number of keys in one `BatchGetItem` call.
const MAX_BATCH_GET_KEYS: usize = 100;
/// Maximum number of requests in one `BatchWriteItem` call.
const MAX_BATCH_WRITE_REQUESTS: usize = 25;

/// An in-memory DynamoDB client.
///
/// Holds its tables, the active expression interpreter and the fault
/// injection switches. Cheap operations take `&self`; clones of the state
/// are shared through `Arc`.
#[derive(Debug)]
pub struct MiniDyn {
    /// Every table of this client.
    pub state: Arc<ServiceState>,
    /// Configuration the client was built with.
    pub config: Arc<MiniDynConfig>,
    language: Arc<LanguageInterpreter>,
    native: Arc<NativeInterpreter>,
    interpreter: RwLock<Arc<dyn Interpreter>>,
    faults: FaultInjector,
}

impl Default for MiniDyn {
    fn default() -> Self {
        Self::new(MiniDynConfig::default())
    }
}

impl MiniDyn {
    /// Create a client from `config`.
    #[must_use]
    pub fn new(config: MiniDynConfig) -> Self {
        let language = Arc::new(LanguageInterpreter::new());
        language.set_debug(config.debug);
        let native = Arc::new(NativeInterpreter::new());
        let interpreter: Arc<dyn Interpreter> = match config.interpreter {
            InterpreterKind::Language => Arc::clone(&language) as Arc<dyn Interpreter>,
            InterpreterKind::Native => Arc::clone(&native) as Arc<dyn Interpreter>,
        };
        Self {
            state: Arc::new(ServiceState::new()),
            faults: FaultInjector::from_config(&config),
            config: Arc::new(config),
            language,
            native,
            interpreter: RwLock::new(interpreter),
        }
    }

    /// Drop every table.
    pub fn reset(&self) {
        self.state.reset();
    }

    // -- Interpreter selection --

    /// The interpreter currently evaluating conditions and updates.
    #[must_use]
    pub fn interpreter(&self) -> Arc<dyn Interpreter> {
        Arc::clone(&self.interpreter.read())
    }

    /// Replace the active interpreter.
    pub fn set_interpreter(&self, interpreter: Arc<dyn Interpreter>) {
        info!(kind = ?interpreter.kind(), "switching interpreter");
        *self.interpreter.write() = interpreter;
    }

    /// The native interpreter of this client, for registering handlers.
    #[must_use]
    pub fn native(&self) -> Arc<NativeInterpreter> {
        Arc::clone(&self.native)
    }

    /// Activate the native interpreter and return it.
    pub fn use_native_interpreter(&self) -> Arc<NativeInterpreter> {
        self.set_interpreter(Arc::clone(&self.native) as Arc<dyn Interpreter>);
        self.native()
    }

    /// Activate the expression-language interpreter.
    pub fn use_language_interpreter(&self) {
        self.set_interpreter(Arc::clone(&self.language) as Arc<dyn Interpreter>);
    }

    /// Log every parsed expression at debug level.
    pub fn activate_debug(&self) {
        self.language.set_debug(true);
        self.interpreter().set_debug(true);
    }

    // -- Fault injection --

    /// Make every data-plane operation fail until deactivated.
    pub fn activate_force_failure(&self) {
        self.faults.set_force_failure(true);
    }

    pub fn deactivate_force_failure(&self) {
        self.faults.set_force_failure(false);
    }

    /// Make data-plane operations fail with `condition`.
    pub fn emulate_failure(&self, condition: FailureCondition) {
        self.faults.emulate(condition);
    }

    /// Make batch writes report every request as unprocessed.
    pub fn set_return_unprocessed_items(&self, on: bool) {
        self.faults.set_return_unprocessed_items(on);
    }

    pub(crate) fn check_faults(&self, operation: Operation) -> Result<(), DynamoDBError> {
        self.faults.check(operation)
    }
}

// ---------------------------------------------------------------------------
// Table management
// ---------------------------------------------------------------------------

impl MiniDyn {
    /// Handle `CreateTable`.
    #[allow(clippy::too_many_lines)]
    pub fn create_table(&self, input: CreateTableInput) -> Result<CreateTableOutput, DynamoDBError> {
        validate_table_name(&input.table_name)?;
        validate_attribute_definitions(&input.attribute_definitions)?;

        let key_schema = resolve_key_schema(
            &input.key_schema,
            &input.attribute_definitions,
            |key_type| match key_type {
                KeyType::Hash => "Hash Key not specified in Attribute Definitions".to_owned(),
                KeyType::Range => "Range Key not specified in Attribute Definitions".to_owned(),
            },
        )?;

        let billing_mode = input.billing_mode.clone().unwrap_or_default();
        if billing_mode == BillingMode::Provisioned && input.provisioned_throughput.is_none() {
            return Err(DynamoDBError::validation(
                "No provisioned throughput specified for the table",
            ));
        }

        let mut data = TableData::new(key_schema, input.attribute_definitions.clone());
        data.billing_mode = billing_mode.clone();
        data.provisioned_throughput = input.provisioned_throughput;

        let mut index_names = HashSet::new();
        let mut claim_name = |name: &str| {
            if index_names.insert(name.to_owned()) {
                Ok(())
            } else {
                Err(DynamoDBError::validation(format!(
                    "Duplicate index name: {name}"
                )))
            }
        };

        if let Some(gsis) = &input.global_secondary_indexes {
            if gsis.is_empty() {
                return Err(DynamoDBError::validation("GSI list is empty/invalid"));
            }
            for gsi in gsis {
                claim_name(&gsi.index_name)?;
                if billing_mode == BillingMode::Provisioned && gsi.provisioned_throughput.is_none()
                {
                    return Err(DynamoDBError::validation(
                        "No provisioned throughput specified for the global secondary index",
                    ));
                }
                let schema = resolve_key_schema(
                    &gsi.key_schema,
                    &input.attribute_definitions,
                    |key_type| index_key_message("Global", key_type),
                )?;
                data.add_index(
                    SecondaryIndex::new(
                        &gsi.index_name,
                        IndexKind::Global,
                        gsi.key_schema.clone(),
                        schema,
                        gsi.projection.clone(),
                    )
                    .with_throughput(gsi.provisioned_throughput),
                );
            }
        }

        if let Some(lsis) = &input.local_secondary_indexes {
            if lsis.is_empty() {
                return Err(DynamoDBError::validation("LSI list is empty/invalid"));
            }
            for lsi in lsis {
                claim_name(&lsi.index_name)?;
                let schema = resolve_key_schema(
                    &lsi.key_schema,
                    &input.attribute_definitions,
                    |key_type| index_key_message("Local", key_type),
                )?;
                if schema.partition_key != data.key_schema.partition_key {
                    return Err(DynamoDBError::validation(format!(
                        "Local Secondary Index {} must use the table hash key",
                        lsi.index_name
                    )));
                }
                if schema.sort_key.is_none() {
                    return Err(DynamoDBError::validation(
                        "Local Secondary Index range key not specified in Attribute Definitions",
                    ));
                }
                data.add_index(SecondaryIndex::new(
                    &lsi.index_name,
                    IndexKind::Local,
                    lsi.key_schema.clone(),
                    schema,
                    lsi.projection.clone(),
                ));
            }
        }

        let table = Table::new(
            &input.table_name,
            &self.config.default_region,
            input.key_schema,
            data,
        );
        let table = self.state.create_table(table)?;
        info!(table = %table.name, "created table");
        Ok(CreateTableOutput {
            table_description: Some(table.to_description()),
        })
    }

    /// Handle `DeleteTable`.
    #[allow(clippy::needless_pass_by_value)]
    pub fn delete_table(&self, input: DeleteTableInput) -> Result<DeleteTableOutput, DynamoDBError> {
        let table = self.state.delete_table(&input.table_name)?;
        info!(table = %table.name, "deleted table");
        let data = table.read();
        Ok(DeleteTableOutput {
            table_description: Some(table.describe(&data, TableStatus::Deleting)),
        })
    }

    /// Handle `DescribeTable`.
    #[allow(clippy::needless_pass_by_value)]
    pub fn describe_table(
        &self,
        input: DescribeTableInput,
    ) -> Result<DescribeTableOutput, DynamoDBError> {
        let table = self.state.require_table(&input.table_name)?;
        Ok(DescribeTableOutput {
            table: Some(table.to_description()),
        })
    }

    /// Handle `ListTables`.
    #[allow(clippy::needless_pass_by_value)]
    pub fn list_tables(&self, input: ListTablesInput) -> Result<ListTablesOutput, DynamoDBError> {
        if let Some(limit) = input.limit {
            if !(1..=100).contains(&limit) {
                return Err(DynamoDBError::validation(format!(
                    "1 validation error detected: Value '{limit}' at 'limit' failed to satisfy \
                     constraint: Member must have value between 1 and 100"
                )));
            }
        }

        let all_names = self.state.list_table_names();
        let limit = usize::try_from(input.limit.unwrap_or(100)).unwrap_or(100);

        let start_idx = match input.exclusive_start_table_name {
            Some(ref start) => all_names
                .iter()
                .position(|n| n.as_str() > start.as_str())
                .unwrap_or(all_names.len()),
            None => 0,
        };

        let mut table_names: Vec<String> = all_names
            .into_iter()
            .skip(start_idx)
            .take(limit + 1)
            .collect();

        let last_evaluated_table_name = if table_names.len() > limit {
            table_names.truncate(limit);
            table_names.last().cloned()
        } else {
            None
        };

        Ok(ListTablesOutput {
            table_names,
            last_evaluated_table_name,
        })
    }

    /// Handle `UpdateTable`.
    ///
    /// Changes are staged on a copy of the table data and swapped in only
    /// when every index update is valid.
    pub fn update_table(&self, input: UpdateTableInput) -> Result<UpdateTableOutput, DynamoDBError> {
        let table = self.state.require_table(&input.table_name)?;
        validate_attribute_definitions(&input.attribute_definitions)?;

        let mut data = table.write();
        let mut next = data.clone();

        for definition in input.attribute_definitions {
            match next
                .attribute_definitions
                .iter_mut()
                .find(|d| d.attribute_name == definition.attribute_name)
            {
                Some(existing) if existing.attribute_type != definition.attribute_type => {
                    return Err(DynamoDBError::validation(format!(
                        "One or more parameter values were invalid: Cannot change the type of \
                         attribute {} from {} to {}",
                        definition.attribute_name,
                        existing.attribute_type.as_str(),
                        definition.attribute_type.as_str()
                    )));
                }
                Some(_) => {}
                None => next.attribute_definitions.push(definition),
            }
        }
        if let Some(mode) = input.billing_mode {
            next.billing_mode = mode;
        }
        if let Some(throughput) = input.provisioned_throughput {
            next.provisioned_throughput = Some(throughput);
        }
        for update in input.global_secondary_index_updates {
            apply_index_update(&mut next, update)?;
        }

        *data = next;
        info!(table = %table.name, indexes = data.indexes().count(), "updated table");
        Ok(UpdateTableOutput {
            table_description: Some(table.describe(&data, TableStatus::Active)),
        })
    }
}

fn apply_index_update(
    data: &mut TableData,
    update: GlobalSecondaryIndexUpdate,
) -> Result<(), DynamoDBError> {
    match (update.create, update.update, update.delete) {
        (Some(create), None, None) => {
            if data.index(&create.index_name).is_some() {
                return Err(DynamoDBError::validation(format!(
                    "Attempting to create an index which already exists: {}",
                    create.index_name
                )));
            }
            if data.billing_mode == BillingMode::Provisioned
                && create.provisioned_throughput.is_none()
            {
                return Err(DynamoDBError::validation(
                    "No provisioned throughput specified for the global secondary index",
                ));
            }
            let schema = resolve_key_schema(
                &create.key_schema,
                &data.attribute_definitions,
                |key_type| index_key_message("Global", key_type),
            )?;
            data.add_index(
                SecondaryIndex::new(
                    create.index_name,
                    IndexKind::Global,
                    create.key_schema,
                    schema,
                    create.projection,
                )
                .with_throughput(create.provisioned_throughput),
            );
            Ok(())
        }
        (None, Some(change), None) => {
            let index = data
                .index_mut(&change.index_name)
                .filter(|i| i.kind == IndexKind::Global)
                .ok_or_else(|| DynamoDBError::resource_not_found("Requested resource not found"))?;
            index.provisioned_throughput = Some(change.provisioned_throughput);
            Ok(())
        }
        (None, None, Some(delete)) => {
            if data
                .index(&delete.index_name)
                .is_none_or(|i| i.kind != IndexKind::Global)
            {
                return Err(DynamoDBError::resource_not_found(
                    "Requested resource not found",
                ));
            }
            data.remove_index(&delete.index_name);
            Ok(())
        }
        _ => Err(DynamoDBError::validation(
            "One or more parameter values were invalid: exactly one of Create, Update or Delete \
             must be specified per GlobalSecondaryIndexUpdate",
        )),
    }
}

// ---------------------------------------------------------------------------
// Item CRUD
// ---------------------------------------------------------------------------

impl MiniDyn {
    /// Handle `PutItem`.
    pub fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, DynamoDBError> {
        self.check_faults(Operation::PutItem)?;
        let return_values =
            validate_return_values(input.return_values, &[ReturnValue::None, ReturnValue::AllOld])?;
        let table = self.state.require_table(&input.table_name)?;
        let item = to_item(&input.item)?;
        let values = to_item(&input.expression_attribute_values)?;

        let mut data = table.write();
        let key = data.validate(&item).map_err(storage_error_to_dynamodb)?;
        let passed = self
            .condition_holds(
                &table.name,
                input.condition_expression.as_deref(),
                data.get(&key),
                &input.expression_attribute_names,
                &values,
            )
            .map_err(expression_error_to_dynamodb)?;
        if !passed {
            return Err(DynamoDBError::conditional_check_failed());
        }
        let old = data.put(item).map_err(storage_error_to_dynamodb)?;
        drop(data);
        debug!(table = %table.name, replaced = old.is_some(), "put item");

        let attributes = match (return_values, old) {
            (ReturnValue::AllOld, Some(old)) => to_wire(&old)?,
            _ => HashMap::new(),
        };
        Ok(PutItemOutput { attributes })
    }

    /// Handle `GetItem`.
    pub fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, DynamoDBError> {
        self.check_faults(Operation::GetItem)?;
        let table = self.state.require_table(&input.table_name)?;
        let key_item = to_item(&input.key)?;
        let paths = projection_paths(input.projection_expression.as_deref())?;

        let data = table.read();
        let key = data
            .key_schema
            .parse_key(&key_item)
            .map_err(storage_error_to_dynamodb)?;
        let item = data
            .get(&key)
            .map(|item| project(item, paths.as_deref(), &input.expression_attribute_names))
            .transpose()?;
        drop(data);
        debug!(table = %table.name, found = item.is_some(), "get item");

        Ok(GetItemOutput {
            item: item.as_ref().map(to_wire).transpose()?,
        })
    }

    /// Handle `UpdateItem`.
    ///
    /// A missing item is created from its key unless the condition fails.
    pub fn update_item(&self, input: UpdateItemInput) -> Result<UpdateItemOutput, DynamoDBError> {
        self.check_faults(Operation::UpdateItem)?;
        let return_values = input.return_values.unwrap_or_default();
        let table = self.state.require_table(&input.table_name)?;
        let key_item = to_item(&input.key)?;
        let values = to_item(&input.expression_attribute_values)?;
        let names = &input.expression_attribute_names;

        let mut data = table.write();
        let key = data
            .key_schema
            .parse_key(&key_item)
            .map_err(storage_error_to_dynamodb)?;
        let current = data.get(&key).cloned();
        let passed = self
            .condition_holds(
                &table.name,
                input.condition_expression.as_deref(),
                current.as_ref(),
                names,
                &values,
            )
            .map_err(expression_error_to_dynamodb)?;
        if !passed {
            return Err(DynamoDBError::conditional_check_failed());
        }

        let base = current.clone().unwrap_or(key_item);
        let updated = match input.update_expression.as_deref() {
            Some(expression) => self.updated_item(
                &table.name,
                &data.key_schema,
                expression,
                &base,
                names,
                &values,
            )?,
            None => base,
        };
        data.put(updated.clone())
            .map_err(storage_error_to_dynamodb)?;
        drop(data);
        debug!(table = %table.name, created = current.is_none(), "updated item");

        let old = current.unwrap_or_default();
        let attributes = match return_values {
            ReturnValue::None => Item::new(),
            ReturnValue::AllOld => old,
            ReturnValue::AllNew => updated,
            ReturnValue::UpdatedOld => changed_attributes(&old, &updated),
            ReturnValue::UpdatedNew => changed_attributes(&updated, &old),
        };
        Ok(UpdateItemOutput {
            attributes: to_wire(&attributes)?,
        })
    }

    /// Handle `DeleteItem`. Deleting an absent item succeeds.
    pub fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, DynamoDBError> {
        self.check_faults(Operation::DeleteItem)?;
        let return_values =
            validate_return_values(input.return_values, &[ReturnValue::None, ReturnValue::AllOld])?;
        let table = self.state.require_table(&input.table_name)?;
        let key_item = to_item(&input.key)?;
        let values = to_item(&input.expression_attribute_values)?;

        let mut data = table.write();
        let key = data
            .key_schema
            .parse_key(&key_item)
            .map_err(storage_error_to_dynamodb)?;
        let passed = self
            .condition_holds(
                &table.name,
                input.condition_expression.as_deref(),
                data.get(&key),
                &input.expression_attribute_names,
                &values,
            )
            .map_err(expression_error_to_dynamodb)?;
        if !passed {
            return Err(DynamoDBError::conditional_check_failed());
        }
        let old = data.delete(&key);
        drop(data);
        debug!(table = %table.name, existed = old.is_some(), "deleted item");

        let attributes = match (return_values, old) {
            (ReturnValue::AllOld, Some(old)) => to_wire(&old)?,
            _ => HashMap::new(),
        };
        Ok(DeleteItemOutput { attributes })
    }

    /// Evaluate an optional condition against the stored item, or against
    /// an empty item when nothing is stored.
    pub(crate) fn condition_holds(
        &self,
        table: &str,
        condition: Option<&str>,
        current: Option<&Item>,
        names: &HashMap<String, String>,
        values: &HashMap<String, Value>,
    ) -> Result<bool, ExpressionError> {
        let Some(expression) = condition else {
            return Ok(true);
        };
        let empty = Item::new();
        self.interpreter().matches(&ExpressionInput {
            table_name: table,
            expression,
            item: current.unwrap_or(&empty),
            names,
            values,
        })
    }

    /// Run an update expression on `base`, refusing changes to key
    /// attributes.
    pub(crate) fn updated_item(
        &self,
        table: &str,
        key_schema: &KeySchema,
        expression: &str,
        base: &Item,
        names: &HashMap<String, String>,
        values: &HashMap<String, Value>,
    ) -> Result<Item, DynamoDBError> {
        let updated = self
            .interpreter()
            .update(&ExpressionInput {
                table_name: table,
                expression,
                item: base,
                names,
                values,
            })
            .map_err(expression_error_to_dynamodb)?;
        if let Some(name) = key_schema.names().find(|n| updated.get(*n) != base.get(*n)) {
            return Err(DynamoDBError::validation(format!(
                "One or more parameter values were invalid: Cannot update attribute {name}. \
                 This attribute is part of the key"
            )));
        }
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// Query & Scan
// ---------------------------------------------------------------------------

/// The parts of a query or scan request that shape each returned item.
struct PageRequest<'a> {
    table: &'a str,
    filter: Option<&'a str>,
    names: &'a HashMap<String, String>,
    values: &'a HashMap<String, Value>,
    projection: Option<&'a [AttributePath]>,
    limit: Option<usize>,
    count_only: bool,
}

/// A page converted back to the external representation.
struct WirePage {
    items: Vec<HashMap<String, AttributeValue>>,
    count: i32,
    scanned_count: i32,
    last_evaluated_key: HashMap<String, AttributeValue>,
}

impl MiniDyn {
    /// Handle `Query`.
    pub fn query(&self, input: QueryInput) -> Result<QueryOutput, DynamoDBError> {
        self.check_faults(Operation::Query)?;
        let table = self.state.require_table(&input.table_name)?;
        let limit = page_limit(input.limit)?;
        let count_only = validate_select(
            input.select.as_ref(),
            input.index_name.as_deref(),
            input.projection_expression.as_deref(),
        )?;
        let text = input.key_condition_expression.as_deref().ok_or_else(|| {
            DynamoDBError::validation(
                "Either the KeyConditions or KeyConditionExpression parameter must be specified \
                 in the request.",
            )
        })?;
        let key_expr = self
            .language
            .condition(text)
            .map_err(|e| expression_error_to_dynamodb(e.into()))?;
        let values = to_item(&input.expression_attribute_values)?;
        let start = start_key(&input.exclusive_start_key)?;
        let paths = projection_paths(input.projection_expression.as_deref())?;

        let data = table.read();
        let index = find_index(&data, input.index_name.as_deref())?;
        let schema = index.map_or(&data.key_schema, |i| &i.key_schema);
        let condition =
            resolve_key_condition(&key_expr, schema, &input.expression_attribute_names, &values)?;
        let entries = query_entries(
            &data,
            index,
            &condition,
            start.as_ref(),
            input.scan_index_forward.unwrap_or(true),
        )?;
        let page = self.read_page(
            &data,
            index,
            entries,
            &PageRequest {
                table: &table.name,
                filter: input.filter_expression.as_deref(),
                names: &input.expression_attribute_names,
                values: &values,
                projection: paths.as_deref(),
                limit,
                count_only,
            },
        )?;
        drop(data);

        Ok(QueryOutput {
            items: page.items,
            count: page.count,
            scanned_count: page.scanned_count,
            last_evaluated_key: page.last_evaluated_key,
        })
    }

    /// Handle `Scan`.
    pub fn scan(&self, input: ScanInput) -> Result<ScanOutput, DynamoDBError> {
        self.check_faults(Operation::Scan)?;
        let table = self.state.require_table(&input.table_name)?;
        let limit = page_limit(input.limit)?;
        let count_only = validate_select(
            input.select.as_ref(),
            input.index_name.as_deref(),
            input.projection_expression.as_deref(),
        )?;
        let values = to_item(&input.expression_attribute_values)?;
        let start = start_key(&input.exclusive_start_key)?;
        let paths = projection_paths(input.projection_expression.as_deref())?;

        let data = table.read();
        let index = find_index(&data, input.index_name.as_deref())?;
        let entries = scan_entries(&data, index, start.as_ref())?;
        let page = self.read_page(
            &data,
            index,
            entries,
            &PageRequest {
                table: &table.name,
                filter: input.filter_expression.as_deref(),
                names: &input.expression_attribute_names,
                values: &values,
                projection: paths.as_deref(),
                limit,
                count_only,
            },
        )?;
        drop(data);

        Ok(ScanOutput {
            items: page.items,
            count: page.count,
            scanned_count: page.scanned_count,
            last_evaluated_key: page.last_evaluated_key,
        })
    }

    /// Consume one page of `entries`: index projection, then the filter,
    /// then the projection expression.
    fn read_page(
        &self,
        data: &TableData,
        index: Option<&SecondaryIndex>,
        entries: Entries<'_>,
        request: &PageRequest<'_>,
    ) -> Result<WirePage, DynamoDBError> {
        let select = |item: &Item| -> Result<Option<Item>, DynamoDBError> {
            let visible = match index {
                Some(index) => index.project(&data.key_schema, item),
                None => item.clone(),
            };
            let kept = self
                .condition_holds(
                    request.table,
                    request.filter,
                    Some(&visible),
                    request.names,
                    request.values,
                )
                .map_err(expression_error_to_dynamodb)?;
            if !kept {
                return Ok(None);
            }
            if request.count_only {
                return Ok(Some(Item::new()));
            }
            project(&visible, request.projection, request.names).map(Some)
        };
        let page = paginate(entries, request.limit, select, |item| {
            cursor_for(data, index, item)
        })?;
        debug!(
            table = %request.table,
            index = index.map(|i| i.name.as_str()),
            scanned = page.scanned,
            returned = page.items.len(),
            "read page"
        );

        let count = to_count(page.items.len());
        let items = if request.count_only {
            Vec::new()
        } else {
            page.items.iter().map(to_wire).collect::<Result<_, _>>()?
        };
        Ok(WirePage {
            items,
            count,
            scanned_count: to_count(page.scanned),
            last_evaluated_key: page
                .last_key
                .as_ref()
                .map(to_wire)
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Batch operations
// ---------------------------------------------------------------------------

/// One validated batch write request.
enum BatchWrite {
    Put(Item),
    Delete(PrimaryKey),
}

impl MiniDyn {
    /// Handle `BatchGetItem`.
    pub fn batch_get_item(
        &self,
        input: BatchGetItemInput,
    ) -> Result<BatchGetItemOutput, DynamoDBError> {
        self.check_faults(Operation::BatchGetItem)?;
        let total: usize = input.request_items.values().map(|r| r.keys.len()).sum();
        if total == 0 {
            return Err(DynamoDBError::validation(
                "1 validation error detected: Value at 'requestItems' failed to satisfy \
                 constraint: Member must have length greater than or equal to 1",
            ));
        }
        if total > MAX_BATCH_GET_KEYS {
            return Err(DynamoDBError::validation(
                "Too many items requested for the BatchGetItem call",
            ));
        }

        let requests: BTreeMap<_, _> = input.request_items.into_iter().collect();
        let mut responses = HashMap::new();
        for (table_name, request) in requests {
            let table = self.state.require_table(&table_name)?;
            let paths = projection_paths(request.projection_expression.as_deref())?;
            let keys = request
                .keys
                .iter()
                .map(to_item)
                .collect::<Result<Vec<_>, _>>()?;

            let data = table.read();
            let mut seen = HashSet::new();
            let mut items = Vec::new();
            for key_item in &keys {
                let key = data
                    .key_schema
                    .parse_key(key_item)
                    .map_err(storage_error_to_dynamodb)?;
                if !seen.insert(key.clone()) {
                    return Err(DynamoDBError::validation(
                        "Provided list of item keys contains duplicates",
                    ));
                }
                if let Some(item) = data.get(&key) {
                    let item =
                        project(item, paths.as_deref(), &request.expression_attribute_names)?;
                    items.push(to_wire(&item)?);
                }
            }
            drop(data);
            debug!(table = %table_name, requested = keys.len(), returned = items.len(), "batch get");
            responses.insert(table_name, items);
        }

        Ok(BatchGetItemOutput {
            responses,
            unprocessed_keys: HashMap::new(),
        })
    }

    /// Handle `BatchWriteItem`.
    ///
    /// Tables are locked in name order and every request is validated
    /// before any is applied.
    pub fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> Result<BatchWriteItemOutput, DynamoDBError> {
        self.check_faults(Operation::BatchWriteItem)?;
        let total: usize = input.request_items.values().map(Vec::len).sum();
        if total == 0 {
            return Err(DynamoDBError::validation(
                "1 validation error detected: Value at 'requestItems' failed to satisfy \
                 constraint: Member must have length greater than or equal to 1",
            ));
        }
        if total > MAX_BATCH_WRITE_REQUESTS {
            return Err(DynamoDBError::validation(
                "Too many items requested for the BatchWriteItem call",
            ));
        }
        if self.faults.return_unprocessed_items() {
            debug!(requests = total, "returning every batch write request as unprocessed");
            return Ok(BatchWriteItemOutput {
                unprocessed_items: input.request_items,
            });
        }

        let requests: BTreeMap<_, _> = input.request_items.into_iter().collect();
        let tables = requests
            .keys()
            .map(|name| self.state.require_table(name))
            .collect::<Result<Vec<_>, _>>()?;
        let mut guards: Vec<_> = tables.iter().map(|t| t.write()).collect();

        let mut staged = Vec::with_capacity(requests.len());
        for (data, writes) in guards.iter().zip(requests.values()) {
            let mut seen = HashSet::new();
            let mut table_writes = Vec::with_capacity(writes.len());
            for write in writes {
                let (key, staged_write) = match (&write.put_request, &write.delete_request) {
                    (Some(put), None) => {
                        let item = to_item(&put.item)?;
                        let key = data.validate(&item).map_err(storage_error_to_dynamodb)?;
                        (key, BatchWrite::Put(item))
                    }
                    (None, Some(delete)) => {
                        let key = data
                            .key_schema
                            .parse_key(&to_item(&delete.key)?)
                            .map_err(storage_error_to_dynamodb)?;
                        (key.clone(), BatchWrite::Delete(key))
                    }
                    _ => {
                        return Err(DynamoDBError::validation(
                            "A WriteRequest must contain exactly one of PutRequest or \
                             DeleteRequest",
                        ));
                    }
                };
                if !seen.insert(key) {
                    return Err(DynamoDBError::validation(
                        "Provided list of item keys contains duplicates",
                    ));
                }
                table_writes.push(staged_write);
            }
            staged.push(table_writes);
        }

        for ((data, writes), table) in guards.iter_mut().zip(staged).zip(&tables) {
            let count = writes.len();
            for write in writes {
                match write {
                    BatchWrite::Put(item) => {
                        data.put(item).map_err(storage_error_to_dynamodb)?;
                    }
                    BatchWrite::Delete(key) => {
                        data.delete(&key);
                    }
                }
            }
            debug!(table = %table.name, requests = count, "batch write");
        }

        Ok(BatchWriteItemOutput::default())
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Convert an external item, key or placeholder map to engine values.
pub(crate) fn to_item(
    attributes: &HashMap<String, AttributeValue>,
) -> Result<Item, DynamoDBError> {
    item_from_attributes(attributes).map_err(value_error_to_dynamodb)
}

/// Convert a stored item back to the external representation.
///
/// Stored items only hold storable values, so a failure here is a bug.
fn to_wire(item: &Item) -> Result<HashMap<String, AttributeValue>, DynamoDBError> {
    item_to_attributes(item)
        .context("converting a stored item to attribute values")
        .map_err(internal_error_to_dynamodb)
}

fn to_count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn start_key(
    attributes: &HashMap<String, AttributeValue>,
) -> Result<Option<Item>, DynamoDBError> {
    if attributes.is_empty() {
        return Ok(None);
    }
    to_item(attributes).map(Some)
}

fn find_index<'a>(
    data: &'a TableData,
    name: Option<&str>,
) -> Result<Option<&'a SecondaryIndex>, DynamoDBError> {
    name.map(|name| {
        data.index(name).ok_or_else(|| {
            DynamoDBError::validation(format!(
                "The table does not have the specified index: {name}"
            ))
        })
    })
    .transpose()
}

fn page_limit(limit: Option<i32>) -> Result<Option<usize>, DynamoDBError> {
    limit
        .map(|limit| {
            usize::try_from(limit)
                .ok()
                .filter(|l| *l >= 1)
                .ok_or_else(|| {
                    DynamoDBError::validation(format!(
                        "1 validation error detected: Value '{limit}' at 'limit' failed to \
                         satisfy constraint: Member must have value greater than or equal to 1"
                    ))
                })
        })
        .transpose()
}

/// Check `Select` against the rest of the request. Returns whether only a
/// count was asked for.
fn validate_select(
    select: Option<&Select>,
    index_name: Option<&str>,
    projection: Option<&str>,
) -> Result<bool, DynamoDBError> {
    match select {
        Some(Select::Count) if projection.is_some() => Err(DynamoDBError::validation(
            "Cannot specify the ProjectionExpression when choosing to get only the Count",
        )),
        Some(Select::Count) => Ok(true),
        Some(Select::AllProjectedAttributes) if index_name.is_none() => {
            Err(DynamoDBError::validation(
                "ALL_PROJECTED_ATTRIBUTES can be used only when Querying using an IndexName",
            ))
        }
        Some(Select::SpecificAttributes) if projection.is_none() => Err(DynamoDBError::validation(
            "SPECIFIC_ATTRIBUTES requires a ProjectionExpression",
        )),
        _ => Ok(false),
    }
}

fn validate_return_values(
    return_values: Option<ReturnValue>,
    allowed: &[ReturnValue],
) -> Result<ReturnValue, DynamoDBError> {
    let return_values = return_values.unwrap_or_default();
    if allowed.contains(&return_values) {
        Ok(return_values)
    } else {
        Err(DynamoDBError::validation(format!(
            "Return values set to invalid value for this operation: {return_values}"
        )))
    }
}

fn projection_paths(text: Option<&str>) -> Result<Option<Vec<AttributePath>>, DynamoDBError> {
    text.map(|text| parse_projection(text).map_err(|e| expression_error_to_dynamodb(e.into())))
        .transpose()
}

fn project(
    item: &Item,
    paths: Option<&[AttributePath]>,
    names: &HashMap<String, String>,
) -> Result<Item, DynamoDBError> {
    let Some(paths) = paths else {
        return Ok(item.clone());
    };
    let values = HashMap::new();
    Environment::new(item, names, &values)
        .project(paths)
        .map_err(expression_error_to_dynamodb)
}

/// Top-level attributes of `from` that are absent from or different in
/// `other`.
fn changed_attributes(from: &Item, other: &Item) -> Item {
    from.iter()
        .filter(|(name, value)| other.get(*name) != Some(*value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// CreateTable validation helpers
// ---------------------------------------------------------------------------

/// Table names are 3 to 255 characters of `[a-zA-Z0-9_.-]`.
fn validate_table_name(name: &str) -> Result<(), DynamoDBError> {
    if !(3..=255).contains(&name.len()) {
        return Err(DynamoDBError::validation(format!(
            "TableName must be at least 3 characters long and at most 255 characters long: {name}"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(DynamoDBError::validation(format!(
            "1 validation error detected: Value '{name}' at 'tableName' failed to satisfy \
             constraint: Member must satisfy regular expression pattern: [a-zA-Z0-9_.-]+"
        )));
    }
    Ok(())
}

/// Reject duplicate names and non-key attribute types.
fn validate_attribute_definitions(
    definitions: &[AttributeDefinition],
) -> Result<(), DynamoDBError> {
    let mut seen = HashSet::new();
    for definition in definitions {
        if !seen.insert(&definition.attribute_name) {
            return Err(DynamoDBError::validation(format!(
                "Duplicate AttributeName in AttributeDefinitions: {}",
                definition.attribute_name
            )));
        }
        if let ScalarAttributeType::Unknown(kind) = &definition.attribute_type {
            return Err(DynamoDBError::validation(format!(
                "1 validation error detected: Value '{kind}' at 'attributeDefinitions' failed to \
                 satisfy constraint: Member must satisfy enum value set: [B, N, S]"
            )));
        }
    }
    Ok(())
}

fn index_key_message(kind: &str, key_type: KeyType) -> String {
    let part = match key_type {
        KeyType::Hash => "hash",
        KeyType::Range => "range",
    };
    format!("{kind} Secondary Index {part} key not specified in Attribute Definitions")
}

/// Check the shape of a key schema and resolve it against the attribute
/// definitions. `undefined` names the error for a key without a definition.
fn resolve_key_schema(
    elements: &[KeySchemaElement],
    definitions: &[AttributeDefinition],
    undefined: impl Fn(KeyType) -> String,
) -> Result<KeySchema, DynamoDBError> {
    let count = |key_type: KeyType| elements.iter().filter(|e| e.key_type == key_type).count();
    if count(KeyType::Hash) != 1 {
        return Err(DynamoDBError::validation(
            "Invalid KeySchema: Some index key schema element is not valid",
        ));
    }
    if count(KeyType::Range) > 1 || elements.len() > 2 {
        return Err(DynamoDBError::validation(
            "Too many KeySchema elements; expected at most 2",
        ));
    }
    for element in elements {
        if !definitions
            .iter()
            .any(|d| d.attribute_name == element.attribute_name)
        {
            return Err(DynamoDBError::validation(undefined(element.key_type)));
        }
    }
    KeySchema::resolve(elements, definitions)
        .ok_or_else(|| DynamoDBError::validation(undefined(KeyType::Hash)))
}
