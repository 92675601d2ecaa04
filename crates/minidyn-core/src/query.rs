//! Query and scan execution.
//!
//! A query walks one partition of the table or of an index, in sort order
//! or reversed, keeping the entries whose sort key satisfies the key
//! condition. A scan walks every partition. Either way [`paginate`] consumes
//! at most `limit` entries, hands each to the caller's filter, and returns a
//! cursor whenever entries remain past the last one consumed. The limit
//! counts entries read, not entries kept, so a page can be empty and still
//! carry a cursor.

use std::collections::HashMap;

use minidyn_model::error::DynamoDBError;

use crate::error::expression_error_to_dynamodb;
use crate::expression::evaluator::compare;
use crate::expression::{
    CompareOp, Environment, Expr, ExpressionError, KeyClause, Step, validate_key_condition,
};
use crate::storage::{IndexSlot, KeySchema, KeyValue, SecondaryIndex, StorageError, TableData};
use crate::value::{Item, Value};

// ---------------------------------------------------------------------------
// Key conditions
// ---------------------------------------------------------------------------

/// Restriction on the sort key of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortCondition {
    Compare(CompareOp, Value),
    Between(Value, Value),
}

impl SortCondition {
    fn accepts(&self, sort: &KeyValue) -> bool {
        let value = sort.to_value();
        match self {
            Self::Compare(op, operand) => compare(&value, *op, operand),
            Self::Between(low, high) => {
                compare(&value, CompareOp::Ge, low) && compare(&value, CompareOp::Le, high)
            }
        }
    }
}

/// A validated key condition: one partition and an optional sort range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCondition {
    pub partition: KeyValue,
    pub sort: Option<SortCondition>,
}

impl KeyCondition {
    /// Resolve a parsed key condition against the key schema it queries.
    pub fn resolve(
        expr: &Expr,
        schema: &KeySchema,
        names: &HashMap<String, String>,
        values: &HashMap<String, Value>,
    ) -> Result<Self, ExpressionError> {
        let empty = Item::new();
        let env = Environment::new(&empty, names, values);
        let value = |placeholder: &str| -> Result<&Value, ExpressionError> {
            values
                .get(placeholder)
                .ok_or_else(|| ExpressionError::UnresolvedValue(placeholder.to_owned()))
        };
        let invalid = |message: &str| ExpressionError::InvalidKeyCondition(message.to_owned());

        let mut partition = None;
        let mut sort = None;
        for clause in validate_key_condition(expr)? {
            let name = match env.resolve_path(clause.path())?.as_slice() {
                [Step::Key(name)] => name.clone(),
                _ => return Err(invalid("Key condition must use top-level key attributes")),
            };
            if name == schema.partition_key.name {
                let KeyClause::Compare {
                    op: CompareOp::Eq,
                    value: placeholder,
                    ..
                } = &clause
                else {
                    return Err(invalid("Query key condition not supported"));
                };
                if partition.is_some() {
                    return Err(invalid("Query key condition not supported"));
                }
                let key = KeyValue::from_value(&schema.partition_key, value(placeholder)?)
                    .map_err(type_mismatch)?;
                partition = Some(key);
            } else if let Some(sort_key) = schema.sort_key.as_ref().filter(|k| k.name == name) {
                if sort.is_some() {
                    return Err(invalid("Query key condition not supported"));
                }
                let check = |v: &Value| KeyValue::from_value(sort_key, v).map_err(type_mismatch);
                sort = Some(match &clause {
                    KeyClause::Compare {
                        op, value: operand, ..
                    } => {
                        let operand = value(operand)?;
                        check(operand)?;
                        SortCondition::Compare(*op, operand.clone())
                    }
                    KeyClause::Between { low, high, .. } => {
                        let (low, high) = (value(low)?, value(high)?);
                        if check(low)? > check(high)? {
                            return Err(invalid(
                                "The BETWEEN operator requires upper bound to be greater than or equal to lower bound",
                            ));
                        }
                        SortCondition::Between(low.clone(), high.clone())
                    }
                });
            } else {
                return Err(invalid("Query key condition not supported"));
            }
        }

        let partition = partition.ok_or_else(|| {
            ExpressionError::InvalidKeyCondition(format!(
                "Query condition missed key schema element: {}",
                schema.partition_key.name
            ))
        })?;
        Ok(Self { partition, sort })
    }

    fn accepts(&self, sort: Option<&KeyValue>) -> bool {
        match (&self.sort, sort) {
            (None, _) => true,
            (Some(condition), Some(sort)) => condition.accepts(sort),
            (Some(_), None) => false,
        }
    }
}

#[allow(clippy::needless_pass_by_value)]
fn type_mismatch(_: StorageError) -> ExpressionError {
    ExpressionError::InvalidKeyCondition(
        "One or more parameter values were invalid: Condition parameter type does not match schema type"
            .to_owned(),
    )
}

// ---------------------------------------------------------------------------
// Entry iteration
// ---------------------------------------------------------------------------

/// Items in the order a query or scan visits them.
pub type Entries<'a> = Box<dyn Iterator<Item = &'a Item> + 'a>;

fn invalid_start(e: StorageError) -> DynamoDBError {
    DynamoDBError::validation(format!("The provided starting key is invalid: {e}"))
}

/// Where a cursor left off inside an index.
fn index_slot(
    data: &TableData,
    index: &SecondaryIndex,
    start: &Item,
) -> Result<(KeyValue, IndexSlot), DynamoDBError> {
    let index_key = index.key_schema.extract(start).map_err(invalid_start)?;
    let key = data.key_schema.extract(start).map_err(invalid_start)?;
    Ok((
        index_key.partition,
        IndexSlot {
            sort: index_key.sort,
            key,
        },
    ))
}

/// Entries matching `condition`, strictly after the `start` cursor.
pub fn query_entries<'a>(
    data: &'a TableData,
    index: Option<&'a SecondaryIndex>,
    condition: &'a KeyCondition,
    start: Option<&Item>,
    forward: bool,
) -> Result<Entries<'a>, DynamoDBError> {
    let wrong_partition = || {
        DynamoDBError::validation(
            "The provided starting key is invalid: partition does not match the key condition",
        )
    };
    match index {
        None => {
            let after = match start {
                Some(start) => {
                    let key = data.key_schema.extract(start).map_err(invalid_start)?;
                    if key.partition != condition.partition {
                        return Err(wrong_partition());
                    }
                    Some(key.sort)
                }
                None => None,
            };
            Ok(Box::new(
                data.items()
                    .partition(&condition.partition, after.as_ref(), forward)
                    .filter(move |(_, sort, _)| condition.accepts(sort.as_ref()))
                    .map(|(_, _, item)| item),
            ))
        }
        Some(index) => {
            let after = match start {
                Some(start) => {
                    let (partition, slot) = index_slot(data, index, start)?;
                    if partition != condition.partition {
                        return Err(wrong_partition());
                    }
                    Some(slot)
                }
                None => None,
            };
            Ok(Box::new(
                index
                    .entries()
                    .partition(&condition.partition, after.as_ref(), forward)
                    .filter(move |(_, slot, _)| condition.accepts(slot.sort.as_ref()))
                    .filter_map(move |(_, slot, _)| data.get(&slot.key)),
            ))
        }
    }
}

/// Every entry of the table or index, strictly after the `start` cursor.
pub fn scan_entries<'a>(
    data: &'a TableData,
    index: Option<&'a SecondaryIndex>,
    start: Option<&Item>,
) -> Result<Entries<'a>, DynamoDBError> {
    match index {
        None => {
            let after = start
                .map(|s| data.key_schema.extract(s))
                .transpose()
                .map_err(invalid_start)?;
            Ok(Box::new(
                data.items()
                    .scan(after.as_ref().map(|k| (&k.partition, &k.sort)))
                    .map(|(_, _, item)| item),
            ))
        }
        Some(index) => {
            let after = start.map(|s| index_slot(data, index, s)).transpose()?;
            Ok(Box::new(
                index
                    .entries()
                    .scan(after.as_ref().map(|(p, slot)| (p, slot)))
                    .filter_map(move |(_, slot, _)| data.get(&slot.key)),
            ))
        }
    }
}

/// The cursor for `item`: the table key plus the index key, if any.
#[must_use]
pub fn cursor_for(data: &TableData, index: Option<&SecondaryIndex>, item: &Item) -> Item {
    let mut cursor = data.key_schema.key_item(item);
    if let Some(index) = index {
        cursor.extend(index.key_schema.key_item(item));
    }
    cursor
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// One page of a query or scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Entries the filter kept, in visit order.
    pub items: Vec<Item>,
    /// Entries read, kept or not.
    pub scanned: usize,
    /// Cursor to resume after the last entry read.
    pub last_key: Option<Item>,
}

/// Read up to `limit` entries, passing each through `select`.
///
/// `select` returns the item to emit, or `None` to drop it. A cursor is
/// returned when the limit stopped the walk and more entries follow.
pub fn paginate<'a, E>(
    entries: impl Iterator<Item = &'a Item>,
    limit: Option<usize>,
    mut select: impl FnMut(&Item) -> Result<Option<Item>, E>,
    cursor: impl Fn(&Item) -> Item,
) -> Result<Page, E> {
    let mut entries = entries.peekable();
    let mut page = Page::default();
    while let Some(item) = entries.next() {
        page.scanned += 1;
        if let Some(selected) = select(item)? {
            page.items.push(selected);
        }
        if limit.is_some_and(|limit| page.scanned >= limit) {
            if entries.peek().is_some() {
                page.last_key = Some(cursor(item));
            }
            break;
        }
    }
    Ok(page)
}

/// Resolve the key condition of a query, mapping failures for the client.
pub fn resolve_key_condition(
    expr: &Expr,
    schema: &KeySchema,
    names: &HashMap<String, String>,
    values: &HashMap<String, Value>,
) -> Result<KeyCondition, DynamoDBError> {
    KeyCondition::resolve(expr, schema, names, values)
        .map_err(expression_error_to_dynamodb)
}
