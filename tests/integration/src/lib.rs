//! Scenario tests for minidyn.
//!
//! Every test builds its own [`MiniDyn`] client, so tests run in parallel
//! without sharing tables. Set `RUST_LOG=minidyn_core=debug` to see the
//! engine's logs.

use std::collections::HashMap;
use std::sync::Once;

use minidyn_core::{MiniDyn, MiniDynConfig};
use minidyn_model::AttributeValue;
use minidyn_model::input::{CreateTableInput, PutItemInput, QueryInput};
use minidyn_model::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, LocalSecondaryIndex,
    Projection, ScalarAttributeType,
};

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A fresh client with default configuration.
#[must_use]
pub fn client() -> MiniDyn {
    client_with(MiniDynConfig::default())
}

/// A fresh client built from `config`.
#[must_use]
pub fn client_with(config: MiniDynConfig) -> MiniDyn {
    init_tracing();
    MiniDyn::new(config)
}

/// Generate a unique table name for a test.
#[must_use]
pub fn test_table_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

#[must_use]
pub fn s(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_owned())
}

#[must_use]
pub fn n(value: &str) -> AttributeValue {
    AttributeValue::N(value.to_owned())
}

/// Build an item or key from name/value pairs.
#[must_use]
pub fn attrs(pairs: &[(&str, AttributeValue)]) -> HashMap<String, AttributeValue> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

/// A pokemon keyed by `id`, with its `type` and `level`.
#[must_use]
pub fn pokemon(id: &str, kind: &str, level: u32, name: &str) -> HashMap<String, AttributeValue> {
    attrs(&[
        ("id", s(id)),
        ("type", s(kind)),
        ("level", n(&level.to_string())),
        ("name", s(name)),
    ])
}

/// Create the pokedex table: hash key `id`, plus the `by-type` global
/// index on `type`/`id`.
pub fn create_pokedex(client: &MiniDyn, table_name: &str) -> anyhow::Result<()> {
    client.create_table(CreateTableInput {
        table_name: table_name.to_owned(),
        key_schema: vec![KeySchemaElement::hash("id")],
        attribute_definitions: vec![
            AttributeDefinition::new("id", ScalarAttributeType::S),
            AttributeDefinition::new("type", ScalarAttributeType::S),
        ],
        billing_mode: Some(BillingMode::PayPerRequest),
        global_secondary_indexes: Some(vec![GlobalSecondaryIndex {
            index_name: "by-type".to_owned(),
            key_schema: vec![KeySchemaElement::hash("type"), KeySchemaElement::range("id")],
            projection: Projection::all(),
            provisioned_throughput: None,
        }]),
        ..Default::default()
    })?;
    Ok(())
}

/// Create the evolutions table: hash key `type`, range key `id`, plus the
/// `by-level` local index on `type`/`level`.
pub fn create_evolutions(client: &MiniDyn, table_name: &str) -> anyhow::Result<()> {
    client.create_table(CreateTableInput {
        table_name: table_name.to_owned(),
        key_schema: vec![KeySchemaElement::hash("type"), KeySchemaElement::range("id")],
        attribute_definitions: vec![
            AttributeDefinition::new("type", ScalarAttributeType::S),
            AttributeDefinition::new("id", ScalarAttributeType::S),
            AttributeDefinition::new("level", ScalarAttributeType::N),
        ],
        billing_mode: Some(BillingMode::PayPerRequest),
        local_secondary_indexes: Some(vec![LocalSecondaryIndex {
            index_name: "by-level".to_owned(),
            key_schema: vec![KeySchemaElement::hash("type"), KeySchemaElement::range("level")],
            projection: Projection::all(),
        }]),
        ..Default::default()
    })?;
    Ok(())
}

pub fn put(
    client: &MiniDyn,
    table_name: &str,
    item: HashMap<String, AttributeValue>,
) -> anyhow::Result<()> {
    client.put_item(PutItemInput {
        table_name: table_name.to_owned(),
        item,
        ..Default::default()
    })?;
    Ok(())
}

/// A query on `index` for every item of `kind`.
#[must_use]
pub fn query_type(table_name: &str, index: Option<&str>, kind: &str) -> QueryInput {
    QueryInput {
        table_name: table_name.to_owned(),
        index_name: index.map(ToOwned::to_owned),
        key_condition_expression: Some("#t = :t".to_owned()),
        expression_attribute_names: HashMap::from([("#t".to_owned(), "type".to_owned())]),
        expression_attribute_values: attrs(&[(":t", s(kind))]),
        ..Default::default()
    }
}

/// The `name` attribute of each item, in order.
#[must_use]
pub fn names(items: &[HashMap<String, AttributeValue>]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.get("name").and_then(AttributeValue::as_s))
        .map(ToOwned::to_owned)
        .collect()
}

mod test_concurrency;
mod test_fault;
mod test_index;
mod test_interpreter;
mod test_query;
mod test_transaction;
