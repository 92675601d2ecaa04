//! Service state: the table registry and per-table metadata.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use minidyn_model::error::DynamoDBError;
use minidyn_model::types::{
    BillingMode, GlobalSecondaryIndexDescription, KeySchemaElement,
    LocalSecondaryIndexDescription, ProvisionedThroughput, TableDescription, TableStatus,
};

use crate::storage::{IndexKind, TableData};

/// Every table of one client, keyed by name.
#[derive(Debug, Default)]
pub struct ServiceState {
    tables: DashMap<String, Arc<Table>>,
}

impl ServiceState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.get(name).map(|r| Arc::clone(r.value()))
    }

    /// Get a table or return `ResourceNotFoundException`.
    pub fn require_table(&self, name: &str) -> Result<Arc<Table>, DynamoDBError> {
        self.get_table(name)
            .ok_or_else(DynamoDBError::table_not_found)
    }

    /// Insert a new table. Returns error if table already exists.
    pub fn create_table(&self, table: Table) -> Result<Arc<Table>, DynamoDBError> {
        match self.tables.entry(table.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(DynamoDBError::resource_in_use(
                "Cannot create preexisting table",
            )),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let table = Arc::new(table);
                e.insert(Arc::clone(&table));
                Ok(table)
            }
        }
    }

    /// Remove a table by name. Returns the removed table.
    pub fn delete_table(&self, name: &str) -> Result<Arc<Table>, DynamoDBError> {
        self.tables
            .remove(name)
            .map(|(_, t)| t)
            .ok_or_else(DynamoDBError::table_not_found)
    }

    /// List all table names (sorted).
    #[must_use]
    pub fn list_table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Remove all tables.
    pub fn reset(&self) {
        self.tables.clear();
    }
}

/// A table: identity, creation metadata and its lock-guarded data.
#[derive(Debug)]
pub struct Table {
    pub name: String,
    pub key_schema_elements: Vec<KeySchemaElement>,
    pub arn: String,
    /// Stable table ID (UUID v4), assigned at creation time.
    pub table_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    data: RwLock<TableData>,
}

impl Table {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        region: &str,
        key_schema_elements: Vec<KeySchemaElement>,
        data: TableData,
    ) -> Self {
        let name = name.into();
        Self {
            arn: format!("arn:aws:dynamodb:{region}:000000000000:table/{name}"),
            name,
            key_schema_elements,
            table_id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now(),
            data: RwLock::new(data),
        }
    }

    /// Shared access for reads, queries and scans.
    pub fn read(&self) -> RwLockReadGuard<'_, TableData> {
        self.data.read()
    }

    /// Exclusive access for condition-check-and-apply.
    pub fn write(&self) -> RwLockWriteGuard<'_, TableData> {
        self.data.write()
    }

    #[must_use]
    pub fn to_description(&self) -> TableDescription {
        let data = self.read();
        self.describe(&data, TableStatus::Active)
    }

    /// Describe the table from data the caller already holds a lock on.
    #[must_use]
    pub fn describe(&self, data: &TableData, status: TableStatus) -> TableDescription {
        #[allow(clippy::cast_precision_loss)] // Acceptable: DynamoDB returns epoch seconds as f64
        let creation_date_time = self.created_at.timestamp() as f64;
        let count = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);

        let mut global_secondary_indexes = Vec::new();
        let mut local_secondary_indexes = Vec::new();
        for index in data.indexes() {
            match index.kind {
                IndexKind::Global => {
                    global_secondary_indexes.push(GlobalSecondaryIndexDescription {
                        index_name: index.name.clone(),
                        key_schema: index.key_schema_elements.clone(),
                        projection: index.projection.clone(),
                        provisioned_throughput: index.provisioned_throughput,
                        item_count: count(index.len()),
                    });
                }
                IndexKind::Local => {
                    local_secondary_indexes.push(LocalSecondaryIndexDescription {
                        index_name: index.name.clone(),
                        key_schema: index.key_schema_elements.clone(),
                        projection: index.projection.clone(),
                        item_count: count(index.len()),
                    });
                }
            }
        }

        let provisioned_throughput = match data.billing_mode {
            BillingMode::PayPerRequest => ProvisionedThroughput::default(),
            BillingMode::Provisioned => data.provisioned_throughput.unwrap_or_default(),
        };
        TableDescription {
            table_name: self.name.clone(),
            table_status: status,
            key_schema: self.key_schema_elements.clone(),
            attribute_definitions: data.attribute_definitions.clone(),
            creation_date_time,
            item_count: count(data.item_count()),
            table_arn: self.arn.clone(),
            table_id: self.table_id.clone(),
            billing_mode: data.billing_mode.clone(),
            provisioned_throughput,
            global_secondary_indexes,
            local_secondary_indexes,
        }
    }
}
