//! In-memory storage engine for tables and their secondary indexes.
//!
//! Items live in a [`Keyspace`]: partition key values map to a `BTreeMap`
//! of sort slots, so a partition can be walked in sort order in either
//! direction and a scan visits every partition in key order.
//!
//! ```text
//! table:  BTreeMap<KeyValue, BTreeMap<Option<KeyValue>, Item>>
//! index:  BTreeMap<KeyValue, BTreeMap<IndexSlot, ()>>
//! ```
//!
//! An index entry points back at the table item through the table key in
//! its [`IndexSlot`]. [`TableData`] keeps every index in step with the
//! primary write: an item has an entry in an index exactly when it carries
//! non-null values for all of the index's key attributes.

use std::collections::BTreeMap;
use std::ops::Bound;

use bytes::Bytes;
use thiserror::Error;
use tracing::debug;

use minidyn_model::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, Projection, ProjectionType,
    ProvisionedThroughput, ScalarAttributeType,
};

use crate::value::{Item, Number, Value};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// A required key attribute was not found in the item.
    #[error("missing required key attribute: {attr}")]
    MissingKeyAttribute {
        /// The name of the missing attribute.
        attr: String,
    },
    /// A key attribute has the wrong type.
    #[error(
        "One or more parameter values were invalid: Type mismatch for key {attr} expected: {expected} actual: {actual}"
    )]
    InvalidKeyType {
        /// The name of the attribute.
        attr: String,
        /// The declared type.
        expected: String,
        /// The type found in the item.
        actual: &'static str,
    },
    /// A string or binary key attribute holds an empty value.
    #[error(
        "One or more parameter values are not valid. The AttributeValue for a key attribute cannot contain an empty {kind} value. Key: {attr}"
    )]
    EmptyKeyValue {
        /// The name of the attribute.
        attr: String,
        /// `string` or `binary`.
        kind: &'static str,
    },
    /// A key carries attributes outside the key schema.
    #[error("The provided key element does not match the schema")]
    KeyMismatch,
}

// ---------------------------------------------------------------------------
// Key types
// ---------------------------------------------------------------------------

/// A single key attribute definition with its name and scalar type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    /// The attribute name.
    pub name: String,
    /// The scalar type (S, N, or B).
    pub attr_type: ScalarAttributeType,
}

impl KeyAttribute {
    #[must_use]
    pub fn new(name: impl Into<String>, attr_type: ScalarAttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
        }
    }

    fn extract(&self, item: &Item) -> Result<KeyValue, StorageError> {
        let value = item
            .get(&self.name)
            .ok_or_else(|| StorageError::MissingKeyAttribute {
                attr: self.name.clone(),
            })?;
        KeyValue::from_value(self, value)
    }

    /// Type check without requiring presence. Null counts as absent.
    fn check(&self, item: &Item) -> Result<(), StorageError> {
        match item.get(&self.name) {
            None | Some(Value::Null) => Ok(()),
            Some(value) => KeyValue::from_value(self, value).map(|_| ()),
        }
    }
}

/// Parsed key schema for a table or index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    /// Partition (HASH) key name and type.
    pub partition_key: KeyAttribute,
    /// Optional sort (RANGE) key name and type.
    pub sort_key: Option<KeyAttribute>,
}

impl KeySchema {
    /// Resolve key schema elements against attribute definitions.
    ///
    /// Returns `None` when an element has no matching definition or the
    /// schema has no HASH element; the caller picks the error message.
    #[must_use]
    pub fn resolve(
        elements: &[KeySchemaElement],
        definitions: &[AttributeDefinition],
    ) -> Option<Self> {
        let lookup = |key_type: KeyType| -> Option<Option<KeyAttribute>> {
            let Some(element) = elements.iter().find(|e| e.key_type == key_type) else {
                return Some(None);
            };
            definitions
                .iter()
                .find(|d| d.attribute_name == element.attribute_name)
                .map(|d| Some(KeyAttribute::new(&d.attribute_name, d.attribute_type.clone())))
        };
        Some(Self {
            partition_key: lookup(KeyType::Hash)??,
            sort_key: lookup(KeyType::Range)?,
        })
    }

    /// Every key attribute name, partition key first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.partition_key.name.as_str())
            .chain(self.sort_key.as_ref().map(|k| k.name.as_str()))
    }

    /// Returns `true` if `name` is one of the key attributes.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    /// Extract the primary key of a full item.
    pub fn extract(&self, item: &Item) -> Result<PrimaryKey, StorageError> {
        let partition = self.partition_key.extract(item)?;
        let sort = self
            .sort_key
            .as_ref()
            .map(|k| k.extract(item))
            .transpose()?;
        Ok(PrimaryKey { partition, sort })
    }

    /// Parse a request key, which must name exactly the key attributes.
    pub fn parse_key(&self, key: &Item) -> Result<PrimaryKey, StorageError> {
        let primary = self.extract(key)?;
        if key.len() != self.names().count() {
            return Err(StorageError::KeyMismatch);
        }
        Ok(primary)
    }

    /// The key attributes of `item`, for cursors and key-only projections.
    #[must_use]
    pub fn key_item(&self, item: &Item) -> Item {
        self.names()
            .filter_map(|name| item.get(name).map(|v| (name.to_owned(), v.clone())))
            .collect()
    }

    fn check(&self, item: &Item) -> Result<(), StorageError> {
        self.partition_key.check(item)?;
        if let Some(sort) = &self.sort_key {
            sort.check(item)?;
        }
        Ok(())
    }
}

/// A scalar value usable as a key.
///
/// Ordering follows DynamoDB: strings and binaries by bytes, numbers
/// numerically. A keyspace only ever holds one variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    S(String),
    N(Number),
    B(Bytes),
}

impl KeyValue {
    /// Convert a value, checking it against the declared key type.
    pub fn from_value(attr: &KeyAttribute, value: &Value) -> Result<Self, StorageError> {
        let key = match (&attr.attr_type, value) {
            (ScalarAttributeType::S, Value::String(s)) => {
                if s.is_empty() {
                    return Err(StorageError::EmptyKeyValue {
                        attr: attr.name.clone(),
                        kind: "string",
                    });
                }
                Self::S(s.clone())
            }
            (ScalarAttributeType::N, Value::Number(n)) => Self::N(*n),
            (ScalarAttributeType::B, Value::Binary(b)) => {
                if b.is_empty() {
                    return Err(StorageError::EmptyKeyValue {
                        attr: attr.name.clone(),
                        kind: "binary",
                    });
                }
                Self::B(b.clone())
            }
            (expected, actual) => {
                return Err(StorageError::InvalidKeyType {
                    attr: attr.name.clone(),
                    expected: expected.as_str().to_owned(),
                    actual: actual.type_name(),
                });
            }
        };
        Ok(key)
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::S(s) => Value::String(s.clone()),
            Self::N(n) => Value::Number(*n),
            Self::B(b) => Value::Binary(b.clone()),
        }
    }
}

/// A primary key consisting of a partition key and an optional sort key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrimaryKey {
    /// The partition (HASH) key value.
    pub partition: KeyValue,
    /// The sort (RANGE) key value, when the schema has one.
    pub sort: Option<KeyValue>,
}

/// Position of an entry inside one index partition.
///
/// Index keys need not be unique, so the table key breaks ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexSlot {
    /// The index sort key value.
    pub sort: Option<KeyValue>,
    /// The key of the table item this entry points at.
    pub key: PrimaryKey,
}

// ---------------------------------------------------------------------------
// Keyspace
// ---------------------------------------------------------------------------

/// Entry yielded by keyspace iteration: partition, slot and payload.
pub type KeyspaceEntry<'a, S, V> = (&'a KeyValue, &'a S, &'a V);

/// Boxed keyspace iterator.
pub type KeyspaceIter<'a, S, V> = Box<dyn Iterator<Item = KeyspaceEntry<'a, S, V>> + 'a>;

/// Partitioned, ordered map shared by tables and indexes.
#[derive(Debug, Clone)]
pub struct Keyspace<S, V> {
    partitions: BTreeMap<KeyValue, BTreeMap<S, V>>,
    len: usize,
}

impl<S, V> Default for Keyspace<S, V> {
    fn default() -> Self {
        Self {
            partitions: BTreeMap::new(),
            len: 0,
        }
    }
}

impl<S: Ord + Clone, V> Keyspace<S, V> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn get(&self, partition: &KeyValue, slot: &S) -> Option<&V> {
        self.partitions.get(partition)?.get(slot)
    }

    pub fn insert(&mut self, partition: KeyValue, slot: S, value: V) -> Option<V> {
        let old = self
            .partitions
            .entry(partition)
            .or_default()
            .insert(slot, value);
        if old.is_none() {
            self.len += 1;
        }
        old
    }

    pub fn remove(&mut self, partition: &KeyValue, slot: &S) -> Option<V> {
        let entries = self.partitions.get_mut(partition)?;
        let old = entries.remove(slot)?;
        if entries.is_empty() {
            self.partitions.remove(partition);
        }
        self.len -= 1;
        Some(old)
    }

    /// Entries of one partition strictly after `after`, in sort order or
    /// reversed.
    pub fn partition<'a>(
        &'a self,
        partition: &KeyValue,
        after: Option<&S>,
        forward: bool,
    ) -> KeyspaceIter<'a, S, V>
    where
        S: 'a,
        V: 'a,
    {
        let Some((key, entries)) = self.partitions.get_key_value(partition) else {
            return Box::new(std::iter::empty());
        };
        let range = match (after, forward) {
            (None, _) => (Bound::Unbounded, Bound::Unbounded),
            (Some(slot), true) => (Bound::Excluded(slot.clone()), Bound::Unbounded),
            (Some(slot), false) => (Bound::Unbounded, Bound::Excluded(slot.clone())),
        };
        let iter = entries.range(range).map(move |(s, v)| (key, s, v));
        if forward {
            Box::new(iter)
        } else {
            Box::new(iter.rev())
        }
    }

    /// Every entry strictly after `after`, partitions in key order.
    pub fn scan<'a>(&'a self, after: Option<(&KeyValue, &S)>) -> KeyspaceIter<'a, S, V>
    where
        S: 'a,
        V: 'a,
    {
        let Some((partition, slot)) = after else {
            return Box::new(
                self.partitions
                    .iter()
                    .flat_map(|(p, entries)| entries.iter().map(move |(s, v)| (p, s, v))),
            );
        };
        let rest = self
            .partitions
            .range((Bound::Excluded(partition.clone()), Bound::Unbounded))
            .flat_map(|(p, entries)| entries.iter().map(move |(s, v)| (p, s, v)));
        Box::new(self.partition(partition, Some(slot), true).chain(rest))
    }
}

// ---------------------------------------------------------------------------
// Secondary indexes
// ---------------------------------------------------------------------------

/// Whether an index shares the table's partition key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Local,
    Global,
}

/// A local or global secondary index.
#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    pub name: String,
    pub kind: IndexKind,
    /// The elements the index was declared with, for descriptions.
    pub key_schema_elements: Vec<KeySchemaElement>,
    pub key_schema: KeySchema,
    pub projection: Projection,
    pub provisioned_throughput: Option<ProvisionedThroughput>,
    entries: Keyspace<IndexSlot, ()>,
}

impl SecondaryIndex {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: IndexKind,
        key_schema_elements: Vec<KeySchemaElement>,
        key_schema: KeySchema,
        projection: Projection,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            key_schema_elements,
            key_schema,
            projection,
            provisioned_throughput: None,
            entries: Keyspace::default(),
        }
    }

    #[must_use]
    pub fn with_throughput(mut self, throughput: Option<ProvisionedThroughput>) -> Self {
        self.provisioned_throughput = throughput;
        self
    }

    #[must_use]
    pub fn entries(&self) -> &Keyspace<IndexSlot, ()> {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Where `item` belongs in this index, or `None` if it is not indexed.
    fn locate(&self, key: &PrimaryKey, item: &Item) -> Option<(KeyValue, IndexSlot)> {
        let index_key = self.key_schema.extract(item).ok()?;
        Some((
            index_key.partition,
            IndexSlot {
                sort: index_key.sort,
                key: key.clone(),
            },
        ))
    }

    /// Move this index's entry for `key` from `old` to `new`.
    fn reconcile(&mut self, key: &PrimaryKey, old: Option<&Item>, new: Option<&Item>) {
        let before = old.and_then(|item| self.locate(key, item));
        let after = new.and_then(|item| self.locate(key, item));
        if before == after {
            return;
        }
        if let Some((partition, slot)) = before {
            self.entries.remove(&partition, &slot);
        }
        if let Some((partition, slot)) = after {
            self.entries.insert(partition, slot, ());
        }
    }

    /// The attributes an index query returns for `item`.
    #[must_use]
    pub fn project(&self, table_key: &KeySchema, item: &Item) -> Item {
        match self.projection.projection_type {
            None | Some(ProjectionType::All) => item.clone(),
            Some(ref kind) => {
                let mut projected = table_key.key_item(item);
                projected.extend(self.key_schema.key_item(item));
                if *kind == ProjectionType::Include {
                    for name in &self.projection.non_key_attributes {
                        if let Some(value) = item.get(name) {
                            projected.insert(name.clone(), value.clone());
                        }
                    }
                }
                projected
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TableData
// ---------------------------------------------------------------------------

/// Everything guarded by a table's lock: metadata, items and indexes.
#[derive(Debug, Clone)]
pub struct TableData {
    pub key_schema: KeySchema,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub billing_mode: BillingMode,
    pub provisioned_throughput: Option<ProvisionedThroughput>,
    items: Keyspace<Option<KeyValue>, Item>,
    indexes: Vec<SecondaryIndex>,
}

impl TableData {
    #[must_use]
    pub fn new(key_schema: KeySchema, attribute_definitions: Vec<AttributeDefinition>) -> Self {
        Self {
            key_schema,
            attribute_definitions,
            billing_mode: BillingMode::PayPerRequest,
            provisioned_throughput: None,
            items: Keyspace::default(),
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn items(&self) -> &Keyspace<Option<KeyValue>, Item> {
        &self.items
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn get(&self, key: &PrimaryKey) -> Option<&Item> {
        self.items.get(&key.partition, &key.sort)
    }

    pub fn indexes(&self) -> impl Iterator<Item = &SecondaryIndex> {
        self.indexes.iter()
    }

    #[must_use]
    pub fn index(&self, name: &str) -> Option<&SecondaryIndex> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn index_mut(&mut self, name: &str) -> Option<&mut SecondaryIndex> {
        self.indexes.iter_mut().find(|i| i.name == name)
    }

    /// Add an index and backfill it from the stored items.
    pub fn add_index(&mut self, mut index: SecondaryIndex) {
        for (partition, sort, item) in self.items.scan(None) {
            let key = PrimaryKey {
                partition: partition.clone(),
                sort: sort.clone(),
            };
            index.reconcile(&key, None, Some(item));
        }
        debug!(index = %index.name, entries = index.len(), "added secondary index");
        self.indexes.push(index);
    }

    pub fn remove_index(&mut self, name: &str) -> Option<SecondaryIndex> {
        let position = self.indexes.iter().position(|i| i.name == name)?;
        Some(self.indexes.remove(position))
    }

    /// Check that `item` can be stored: a complete primary key and index key
    /// attributes of the declared types.
    pub fn validate(&self, item: &Item) -> Result<PrimaryKey, StorageError> {
        let key = self.key_schema.extract(item)?;
        for index in &self.indexes {
            index.key_schema.check(item)?;
        }
        Ok(key)
    }

    /// Insert or replace an item, returning the previous version.
    pub fn put(&mut self, item: Item) -> Result<Option<Item>, StorageError> {
        let key = self.validate(&item)?;
        let old = self
            .items
            .insert(key.partition.clone(), key.sort.clone(), item);
        self.reindex(&key, old.as_ref());
        debug!(replaced = old.is_some(), "stored item");
        Ok(old)
    }

    /// Remove an item, returning it if it existed.
    pub fn delete(&mut self, key: &PrimaryKey) -> Option<Item> {
        let old = self.items.remove(&key.partition, &key.sort)?;
        self.reindex(key, Some(&old));
        debug!("deleted item");
        Some(old)
    }

    fn reindex(&mut self, key: &PrimaryKey, old: Option<&Item>) {
        let new = self.items.get(&key.partition, &key.sort);
        for index in &mut self.indexes {
            index.reconcile(key, old, new);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(pk: &str, sk: Option<&str>) -> KeySchema {
        KeySchema {
            partition_key: KeyAttribute::new(pk, ScalarAttributeType::S),
            sort_key: sk.map(|s| KeyAttribute::new(s, ScalarAttributeType::N)),
        }
    }

    fn item(pairs: &[(&str, Value)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn pokemon(id: &str, kind: &str, level: i64) -> Item {
        item(&[
            ("id", Value::from(id)),
            ("type", Value::from(kind)),
            ("level", Value::from(level)),
        ])
    }

    fn table_with_type_index() -> TableData {
        let mut data = TableData::new(schema("id", None), Vec::new());
        data.add_index(SecondaryIndex::new(
            "by-type",
            IndexKind::Global,
            vec![
                KeySchemaElement::hash("type"),
                KeySchemaElement::range("level"),
            ],
            schema("type", Some("level")),
            Projection::all(),
        ));
        data
    }

    fn index_keys(data: &TableData) -> Vec<(KeyValue, IndexSlot)> {
        data.index("by-type")
            .unwrap()
            .entries()
            .scan(None)
            .map(|(p, s, ())| (p.clone(), s.clone()))
            .collect()
    }

    #[test]
    fn test_should_put_and_get_item() {
        let mut data = TableData::new(schema("id", None), Vec::new());
        let old = data.put(pokemon("001", "grass", 5)).unwrap();
        assert!(old.is_none());
        let key = data.key_schema.extract(&pokemon("001", "", 0)).unwrap();
        assert_eq!(data.get(&key).unwrap()["type"], Value::from("grass"));
        assert_eq!(data.item_count(), 1);
    }

    #[test]
    fn test_should_replace_existing_item() {
        let mut data = TableData::new(schema("id", None), Vec::new());
        data.put(pokemon("001", "grass", 5)).unwrap();
        let old = data.put(pokemon("001", "fire", 6)).unwrap();
        assert_eq!(old.unwrap()["type"], Value::from("grass"));
        assert_eq!(data.item_count(), 1);
    }

    #[test]
    fn test_should_error_on_missing_key() {
        let mut data = TableData::new(schema("id", None), Vec::new());
        let err = data.put(item(&[("name", Value::from("x"))])).unwrap_err();
        assert!(matches!(err, StorageError::MissingKeyAttribute { attr } if attr == "id"));
    }

    #[test]
    fn test_should_error_on_invalid_key_type() {
        let mut data = TableData::new(schema("id", None), Vec::new());
        let err = data.put(item(&[("id", Value::from(1))])).unwrap_err();
        assert!(matches!(err, StorageError::InvalidKeyType { actual: "N", .. }));
        let err = data.put(item(&[("id", Value::from(""))])).unwrap_err();
        assert!(matches!(err, StorageError::EmptyKeyValue { .. }));
    }

    #[test]
    fn test_should_reject_extra_key_attributes() {
        let key_schema = schema("id", None);
        let err = key_schema
            .parse_key(&item(&[("id", Value::from("1")), ("x", Value::from(1))]))
            .unwrap_err();
        assert_eq!(err, StorageError::KeyMismatch);
    }

    #[test]
    fn test_should_sort_numbers_numerically() {
        let mut data = TableData::new(schema("pk", Some("n")), Vec::new());
        for n in [10, 9, -1, 100] {
            data.put(item(&[("pk", Value::from("a")), ("n", Value::from(n))]))
                .unwrap();
        }
        let order: Vec<String> = data
            .items()
            .scan(None)
            .map(|(_, _, item)| item["n"].to_string())
            .collect();
        assert_eq!(order, vec!["-1", "9", "10", "100"]);
    }

    #[test]
    fn test_should_walk_partition_in_both_directions() {
        let mut data = TableData::new(schema("pk", Some("n")), Vec::new());
        for n in 1..=4 {
            data.put(item(&[("pk", Value::from("a")), ("n", Value::from(n))]))
                .unwrap();
        }
        data.put(item(&[("pk", Value::from("b")), ("n", Value::from(1))]))
            .unwrap();
        let partition = KeyValue::S("a".into());
        let after = Some(KeyValue::N(Number::from(2)));

        let forward: Vec<String> = data
            .items()
            .partition(&partition, Some(&after), true)
            .map(|(_, _, item)| item["n"].to_string())
            .collect();
        assert_eq!(forward, vec!["3", "4"]);

        let backward: Vec<String> = data
            .items()
            .partition(&partition, Some(&after), false)
            .map(|(_, _, item)| item["n"].to_string())
            .collect();
        assert_eq!(backward, vec!["1"]);
    }

    #[test]
    fn test_should_resume_scan_across_partitions() {
        let mut data = TableData::new(schema("pk", None), Vec::new());
        for pk in ["a", "b", "c"] {
            data.put(item(&[("pk", Value::from(pk))])).unwrap();
        }
        let rest: Vec<String> = data
            .items()
            .scan(Some((&KeyValue::S("a".into()), &None)))
            .map(|(p, _, _)| p.to_value().to_string())
            .collect();
        assert_eq!(rest, vec!["b", "c"]);
    }

    #[test]
    fn test_should_move_index_entry_when_key_attribute_changes() {
        let mut data = table_with_type_index();
        data.put(pokemon("001", "grass", 5)).unwrap();
        assert_eq!(index_keys(&data)[0].0, KeyValue::S("grass".into()));

        data.put(pokemon("001", "poison", 5)).unwrap();
        let keys = index_keys(&data);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].0, KeyValue::S("poison".into()));
    }

    #[test]
    fn test_should_only_index_items_with_all_index_keys() {
        let mut data = table_with_type_index();
        data.put(item(&[("id", Value::from("001")), ("type", Value::from("grass"))]))
            .unwrap();
        data.put(item(&[
            ("id", Value::from("002")),
            ("type", Value::Null),
            ("level", Value::from(3)),
        ]))
        .unwrap();
        assert!(index_keys(&data).is_empty());

        data.put(pokemon("001", "grass", 1)).unwrap();
        assert_eq!(index_keys(&data).len(), 1);
    }

    #[test]
    fn test_should_remove_index_entries_on_delete() {
        let mut data = table_with_type_index();
        data.put(pokemon("001", "grass", 5)).unwrap();
        let key = data.key_schema.extract(&pokemon("001", "", 0)).unwrap();
        assert!(data.delete(&key).is_some());
        assert!(index_keys(&data).is_empty());
        assert!(data.delete(&key).is_none());
    }

    #[test]
    fn test_should_reject_wrong_index_key_type() {
        let mut data = table_with_type_index();
        let err = data
            .put(item(&[("id", Value::from("001")), ("type", Value::from(1))]))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKeyType { .. }));
        assert_eq!(data.item_count(), 0);
    }

    #[test]
    fn test_should_backfill_new_index() {
        let mut data = TableData::new(schema("id", None), Vec::new());
        data.put(pokemon("001", "grass", 5)).unwrap();
        data.put(pokemon("002", "fire", 7)).unwrap();
        data.add_index(SecondaryIndex::new(
            "by-type",
            IndexKind::Global,
            Vec::new(),
            schema("type", Some("level")),
            Projection::all(),
        ));
        assert_eq!(index_keys(&data).len(), 2);
        assert!(data.remove_index("by-type").is_some());
        assert!(data.index("by-type").is_none());
    }

    #[test]
    fn test_should_project_keys_only() {
        let index = SecondaryIndex::new(
            "by-type",
            IndexKind::Global,
            Vec::new(),
            schema("type", Some("level")),
            Projection {
                projection_type: Some(ProjectionType::KeysOnly),
                non_key_attributes: Vec::new(),
            },
        );
        let mut full = pokemon("001", "grass", 5);
        full.insert("name".into(), Value::from("Bulbasaur"));
        let projected = index.project(&schema("id", None), &full);
        assert_eq!(projected.len(), 3);
        assert!(!projected.contains_key("name"));
    }

    #[test]
    fn test_should_resolve_key_schema_from_definitions() {
        let elements = vec![KeySchemaElement::hash("id"), KeySchemaElement::range("n")];
        let definitions = vec![
            AttributeDefinition::new("id", ScalarAttributeType::S),
            AttributeDefinition::new("n", ScalarAttributeType::N),
        ];
        let resolved = KeySchema::resolve(&elements, &definitions).unwrap();
        assert_eq!(resolved.names().collect::<Vec<_>>(), vec!["id", "n"]);
        assert!(KeySchema::resolve(&elements, &definitions[..1]).is_none());
        assert!(KeySchema::resolve(&elements[1..], &definitions).is_none());
    }
}
