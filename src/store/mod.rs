//! Document store seam.
//!
//! Shops and reviews live in a document store: collections of documents keyed
//! by opaque ids, each document an untyped JSON object. Everything above this
//! module talks to the store through [`DocumentStore`], so the same
//! repositories and feed run against Postgres in production and against
//! [`MemoryStore`] in tests or local development.

pub mod memory;
pub mod postgres;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Raw field bag of a stored document.
pub type Fields = serde_json::Map<String, Value>;

/// Length of store-assigned document ids.
const DOCUMENT_ID_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("document not found")]
    NotFound,
    #[error("invalid write payload: {0}")]
    InvalidPayload(String),
}

/// Slash separated collection path, e.g. `shops` or `shops/abc/reviews`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Sub-collection living inside the document `parent_id` of `self`.
    pub fn child(&self, parent_id: &str, name: &str) -> Self {
        Self(format!("{}/{}/{}", self.0, parent_id, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix shared by every sub-collection nested under document `id`.
    pub fn nested_prefix(&self, id: &str) -> String {
        format!("{}/{}/", self.0, id)
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// A whole collection ordered by one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub collection: CollectionPath,
    pub order_by: OrderBy,
}

impl Query {
    pub fn ordered(collection: CollectionPath, field: &str, direction: Direction) -> Self {
        Self {
            collection,
            order_by: OrderBy {
                field: field.to_string(),
                direction,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// One key of a write payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldWrite {
    Value(Value),
    /// Explicit no-value marker: the stored field is removed.
    Clear,
    /// Stamped with the store clock at write time.
    ServerTimestamp,
    /// Undefined marker. Stores reject any payload still carrying one.
    Unset,
}

/// Write payload handed to [`DocumentStore::add`] and [`DocumentStore::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteMap(BTreeMap<String, FieldWrite>);

impl WriteMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, write: FieldWrite) {
        self.0.insert(key.to_string(), write);
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, FieldWrite::Value(value.into()));
        self
    }

    /// Sets `key` when `value` is present; `None` leaves the key out entirely.
    pub fn set_opt<V: Into<Value>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(key, v),
            None => self,
        }
    }

    /// Like [`WriteMap::set_opt`], but records `None` as an unset marker that
    /// [`strip_unset`] must remove before the payload reaches a store.
    pub fn set_maybe<V: Into<Value>>(mut self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(key, v),
            None => {
                self.insert(key, FieldWrite::Unset);
                self
            }
        }
    }

    pub fn clear(mut self, key: &str) -> Self {
        self.insert(key, FieldWrite::Clear);
        self
    }

    pub fn server_timestamp(mut self, key: &str) -> Self {
        self.insert(key, FieldWrite::ServerTimestamp);
        self
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&FieldWrite> {
        self.0.get(key)
    }

    #[cfg(test)]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Refuses payloads that still contain an [`FieldWrite::Unset`] marker.
    pub fn validate(&self) -> Result<(), StoreError> {
        match self.0.iter().find(|(_, w)| matches!(w, FieldWrite::Unset)) {
            Some((key, _)) => Err(StoreError::InvalidPayload(format!(
                "field `{key}` carries an unset marker"
            ))),
            None => Ok(()),
        }
    }

    /// Applies the payload onto `target`, stamping timestamps with `now`.
    pub fn apply_to(&self, target: &mut Fields, now: &str) {
        for (key, write) in &self.0 {
            match write {
                FieldWrite::Value(v) => {
                    target.insert(key.clone(), v.clone());
                }
                FieldWrite::Clear => {
                    target.remove(key);
                }
                FieldWrite::ServerTimestamp => {
                    target.insert(key.clone(), Value::String(now.to_string()));
                }
                FieldWrite::Unset => {}
            }
        }
    }
}

impl FromIterator<(String, FieldWrite)> for WriteMap {
    fn from_iter<I: IntoIterator<Item = (String, FieldWrite)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for WriteMap {
    type Item = (String, FieldWrite);
    type IntoIter = std::collections::btree_map::IntoIter<String, FieldWrite>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Drops every unset entry so the payload can be persisted.
pub fn strip_unset(map: WriteMap) -> WriteMap {
    map.into_iter()
        .filter(|(_, w)| !matches!(w, FieldWrite::Unset))
        .collect()
}

/// Callback receiving every snapshot of a live query, or its terminal failure.
pub type SnapshotSink = Arc<dyn Fn(Result<Vec<Document>, StoreError>) + Send + Sync>;

/// Shared delivery slot between a store's notifier and the listener handle.
///
/// Delivery happens while the slot lock is held, so once [`ListenerSlot::close`]
/// returns the sink is never called again.
#[derive(Clone)]
pub(crate) struct ListenerSlot {
    sink: Arc<Mutex<Option<SnapshotSink>>>,
}

impl ListenerSlot {
    pub(crate) fn new(sink: SnapshotSink) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Some(sink))),
        }
    }

    pub(crate) fn deliver(&self, snapshot: Result<Vec<Document>, StoreError>) -> bool {
        let guard = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sink) => {
                sink(snapshot);
                true
            }
            None => false,
        }
    }

    /// Delivers a terminal failure and closes the slot.
    pub(crate) fn fail(&self, err: StoreError) {
        let mut guard = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sink) = guard.take() {
            sink(Err(err));
        }
    }

    pub(crate) fn close(&self) {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Owned cancellation handle of a live listener. Dropping it cancels.
pub struct ListenerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Releases the listener. Calling it again is a no-op.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document of the collection carrying the ordering field, ordered by it.
    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    async fn get(&self, collection: &CollectionPath, id: &str)
        -> Result<Option<Document>, StoreError>;

    /// Inserts a document under a fresh store-assigned id and returns it.
    async fn add(&self, collection: &CollectionPath, fields: WriteMap) -> Result<String, StoreError>;

    /// Merges `fields` into an existing document.
    async fn update(
        &self,
        collection: &CollectionPath,
        id: &str,
        fields: WriteMap,
    ) -> Result<(), StoreError>;

    /// Hard delete, including every sub-collection nested under the document.
    async fn delete(&self, collection: &CollectionPath, id: &str) -> Result<(), StoreError>;

    /// Registers a live listener. The first snapshot is delivered before this returns.
    async fn subscribe(
        &self,
        query: &Query,
        sink: SnapshotSink,
    ) -> Result<ListenerHandle, StoreError>;
}

pub fn new_document_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DOCUMENT_ID_LEN)
        .map(char::from)
        .collect()
}

/// Canonical text form of a server timestamp; lexical order is chronological.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over field values: by type first, then by value.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Keeps documents that carry the ordering field and sorts them, ties broken by id.
pub fn order_documents(mut docs: Vec<Document>, order: &OrderBy) -> Vec<Document> {
    docs.retain(|d| d.fields.contains_key(&order.field));
    docs.sort_by(|a, b| {
        let ord = compare_values(&a.fields[&order.field], &b.fields[&order.field])
            .then_with(|| a.id.cmp(&b.id));
        match order.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    });
    docs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn doc(id: &str, fields: Value) -> Document {
        Document {
            id: id.to_string(),
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn set_opt_leaves_missing_values_out() {
        let map = WriteMap::new()
            .set("name", "Test Shop")
            .set_opt::<String>("area", None)
            .set_opt("genre", Some("vintage"));

        assert_eq!(map.len(), 2);
        assert!(!map.contains_key("area"));
        assert_eq!(map.get("genre"), Some(&FieldWrite::Value(json!("vintage"))));
    }

    #[test]
    fn unset_markers_are_rejected_until_stripped() {
        let mut map = WriteMap::new().set("name", "Test Shop");
        map.insert("area", FieldWrite::Unset);

        assert!(matches!(map.validate(), Err(StoreError::InvalidPayload(_))));

        let stripped = strip_unset(map);
        assert!(stripped.validate().is_ok());
        assert!(!stripped.contains_key("area"));
        assert!(stripped.contains_key("name"));
    }

    #[test]
    fn apply_clears_and_stamps() {
        let mut fields = json!({"name": "Old", "area": "Ginza"})
            .as_object()
            .cloned()
            .unwrap();
        WriteMap::new()
            .set("name", "New")
            .clear("area")
            .server_timestamp("updatedAt")
            .apply_to(&mut fields, "2024-01-01T00:00:00.000000Z");

        assert_eq!(fields["name"], json!("New"));
        assert!(!fields.contains_key("area"));
        assert_eq!(fields["updatedAt"], json!("2024-01-01T00:00:00.000000Z"));
    }

    #[test]
    fn ordering_drops_documents_without_the_field() {
        let docs = vec![
            doc("b", json!({"name": "b"})),
            doc("x", json!({"area": "none"})),
            doc("a", json!({"name": "a"})),
            doc("C", json!({"name": "C"})),
        ];
        let order = OrderBy {
            field: "name".into(),
            direction: Direction::Asc,
        };
        let ids: Vec<_> = order_documents(docs, &order)
            .into_iter()
            .map(|d| d.id)
            .collect();
        // byte order: uppercase sorts first
        assert_eq!(ids, vec!["C", "a", "b"]);
    }

    #[test]
    fn descending_order_reverses() {
        let docs = vec![
            doc("1", json!({"createdAt": "2024-01-01T00:00:00.000001Z"})),
            doc("2", json!({"createdAt": "2024-01-01T00:00:00.000002Z"})),
        ];
        let order = OrderBy {
            field: "createdAt".into(),
            direction: Direction::Desc,
        };
        let ids: Vec<_> = order_documents(docs, &order)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[test]
    fn document_ids_are_alphanumeric() {
        let id = new_document_id();
        assert_eq!(id.len(), DOCUMENT_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, new_document_id());
    }

    #[test]
    fn closed_slot_never_delivers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let slot = ListenerSlot::new(Arc::new(move |_: Result<Vec<Document>, StoreError>| {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        }));

        assert!(slot.deliver(Ok(vec![])));
        slot.close();
        assert!(!slot.deliver(Ok(vec![])));
        slot.fail(StoreError::Unavailable("gone".into()));
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
        assert!(!slot.is_open());
    }

    #[test]
    fn handle_cancels_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut handle = ListenerHandle::new(move || {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        });
        handle.cancel();
        handle.cancel();
        drop(handle);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn timestamps_round_trip() {
        let now = Utc::now();
        let text = format_timestamp(now);
        let parsed = parse_timestamp(&Value::String(text)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
        assert!(parse_timestamp(&json!(12)).is_none());
    }
}
