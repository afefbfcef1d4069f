use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Utc};
use tracing::debug;

use super::{
    format_timestamp, new_document_id, order_documents, CollectionPath, Document, DocumentStore,
    Fields, ListenerHandle, ListenerSlot, Query, SnapshotSink, StoreError, WriteMap,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Listener {
    query: Query,
    slot: ListenerSlot,
}

#[derive(Default)]
struct Shared {
    collections: Mutex<HashMap<CollectionPath, BTreeMap<String, Fields>>>,
    issued_ids: Mutex<HashSet<String>>,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_listener: AtomicU64,
    // serializes snapshot fan-out so listeners see writes in order
    fan_out: Mutex<()>,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
    unavailable: AtomicBool,
}

/// Process-local document store.
///
/// Listeners are notified synchronously from the write that changed their
/// collection.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    /// Simulates an outage: every call fails with `Unavailable` while `false`.
    pub fn set_available(&self, available: bool) {
        self.shared.unavailable.store(!available, Ordering::SeqCst);
    }

    #[cfg(test)]
    /// Simulates a transport failure on every listener of `collection`.
    pub fn fail_listeners(&self, collection: &CollectionPath, message: &str) {
        let failed: Vec<Listener> = {
            let mut listeners = lock(&self.shared.listeners);
            let ids: Vec<u64> = listeners
                .iter()
                .filter(|(_, l)| &l.query.collection == collection)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| listeners.remove(&id))
                .collect()
        };
        for listener in failed {
            tracing::warn!(collection = %collection, message, "failing live listener");
            listener
                .slot
                .fail(StoreError::Unavailable(message.to_string()));
        }
    }

    #[cfg(test)]
    /// Number of live listeners currently registered.
    pub fn listener_count(&self) -> usize {
        lock(&self.shared.listeners)
            .values()
            .filter(|l| l.slot.is_open())
            .count()
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".into()))
        } else {
            Ok(())
        }
    }

    /// Store clock, strictly increasing at microsecond resolution.
    fn stamp(&self) -> String {
        let mut last = lock(&self.shared.last_stamp);
        let now = Utc::now()
            .duration_trunc(Duration::microseconds(1))
            .unwrap_or_else(|_| Utc::now());
        let next = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        format_timestamp(next)
    }

    fn fresh_id(&self) -> String {
        let mut issued = lock(&self.shared.issued_ids);
        loop {
            let id = new_document_id();
            if issued.insert(id.clone()) {
                return id;
            }
        }
    }

    fn snapshot(&self, query: &Query) -> Vec<Document> {
        let collections = lock(&self.shared.collections);
        let docs = collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        order_documents(docs, &query.order_by)
    }

    fn notify(&self, changed: &[CollectionPath]) {
        let _order = lock(&self.shared.fan_out);
        let targets: Vec<(Query, ListenerSlot)> = lock(&self.shared.listeners)
            .values()
            .filter(|l| changed.contains(&l.query.collection))
            .map(|l| (l.query.clone(), l.slot.clone()))
            .collect();
        for (query, slot) in targets {
            let docs = self.snapshot(&query);
            slot.deliver(Ok(docs));
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.ensure_available()?;
        Ok(self.snapshot(query))
    }

    async fn get(
        &self,
        collection: &CollectionPath,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.ensure_available()?;
        let collections = lock(&self.shared.collections);
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document {
                id: id.to_string(),
                fields: fields.clone(),
            }))
    }

    async fn add(&self, collection: &CollectionPath, fields: WriteMap) -> Result<String, StoreError> {
        self.ensure_available()?;
        fields.validate()?;
        let id = self.fresh_id();
        let mut stored = Fields::new();
        fields.apply_to(&mut stored, &self.stamp());
        lock(&self.shared.collections)
            .entry(collection.clone())
            .or_default()
            .insert(id.clone(), stored);
        debug!(collection = %collection, %id, "document added");
        self.notify(std::slice::from_ref(collection));
        Ok(id)
    }

    async fn update(
        &self,
        collection: &CollectionPath,
        id: &str,
        fields: WriteMap,
    ) -> Result<(), StoreError> {
        self.ensure_available()?;
        fields.validate()?;
        let now = self.stamp();
        {
            let mut collections = lock(&self.shared.collections);
            let stored = collections
                .get_mut(collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or(StoreError::NotFound)?;
            fields.apply_to(stored, &now);
        }
        debug!(collection = %collection, %id, "document updated");
        self.notify(std::slice::from_ref(collection));
        Ok(())
    }

    async fn delete(&self, collection: &CollectionPath, id: &str) -> Result<(), StoreError> {
        self.ensure_available()?;
        let prefix = collection.nested_prefix(id);
        let mut changed = vec![collection.clone()];
        {
            let mut collections = lock(&self.shared.collections);
            if let Some(docs) = collections.get_mut(collection) {
                docs.remove(id);
            }
            let nested: Vec<CollectionPath> = collections
                .keys()
                .filter(|path| path.as_str().starts_with(&prefix))
                .cloned()
                .collect();
            for path in nested {
                collections.remove(&path);
                changed.push(path);
            }
        }
        debug!(collection = %collection, %id, "document deleted");
        self.notify(&changed);
        Ok(())
    }

    async fn subscribe(
        &self,
        query: &Query,
        sink: SnapshotSink,
    ) -> Result<ListenerHandle, StoreError> {
        self.ensure_available()?;
        let slot = ListenerSlot::new(sink);
        let listener_id = self.shared.next_listener.fetch_add(1, Ordering::SeqCst);
        {
            let _order = lock(&self.shared.fan_out);
            lock(&self.shared.listeners).insert(
                listener_id,
                Listener {
                    query: query.clone(),
                    slot: slot.clone(),
                },
            );
            slot.deliver(Ok(self.snapshot(query)));
        }
        debug!(collection = %query.collection, listener_id, "listener registered");

        let shared = Arc::downgrade(&self.shared);
        Ok(ListenerHandle::new(move || {
            slot.close();
            if let Some(shared) = shared.upgrade() {
                lock(&shared.listeners).remove(&listener_id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Direction, FieldWrite};
    use serde_json::json;

    fn shops() -> CollectionPath {
        CollectionPath::root("shops")
    }

    fn by_name() -> Query {
        Query::ordered(shops(), "name", Direction::Asc)
    }

    fn recorder() -> (SnapshotSink, Arc<Mutex<Vec<Result<Vec<Document>, StoreError>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: SnapshotSink =
            Arc::new(move |snap: Result<Vec<Document>, StoreError>| lock(&sink_seen).push(snap));
        (sink, seen)
    }

    #[tokio::test]
    async fn add_then_get_returns_stamped_document() {
        let store = MemoryStore::new();
        let id = store
            .add(
                &shops(),
                WriteMap::new().set("name", "A").server_timestamp("createdAt"),
            )
            .await
            .unwrap();

        let doc = store.get(&shops(), &id).await.unwrap().unwrap();
        assert_eq!(doc.fields["name"], json!("A"));
        assert!(doc.fields["createdAt"].is_string());
        assert!(store.get(&shops(), "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn add_rejects_unset_marker() {
        let store = MemoryStore::new();
        let mut payload = WriteMap::new().set("name", "A");
        payload.insert("area", FieldWrite::Unset);

        let err = store.add(&shops(), payload).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPayload(_)));
        assert!(store.query(&by_name()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_of_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update(&shops(), "nope", WriteMap::new().set("name", "x"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound);
    }

    #[tokio::test]
    async fn timestamps_strictly_increase() {
        let store = MemoryStore::new();
        let a = store.stamp();
        let b = store.stamp();
        assert!(b > a);
    }

    #[tokio::test]
    async fn delete_cascades_to_nested_collections() {
        let store = MemoryStore::new();
        let id = store
            .add(&shops(), WriteMap::new().set("name", "A"))
            .await
            .unwrap();
        let reviews = shops().child(&id, "reviews");
        store
            .add(&reviews, WriteMap::new().set("rating", 4).server_timestamp("createdAt"))
            .await
            .unwrap();

        store.delete(&shops(), &id).await.unwrap();

        let q = Query::ordered(reviews, "createdAt", Direction::Desc);
        assert!(store.query(&q).await.unwrap().is_empty());
        // deleting again is accepted
        store.delete(&shops(), &id).await.unwrap();
    }

    #[tokio::test]
    async fn listener_gets_initial_and_change_snapshots() {
        let store = MemoryStore::new();
        let (sink, seen) = recorder();
        let _handle = store.subscribe(&by_name(), sink).await.unwrap();

        store
            .add(&shops(), WriteMap::new().set("name", "A"))
            .await
            .unwrap();
        // other collections do not notify
        store
            .add(&CollectionPath::root("other"), WriteMap::new().set("name", "B"))
            .await
            .unwrap();

        let seen = lock(&seen);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].as_ref().unwrap().len(), 0);
        assert_eq!(seen[1].as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_listener_is_released() {
        let store = MemoryStore::new();
        let (sink, seen) = recorder();
        let mut handle = store.subscribe(&by_name(), sink).await.unwrap();
        assert_eq!(store.listener_count(), 1);

        handle.cancel();
        handle.cancel();
        assert_eq!(store.listener_count(), 0);

        store
            .add(&shops(), WriteMap::new().set("name", "A"))
            .await
            .unwrap();
        assert_eq!(lock(&seen).len(), 1);
    }

    #[tokio::test]
    async fn failed_listener_gets_terminal_error() {
        let store = MemoryStore::new();
        let (sink, seen) = recorder();
        let _handle = store.subscribe(&by_name(), sink).await.unwrap();

        store.fail_listeners(&shops(), "connection reset");
        store
            .add(&shops(), WriteMap::new().set("name", "A"))
            .await
            .unwrap();

        let seen = lock(&seen);
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[1],
            Err(StoreError::Unavailable("connection reset".into()))
        );
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.query(&by_name()).await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_available(true);
        assert!(store.query(&by_name()).await.is_ok());
    }
}
