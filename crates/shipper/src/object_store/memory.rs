use super::{ObjectInfo, ObjectStore, PutReceipt};
use crate::error::ObjectStoreError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    metadata: HashMap<String, String>,
}

/// In-memory object store.
///
/// Failure injection: [`set_offline`](Self::set_offline) fails every call
/// with a network error; [`fail_next_puts`](Self::fail_next_puts) fails a
/// number of puts only.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    offline: AtomicBool,
    failing_puts: AtomicUsize,
    puts: AtomicUsize,
    put_delay: Mutex<Option<Duration>>,
}

impl MemoryObjectStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail (or succeed again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail the next `n` puts.
    pub fn fail_next_puts(&self, n: usize) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }

    /// Delay every put (to observe in-flight uploads).
    pub fn set_put_delay(&self, delay: Option<Duration>) {
        *self.put_delay.lock() = delay;
    }

    /// Puts that reached the store, successful or not.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    /// Metadata of a stored object.
    pub fn metadata(&self, key: &str) -> Option<HashMap<String, String>> {
        self.objects.lock().get(key).map(|o| o.metadata.clone())
    }

    /// Store an object directly, bypassing counters and failure switches.
    pub fn insert(&self, key: impl Into<String>, body: Bytes, metadata: HashMap<String, String>) {
        self.objects
            .lock()
            .insert(key.into(), StoredObject { body, metadata });
    }

    fn check_online(&self) -> Result<(), ObjectStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(ObjectStoreError::Network("object store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        metadata: HashMap<String, String>,
    ) -> Result<PutReceipt, ObjectStoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.put_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_online()?;
        let injected = self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ObjectStoreError::Network("injected put failure".to_string()));
        }

        self.insert(key, body, metadata);
        Ok(PutReceipt {
            key: key.to_string(),
            etag: None,
        })
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>, ObjectStoreError> {
        self.check_online()?;
        Ok(self.objects.lock().get(key).map(|o| ObjectInfo {
            size: o.body.len() as u64,
            metadata: o.metadata.clone(),
        }))
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        self.check_online()?;
        self.objects
            .lock()
            .get(key)
            .map(|o| o.body.clone())
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    fn location(&self) -> String {
        "memory://".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_head_get() {
        let store = MemoryObjectStore::new();
        let meta = HashMap::from([("k".to_string(), "v".to_string())]);
        store.put("a/b", Bytes::from_static(b"body"), meta).await.unwrap();

        let info = store.head("a/b").await.unwrap().unwrap();
        assert_eq!(info.size, 4);
        assert_eq!(info.metadata["k"], "v");
        assert_eq!(store.get("a/b").await.unwrap(), Bytes::from_static(b"body"));
        assert!(store.head("missing").await.unwrap().is_none());
        assert!(matches!(
            store.get("missing").await,
            Err(ObjectStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let store = MemoryObjectStore::new();
        store.fail_next_puts(1);
        assert!(store.put("k", Bytes::new(), HashMap::new()).await.is_err());
        assert!(store.put("k", Bytes::new(), HashMap::new()).await.is_ok());
        assert_eq!(store.put_count(), 2);

        store.set_offline(true);
        assert!(matches!(
            store.head("k").await,
            Err(ObjectStoreError::Network(_))
        ));
        store.set_offline(false);
        assert!(store.head("k").await.unwrap().is_some());
    }
}
