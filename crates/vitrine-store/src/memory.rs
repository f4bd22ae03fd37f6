//! In-memory [`ObjectStore`] used by fixtures and tests.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use parking_lot::RwLock;

use crate::{
    ObjectStore, StoreError, StoreResult,
    types::{ObjectDownload, ObjectMeta, ObjectRef, RangeSpec},
};

#[derive(Clone)]
struct StoredObject {
    bytes: Bytes,
    content_type: String,
}

/// In-memory peer of [`crate::HttpObjectStore`].
///
/// Serves correct `Content-Range` semantics for ranged gets and counts store
/// calls so tests can assert that parameter validation happens before any
/// store access.
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<(String, String), StoredObject>>>,
    calls: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object.
    pub fn insert<B: Into<Bytes>>(&self, bucket: &str, key: &str, bytes: B, content_type: &str) {
        self.objects.write().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes: bytes.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    /// Total number of store calls served (get + head + delete, including misses).
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, obj: &ObjectRef) -> StoreResult<StoredObject> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.objects
            .read()
            .get(&(obj.bucket.clone(), obj.key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                bucket: obj.bucket.clone(),
                key: obj.key.clone(),
            })
    }

    fn meta_for(stored: &StoredObject, slice: &Bytes, range: Option<&RangeSpec>) -> ObjectMeta {
        let total = stored.bytes.len() as u64;
        let content_range = range.map(|r| {
            let last = total.saturating_sub(1);
            let end = r.end.unwrap_or(last).min(last);
            format!("bytes {}-{}/{}", r.start, end, total)
        });
        ObjectMeta {
            content_type: Some(stored.content_type.clone()),
            content_length: Some(slice.len() as u64),
            content_range,
            etag: Some(format!("\"{:08x}\"", total)),
            last_modified: Some("Thu, 01 Jan 1970 00:00:00 GMT".to_string()),
            partial: range.is_some(),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, obj: &ObjectRef, range: Option<RangeSpec>) -> StoreResult<ObjectDownload> {
        let stored = self.lookup(obj)?;
        let total = stored.bytes.len() as u64;

        let slice = match &range {
            None => stored.bytes.clone(),
            Some(r) => {
                if r.start >= total {
                    return Err(StoreError::Status {
                        status: 416,
                        url: obj.to_string(),
                    });
                }
                let end = r.end.unwrap_or(total - 1).min(total - 1);
                stored.bytes.slice(r.start as usize..=end as usize)
            }
        };

        let meta = Self::meta_for(&stored, &slice, range.as_ref());
        Ok(ObjectDownload {
            meta,
            body: Box::pin(stream::once(async move { Ok(slice) })),
        })
    }

    async fn head(&self, obj: &ObjectRef) -> StoreResult<ObjectMeta> {
        let stored = self.lookup(obj)?;
        let bytes = stored.bytes.clone();
        Ok(Self::meta_for(&stored, &bytes, None))
    }

    async fn delete(&self, obj: &ObjectRef) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.objects
            .write()
            .remove(&(obj.bucket.clone(), obj.key.clone()))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                bucket: obj.bucket.clone(),
                key: obj.key.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use rstest::rstest;

    use super::*;

    async fn collect(download: ObjectDownload) -> Bytes {
        let chunks: Vec<Bytes> = download.body.try_collect().await.unwrap();
        chunks.concat().into()
    }

    #[rstest]
    #[tokio::test]
    async fn get_full_object() {
        let store = MemoryStore::new();
        store.insert("b", "k.bin", vec![7u8; 1000], "application/octet-stream");

        let obj = ObjectRef::new("b", "k.bin").unwrap();
        let download = store.get(&obj, None).await.unwrap();
        assert!(!download.meta.partial);
        assert_eq!(download.meta.content_length, Some(1000));
        assert_eq!(collect(download).await.len(), 1000);
    }

    #[rstest]
    #[tokio::test]
    async fn ranged_get_reports_content_range() {
        let store = MemoryStore::new();
        store.insert("b", "k.bin", vec![7u8; 1000], "application/octet-stream");

        let obj = ObjectRef::new("b", "k.bin").unwrap();
        let download = store
            .get(&obj, Some(RangeSpec::new(0, Some(99))))
            .await
            .unwrap();
        assert!(download.meta.partial);
        assert_eq!(download.meta.content_range.as_deref(), Some("bytes 0-99/1000"));
        assert_eq!(collect(download).await.len(), 100);
    }

    #[rstest]
    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = MemoryStore::new();
        let obj = ObjectRef::new("b", "absent").unwrap();
        assert!(matches!(store.get(&obj, None).await, Err(e) if e.is_not_found()));
        assert!(store.head(&obj).await.unwrap_err().is_not_found());
        assert_eq!(store.call_count(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn delete_removes_object() {
        let store = MemoryStore::new();
        store.insert("b", "k", b"x".as_slice(), "text/plain");
        let obj = ObjectRef::new("b", "k").unwrap();
        store.delete(&obj).await.unwrap();
        assert!(store.head(&obj).await.unwrap_err().is_not_found());
    }
}
