//! HTTP-response-shaped backend.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    io::Write,
    path::PathBuf,
};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::fs;
use url::Url;
use vitrine_store::ObjectRef;

use crate::{
    CacheResult,
    backend::{CacheBackend, EntryInfo, EntryWriter},
    cache::gateway_object_url,
};

/// Sidecar metadata for one stored response.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    /// The proxied object URL this entry is keyed by.
    url: String,
    content_length: u64,
}

/// Flat key-value backend mapping proxied object URLs to response-shaped
/// entries: a `<hash>.body` file plus a `<hash>.meta.json` sidecar.
///
/// The write primitive is all-at-once: writers buffer the full object and
/// commit on finish. The meta sidecar is written last and marks the entry
/// committed.
pub struct ResponseStoreBackend {
    root: PathBuf,
    gateway_base: Url,
}

impl ResponseStoreBackend {
    pub fn new<P: Into<PathBuf>>(root: P, gateway_base: Url) -> Self {
        Self {
            root: root.into(),
            gateway_base,
        }
    }

    /// Deterministic entry name for one object: hash of its proxied URL.
    ///
    /// Uses the standard library hasher, so names are not guaranteed stable
    /// across Rust versions; a version bump makes old entries unreachable
    /// (they are reclaimed by `clear_all`).
    fn entry_name(&self, obj: &ObjectRef) -> String {
        let url = gateway_object_url(&self.gateway_base, obj);
        let mut hasher = DefaultHasher::new();
        url.as_str().hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    fn body_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.body"))
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.meta.json"))
    }

    async fn is_committed(&self, name: &str) -> bool {
        fs::metadata(self.meta_path(name)).await.is_ok()
            && fs::metadata(self.body_path(name)).await.is_ok()
    }

    async fn remove_entry(&self, name: &str) -> CacheResult<()> {
        for path in [self.meta_path(name), self.body_path(name)] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Buffering writer: commits body + meta only on `finish`.
struct ResponseEntryWriter {
    root: PathBuf,
    body_path: PathBuf,
    meta_path: PathBuf,
    url: String,
    buf: BytesMut,
}

#[async_trait]
impl EntryWriter for ResponseEntryWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> CacheResult<()> {
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> CacheResult<u64> {
        let len = self.buf.len() as u64;
        let meta = EntryMeta {
            url: self.url,
            content_length: len,
        };
        let meta_json = serde_json::to_vec_pretty(&meta)?;

        // Body first via write-temp -> rename, meta last as the commit marker.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)
            .map_err(crate::CacheError::from)?;
        tmp.write_all(&self.buf).map_err(crate::CacheError::from)?;
        tmp.persist(&self.body_path)
            .map_err(|e| crate::CacheError::Backend(e.to_string()))?;

        fs::write(&self.meta_path, meta_json).await?;
        Ok(len)
    }
}

#[async_trait]
impl CacheBackend for ResponseStoreBackend {
    async fn exists(&self, obj: &ObjectRef) -> bool {
        self.is_committed(&self.entry_name(obj)).await
    }

    async fn read(&self, obj: &ObjectRef) -> CacheResult<Option<Bytes>> {
        let name = self.entry_name(obj);
        if !self.is_committed(&name).await {
            return Ok(None);
        }
        match fs::read(self.body_path(&name)).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn open_writer(&self, obj: &ObjectRef) -> CacheResult<Box<dyn EntryWriter>> {
        fs::create_dir_all(&self.root).await?;
        let name = self.entry_name(obj);
        Ok(Box::new(ResponseEntryWriter {
            root: self.root.clone(),
            body_path: self.body_path(&name),
            meta_path: self.meta_path(&name),
            url: gateway_object_url(&self.gateway_base, obj).to_string(),
            buf: BytesMut::new(),
        }))
    }

    async fn entry_url(&self, obj: &ObjectRef) -> Option<Url> {
        let name = self.entry_name(obj);
        if !self.is_committed(&name).await {
            return None;
        }
        Url::from_file_path(self.body_path(&name)).ok()
    }

    async fn entry_size(&self, obj: &ObjectRef) -> Option<u64> {
        let name = self.entry_name(obj);
        if !self.is_committed(&name).await {
            return None;
        }
        fs::metadata(self.body_path(&name)).await.ok().map(|m| m.len())
    }

    async fn remove(&self, obj: &ObjectRef) -> CacheResult<()> {
        let name = self.entry_name(obj);
        self.remove_entry(&name).await
    }

    async fn enumerate(&self) -> CacheResult<Vec<EntryInfo>> {
        let mut out = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(name) = file_name.strip_suffix(".meta.json") else {
                continue;
            };
            let Ok(body_meta) = fs::metadata(self.body_path(name)).await else {
                continue; // uncommitted or torn entry
            };
            out.push(EntryInfo {
                name: name.to_string(),
                size_bytes: body_meta.len(),
            });
        }
        Ok(out)
    }

    async fn remove_named(&self, name: &str) -> CacheResult<()> {
        self.remove_entry(name).await
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    fn backend(dir: &TempDir) -> ResponseStoreBackend {
        ResponseStoreBackend::new(
            dir.path(),
            Url::parse("http://gateway.local").unwrap(),
        )
    }

    fn obj(key: &str) -> ObjectRef {
        ObjectRef::new("media", key).unwrap()
    }

    #[rstest]
    #[tokio::test]
    async fn write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let target = obj("ds/a.bin");

        let mut writer = backend.open_writer(&target).await.unwrap();
        writer.write_chunk(b"buffered ").await.unwrap();
        writer.write_chunk(b"write").await.unwrap();
        assert_eq!(writer.finish().await.unwrap(), 14);

        assert!(backend.exists(&target).await);
        assert_eq!(
            backend.read(&target).await.unwrap().unwrap().as_ref(),
            b"buffered write"
        );
        assert_eq!(backend.entry_size(&target).await, Some(14));
    }

    #[rstest]
    #[tokio::test]
    async fn distinct_buckets_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);

        let a = ObjectRef::new("bucket-a", "shared.bin").unwrap();
        let b = ObjectRef::new("bucket-b", "shared.bin").unwrap();

        let mut writer = backend.open_writer(&a).await.unwrap();
        writer.write_chunk(b"a").await.unwrap();
        writer.finish().await.unwrap();

        // URL-keyed entries include the bucket, unlike the fs tree.
        assert!(backend.exists(&a).await);
        assert!(!backend.exists(&b).await);
    }

    #[rstest]
    #[tokio::test]
    async fn uncommitted_entries_are_invisible() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let target = obj("ds/a.bin");

        let mut writer = backend.open_writer(&target).await.unwrap();
        writer.write_chunk(b"pending").await.unwrap();
        // Dropped without finish: nothing was committed.
        drop(writer);

        assert!(!backend.exists(&target).await);
        assert!(backend.read(&target).await.unwrap().is_none());
        assert!(backend.enumerate().await.unwrap().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn enumerate_and_remove_named() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);

        for key in ["one.bin", "two.bin"] {
            let mut writer = backend.open_writer(&obj(key)).await.unwrap();
            writer.write_chunk(b"xyz").await.unwrap();
            writer.finish().await.unwrap();
        }

        let entries = backend.enumerate().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.size_bytes == 3));

        backend.remove_named(&entries[0].name).await.unwrap();
        assert_eq!(backend.enumerate().await.unwrap().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn meta_sidecar_records_the_proxied_url() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let target = obj("ds/a.bin");

        let mut writer = backend.open_writer(&target).await.unwrap();
        writer.write_chunk(b"x").await.unwrap();
        writer.finish().await.unwrap();

        let name = backend.entry_name(&target);
        let meta: EntryMeta =
            serde_json::from_slice(&std::fs::read(backend.meta_path(&name)).unwrap()).unwrap();
        assert!(meta.url.contains("/object?b=media"));
        assert_eq!(meta.content_length, 1);
    }
}
