//! The persistent object cache.

use std::{path::PathBuf, sync::Arc};

use bytes::Bytes;
use url::Url;
use vitrine_store::ObjectRef;

use crate::{
    CacheError, CacheResult, CacheSizeIndex, FsTreeBackend, ResponseStoreBackend,
    backend::{BackendKind, CacheBackend, probe_backend},
};

/// Progress callback, invoked with an integer percentage `0..=100`.
pub type ProgressFn = Box<dyn Fn(u8) + Send + Sync>;

/// Builds the gateway fetch URL for one object:
/// `<base>/object?b=<bucket>&k=<key>`.
pub fn gateway_object_url(base: &Url, obj: &ObjectRef) -> Url {
    let mut url = base.clone();
    url.set_path(&format!("{}/object", base.path().trim_end_matches('/')));
    url.query_pairs_mut()
        .clear()
        .append_pair("b", &obj.bucket)
        .append_pair("k", &obj.key);
    url
}

/// Cache construction options.
#[derive(Clone, Debug)]
pub struct CacheOptions {
    /// Directory holding all cache state (backends and probe marker).
    pub root: PathBuf,
    /// Base URL of the gateway this cache fetches through.
    pub gateway_base: Url,
    /// Force a specific backend instead of feature probing. Tests use this;
    /// production callers leave it `None`.
    pub backend: Option<BackendKind>,
}

impl CacheOptions {
    pub fn new<P: Into<PathBuf>>(root: P, gateway_base: Url) -> Self {
        Self {
            root: root.into(),
            gateway_base,
            backend: None,
        }
    }

    pub fn with_backend(mut self, kind: BackendKind) -> Self {
        self.backend = Some(kind);
        self
    }
}

/// Idempotent local cache for gateway-proxied objects.
///
/// All operations are independent; there is no locking. Two concurrent
/// downloads of the same key may both write — the last writer's bytes and
/// size win. `exists()` followed by a download is not check-then-act safe;
/// both are accepted for single-user local caching.
#[derive(Clone)]
pub struct PersistentObjectCache {
    backend: Arc<dyn CacheBackend>,
    kind: BackendKind,
    index: Arc<CacheSizeIndex>,
    http: reqwest::Client,
    gateway_base: Url,
}

impl PersistentObjectCache {
    /// Creates a cache, selecting the backend once (see [`probe_backend`]).
    ///
    /// The size index is an injected dependency so tests can substitute it.
    pub fn new(options: CacheOptions, index: Arc<CacheSizeIndex>) -> CacheResult<Self> {
        let (kind, backend): (BackendKind, Arc<dyn CacheBackend>) = match options.backend {
            Some(BackendKind::FsTree) => {
                let root = options.root.join("objects");
                std::fs::create_dir_all(&root)?;
                (BackendKind::FsTree, Arc::new(FsTreeBackend::new(root)))
            }
            Some(BackendKind::ResponseStore) => {
                let root = options.root.join("responses");
                std::fs::create_dir_all(&root)?;
                (
                    BackendKind::ResponseStore,
                    Arc::new(ResponseStoreBackend::new(
                        root,
                        options.gateway_base.clone(),
                    )),
                )
            }
            None => probe_backend(&options.root, &options.gateway_base)?,
        };

        Ok(Self {
            backend,
            kind,
            index,
            http: reqwest::Client::new(),
            gateway_base: options.gateway_base,
        })
    }

    /// Which backend the probe selected.
    pub fn backend_kind(&self) -> BackendKind {
        self.kind
    }

    /// Existence probe only; never errors, false on any backend failure.
    pub async fn exists(&self, bucket: &str, key: &str) -> bool {
        let Ok(obj) = ObjectRef::new(bucket, key) else {
            return false;
        };
        self.backend.exists(&obj).await
    }

    /// Local-reference URL usable directly as a media source, or `None` if
    /// the entry is absent (or any backend error).
    pub async fn cached_url(&self, bucket: &str, key: &str) -> Option<Url> {
        let obj = ObjectRef::new(bucket, key).ok()?;
        self.backend.entry_url(&obj).await
    }

    /// Full object bytes if present, else `None`. Read failures degrade to
    /// `None` so callers always have a network fallback.
    pub async fn read_bytes(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let obj = ObjectRef::new(bucket, key).ok()?;
        match self.backend.read(&obj).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::trace!(bucket, key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Streams a gateway fetch into the backend chunk-by-chunk.
    ///
    /// Total length is `expected_size_hint` if given, else the response's
    /// `Content-Length`. `on_progress` receives integer percentages
    /// `0..=100`; it is never invoked when the total is unknown. On
    /// completion the final size is recorded in the index and a fresh
    /// local-reference URL is returned.
    ///
    /// With the fs-tree backend the object is never fully held in memory;
    /// the response-store backend buffers by construction.
    pub async fn download_with_progress(
        &self,
        bucket: &str,
        key: &str,
        expected_size_hint: Option<u64>,
        on_progress: Option<ProgressFn>,
    ) -> CacheResult<Url> {
        let obj = object_ref(bucket, key)?;
        let mut resp = self.fetch(&obj).await?;
        let total = expected_size_hint.or_else(|| resp.content_length());

        tracing::debug!(obj = %obj, total = ?total, "cache miss, downloading");

        let mut writer = self.backend.open_writer(&obj).await?;
        let mut written: u64 = 0;
        let mut last_pct: Option<u8> = None;

        while let Some(chunk) = resp.chunk().await? {
            writer.write_chunk(&chunk).await?;
            written += chunk.len() as u64;

            if let (Some(total), Some(cb)) = (total.filter(|t| *t > 0), on_progress.as_ref()) {
                let pct = ((written.saturating_mul(100) / total).min(100)) as u8;
                if last_pct != Some(pct) {
                    last_pct = Some(pct);
                    cb(pct);
                }
            }
        }

        let size = writer.finish().await?;
        self.record_size(&obj, size);

        self.backend
            .entry_url(&obj)
            .await
            .ok_or_else(|| CacheError::Backend("entry vanished after download".to_string()))
    }

    /// Always-buffered fetch + cache, for callers that need raw bytes
    /// immediately (e.g. feeding a tabular preview engine).
    pub async fn download_bytes(&self, bucket: &str, key: &str) -> CacheResult<Bytes> {
        let obj = object_ref(bucket, key)?;
        let resp = self.fetch(&obj).await?;
        let bytes = resp.bytes().await?;

        let mut writer = self.backend.open_writer(&obj).await?;
        writer.write_chunk(&bytes).await?;
        let size = writer.finish().await?;
        self.record_size(&obj, size);

        Ok(bytes)
    }

    /// Best-effort removal: backend errors (including not-found) are
    /// swallowed, then the index record is dropped.
    pub async fn delete(&self, bucket: &str, key: &str) {
        if let Ok(obj) = ObjectRef::new(bucket, key)
            && let Err(e) = self.backend.remove(&obj).await
        {
            tracing::warn!(bucket, key, error = %e, "cache delete failed");
        }
        if let Err(e) = self.index.remove(bucket, key) {
            tracing::warn!(bucket, key, error = %e, "size index remove failed");
        }
    }

    /// Removes every entry and clears the index.
    ///
    /// Entry names are collected fully before any deletion, so concurrent
    /// mutation cannot invalidate the enumeration mid-walk.
    pub async fn clear_all(&self) -> CacheResult<()> {
        let entries = self.backend.enumerate().await?;
        for entry in &entries {
            self.backend.remove_named(&entry.name).await?;
        }
        self.index.clear()?;
        tracing::debug!(removed = entries.len(), "cache cleared");
        Ok(())
    }

    /// Total cached bytes: O(1) from the index, or — when the index is empty
    /// (first run, or lost) — a full backend enumeration.
    pub async fn total_bytes(&self) -> u64 {
        if !self.index.is_empty() {
            return self.index.total_bytes();
        }
        match self.backend.enumerate().await {
            Ok(entries) => entries.iter().map(|e| e.size_bytes).sum(),
            Err(e) => {
                tracing::warn!(error = %e, "cache enumeration failed, reporting 0");
                0
            }
        }
    }

    async fn fetch(&self, obj: &ObjectRef) -> CacheResult<reqwest::Response> {
        let url = gateway_object_url(&self.gateway_base, obj);
        let resp = self.http.get(url.clone()).send().await?;
        if !resp.status().is_success() {
            return Err(CacheError::FetchStatus {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp)
    }

    /// Index updates are best-effort: a failure leaves the index stale
    /// rather than failing the download that already committed.
    fn record_size(&self, obj: &ObjectRef, size: u64) {
        if let Err(e) = self.index.set(&obj.bucket, &obj.key, size) {
            tracing::warn!(obj = %obj, error = %e, "size index update failed");
        }
    }
}

fn object_ref(bucket: &str, key: &str) -> CacheResult<ObjectRef> {
    ObjectRef::new(bucket, key).map_err(|e| CacheError::InvalidKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_object_url_encodes_the_key_path() {
        let base = Url::parse("http://proxy.local:8080").unwrap();
        let obj = ObjectRef::new("media", "ds/video/seg0.ts").unwrap();
        assert_eq!(
            gateway_object_url(&base, &obj).as_str(),
            "http://proxy.local:8080/object?b=media&k=ds%2Fvideo%2Fseg0.ts"
        );
    }

    #[test]
    fn gateway_object_url_keeps_base_path_prefix() {
        let base = Url::parse("http://proxy.local/vitrine/").unwrap();
        let obj = ObjectRef::new("b", "k.bin").unwrap();
        assert_eq!(
            gateway_object_url(&base, &obj).as_str(),
            "http://proxy.local/vitrine/object?b=b&k=k.bin"
        );
    }
}
