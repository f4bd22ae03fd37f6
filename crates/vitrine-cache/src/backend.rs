//! Storage-backend capability interface and feature probing.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;
use vitrine_store::ObjectRef;

use crate::{CacheResult, FsTreeBackend, ResponseStoreBackend};

/// One cached entry as reported by [`CacheBackend::enumerate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Backend-internal entry name, valid for [`CacheBackend::remove_named`].
    pub name: String,
    pub size_bytes: u64,
}

/// Which backend a cache instance ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    FsTree,
    ResponseStore,
}

/// Capability interface over one cache storage facility.
///
/// All read-side methods degrade to "absent" (`false`/`None`) on I/O errors;
/// only writers and removals surface failures.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Existence probe; never errors.
    async fn exists(&self, obj: &ObjectRef) -> bool;

    /// Full entry bytes, or `None` if absent.
    async fn read(&self, obj: &ObjectRef) -> CacheResult<Option<Bytes>>;

    /// Opens a writer for the entry, creating or overwriting it.
    async fn open_writer(&self, obj: &ObjectRef) -> CacheResult<Box<dyn EntryWriter>>;

    /// Local-reference URL for a present entry, usable as a media source.
    async fn entry_url(&self, obj: &ObjectRef) -> Option<Url>;

    /// Committed size of a present entry.
    async fn entry_size(&self, obj: &ObjectRef) -> Option<u64>;

    /// Removes the entry; absent entries are not an error.
    async fn remove(&self, obj: &ObjectRef) -> CacheResult<()>;

    /// Lists every committed entry. Callers that delete afterwards must
    /// collect this list fully before removing anything.
    async fn enumerate(&self) -> CacheResult<Vec<EntryInfo>>;

    /// Removes an entry by its enumerated name.
    async fn remove_named(&self, name: &str) -> CacheResult<()>;
}

/// Destination for one download.
///
/// [`FsTreeBackend`] writers append each chunk to the open destination file;
/// [`ResponseStoreBackend`] writers buffer and commit on
/// [`finish`](EntryWriter::finish) (that store's write primitive is
/// all-at-once).
#[async_trait]
pub trait EntryWriter: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> CacheResult<()>;

    /// Commits the entry and returns the total bytes written.
    async fn finish(self: Box<Self>) -> CacheResult<u64>;
}

/// Selects the backend for this process by feature probing.
///
/// The hierarchical file tree is preferred; the probe writes and removes a
/// marker file under the tree root. If the tree is unavailable the
/// response-shaped store is used instead. The choice is made once here and
/// holds for the lifetime of the cache.
pub fn probe_backend(
    root: &Path,
    gateway_base: &Url,
) -> CacheResult<(BackendKind, Arc<dyn CacheBackend>)> {
    let tree_root = root.join("objects");
    if hierarchical_tree_available(&tree_root) {
        tracing::debug!(root = %tree_root.display(), "cache backend: fs tree");
        return Ok((
            BackendKind::FsTree,
            Arc::new(FsTreeBackend::new(tree_root)),
        ));
    }

    let store_root = root.join("responses");
    std::fs::create_dir_all(&store_root)?;
    tracing::debug!(root = %store_root.display(), "cache backend: response store");
    Ok((
        BackendKind::ResponseStore,
        Arc::new(ResponseStoreBackend::new(store_root, gateway_base.clone())),
    ))
}

fn hierarchical_tree_available(tree_root: &Path) -> bool {
    let probe = || -> std::io::Result<()> {
        std::fs::create_dir_all(tree_root)?;
        let marker = tree_root.join(".probe");
        std::fs::write(&marker, b"probe")?;
        std::fs::remove_file(&marker)
    };
    probe().is_ok()
}
