#![forbid(unsafe_code)]

//! # vitrine-cache
//!
//! Persistent local cache for gateway-proxied objects, addressed by
//! `bucket` + `key`.
//!
//! ## Backends
//!
//! Exactly one of two storage backends is selected at construction time by
//! feature probing (never re-evaluated afterwards):
//!
//! - [`FsTreeBackend`] — hierarchical file tree: the key's `/`-segments
//!   become nested directories. Supports streaming writes, so downloads
//!   never hold a whole object in memory.
//! - [`ResponseStoreBackend`] — HTTP-response-shaped store keyed by the
//!   proxied object URL. Its write primitive is all-at-once, so downloads
//!   through it buffer the full object before committing.
//!
//! ## Accounting
//!
//! [`CacheSizeIndex`] is a small persisted key → size map kept in lockstep
//! with every write/delete (best-effort; the backend is the source of truth
//! and the index may drift on partial failure). It gives O(1) total-size
//! queries; when it is empty or lost, [`PersistentObjectCache::total_bytes`]
//! falls back to a full backend enumeration.
//!
//! ## Failure semantics
//!
//! Read-side operations never raise: any backend error degrades to "not
//! cached" so callers always have a network fallback. Write-side operations
//! may return an error; callers are expected to proceed without caching.

mod backend;
mod cache;
mod error;
mod fs_tree;
mod response_store;
mod size_index;

pub use crate::{
    backend::{BackendKind, CacheBackend, EntryInfo, EntryWriter, probe_backend},
    cache::{CacheOptions, PersistentObjectCache, ProgressFn, gateway_object_url},
    error::{CacheError, CacheResult},
    fs_tree::FsTreeBackend,
    response_store::ResponseStoreBackend,
    size_index::CacheSizeIndex,
};
