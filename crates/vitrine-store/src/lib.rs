#![forbid(unsafe_code)]

//! # vitrine-store
//!
//! Client for the backing object store. Objects are addressed by
//! ([`ObjectRef`]) `bucket` + `key`, where `key` may contain `/`-separated
//! path segments.
//!
//! The explicit public contract is the [`ObjectStore`] trait:
//! `get` (optionally ranged, streaming body), `head` (metadata only) and
//! `delete`. [`HttpObjectStore`] talks to an S3-compatible endpoint with
//! path-style addressing; [`MemoryStore`] is an in-memory peer used by
//! fixtures and tests.

mod error;
mod http;
mod memory;
mod types;

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

pub use crate::{
    error::{StoreError, StoreResult},
    http::HttpObjectStore,
    memory::MemoryStore,
    types::{ObjectDownload, ObjectMeta, ObjectRef, RangeSpec},
};

/// Streaming object body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StoreError>> + Send>>;

/// Backing object-store operations consumed by the gateway and the cache.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, optionally restricted to a byte range.
    ///
    /// A ranged fetch that the store satisfies partially yields
    /// `meta.partial == true` together with `meta.content_range`.
    async fn get(&self, obj: &ObjectRef, range: Option<RangeSpec>) -> StoreResult<ObjectDownload>;

    /// Fetch object metadata without the body.
    async fn head(&self, obj: &ObjectRef) -> StoreResult<ObjectMeta>;

    /// Delete an object.
    async fn delete(&self, obj: &ObjectRef) -> StoreResult<()>;
}
