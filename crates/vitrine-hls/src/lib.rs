#![forbid(unsafe_code)]

//! # vitrine-hls
//!
//! Line-oriented HLS manifest rewriter.
//!
//! [`rewrite_playlist`] turns every segment/key/map reference in a media
//! playlist into a gateway `/object` URL, so a player never needs direct
//! store access. This module only rewrites text; it performs no I/O.
//!
//! This is deliberately a line classifier plus a single-attribute rewriter,
//! not a manifest AST: every character outside the rewritten reference is
//! preserved byte-for-byte, including directives we do not understand.

mod rewrite;

pub use rewrite::{proxied_object_url, rewrite_playlist};

/// Content type for rewritten HLS manifests.
pub const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
