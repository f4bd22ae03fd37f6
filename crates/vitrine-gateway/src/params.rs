//! Query-parameter handling for the `/object` and `/hls/playlist` endpoints.

use std::collections::HashMap;

/// Resolved `bucket`/`key` query parameters.
///
/// Each accepts two alias spellings: `b`/`bucket` and `k`/`key`, with the
/// short form taking precedence when both are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectParams {
    pub bucket: String,
    pub key: String,
}

impl ObjectParams {
    /// Resolves aliases from the raw query map.
    ///
    /// # Errors
    ///
    /// Returns the missing parameter's canonical name. Callers must map this
    /// to a response *before* touching the store.
    pub fn from_query(query: &HashMap<String, String>) -> Result<Self, &'static str> {
        let pick = |short: &str, long: &str| {
            query
                .get(short)
                .or_else(|| query.get(long))
                .filter(|v| !v.is_empty())
                .cloned()
        };

        let bucket = pick("b", "bucket").ok_or("bucket")?;
        let key = pick("k", "key").ok_or("key")?;
        Ok(Self { bucket, key })
    }
}
