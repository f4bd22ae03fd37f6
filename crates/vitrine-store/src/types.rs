use crate::{ByteStream, StoreError, StoreResult};

/// Immutable address of a remote object.
///
/// `key` may contain `/`-separated path segments (e.g. `ds/video/seg0.ts`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRef`] if either part is empty.
    pub fn new<B: Into<String>, K: Into<String>>(bucket: B, key: K) -> StoreResult<Self> {
        let bucket = bucket.into();
        let key = key.into();
        if bucket.is_empty() {
            return Err(StoreError::InvalidRef("empty bucket".to_string()));
        }
        if key.is_empty() {
            return Err(StoreError::InvalidRef("empty key".to_string()));
        }
        Ok(Self { bucket, key })
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// A byte range, rendered as an HTTP `Range` header value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: Option<u64>,
}

impl RangeSpec {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    pub fn to_header_value(&self) -> String {
        if let Some(end) = self.end {
            format!("bytes={}-{}", self.start, end)
        } else {
            format!("bytes={}-", self.start)
        }
    }

    /// Parses a `Range` request header of the shape `bytes=<start>-[<end>]`.
    ///
    /// Returns `None` for anything else (multi-range, suffix-range, garbage);
    /// callers treat an unparseable header as absent.
    pub fn parse_header(value: &str) -> Option<Self> {
        let spec = value.trim().strip_prefix("bytes=")?;
        let (start, end) = spec.split_once('-')?;
        let start: u64 = start.trim().parse().ok()?;
        let end = end.trim();
        let end = if end.is_empty() {
            None
        } else {
            Some(end.parse().ok()?)
        };
        Some(Self { start, end })
    }
}

/// Object metadata as mirrored from the store response headers.
#[derive(Debug, Clone, Default)]
pub struct ObjectMeta {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    /// `Content-Range` of a partial response (e.g. `bytes 0-99/1000`).
    pub content_range: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Whether the store satisfied the fetch partially (206 upstream).
    pub partial: bool,
}

/// A fetched object: metadata plus a live body stream.
pub struct ObjectDownload {
    pub meta: ObjectMeta,
    pub body: ByteStream,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::full_range(0, Some(99), "bytes=0-99")]
    #[case::open_ended(50, None, "bytes=50-")]
    #[case::single_byte(10, Some(10), "bytes=10-10")]
    fn range_spec_to_header_value(
        #[case] start: u64,
        #[case] end: Option<u64>,
        #[case] expected: &str,
    ) {
        assert_eq!(RangeSpec::new(start, end).to_header_value(), expected);
    }

    #[rstest]
    #[case::bounded("bytes=0-99", Some(RangeSpec::new(0, Some(99))))]
    #[case::open("bytes=100-", Some(RangeSpec::new(100, None)))]
    #[case::padded(" bytes=5-9 ", Some(RangeSpec::new(5, Some(9))))]
    #[case::suffix("bytes=-100", None)]
    #[case::multi("bytes=0-1,5-9", None)]
    #[case::garbage("chunks=0-1", None)]
    #[case::empty("", None)]
    fn range_spec_parse_header(#[case] value: &str, #[case] expected: Option<RangeSpec>) {
        assert_eq!(RangeSpec::parse_header(value), expected);
    }

    #[rstest]
    fn object_ref_rejects_empty_parts() {
        assert!(ObjectRef::new("", "k").is_err());
        assert!(ObjectRef::new("b", "").is_err());
        let obj = ObjectRef::new("media", "ds/video/index.m3u8").unwrap();
        assert_eq!(obj.to_string(), "media/ds/video/index.m3u8");
    }
}
