//! HTTP implementation of [`ObjectStore`] for S3-compatible endpoints.

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, Response, StatusCode, header};
use url::Url;

use crate::{
    ObjectStore, StoreError, StoreResult,
    types::{ObjectDownload, ObjectMeta, ObjectRef, RangeSpec},
};

/// Object-store client using path-style addressing: `<endpoint>/<bucket>/<key>`.
#[derive(Clone, Debug)]
pub struct HttpObjectStore {
    inner: Client,
    endpoint: Url,
}

impl HttpObjectStore {
    /// # Panics
    ///
    /// Panics if the `reqwest::Client` builder fails to build.
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        let inner = Client::builder()
            .build()
            .expect("failed to build reqwest client");
        Self { inner, endpoint }
    }

    fn object_url(&self, obj: &ObjectRef) -> StoreResult<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| StoreError::InvalidRef("endpoint cannot be a base URL".into()))?;
            segments.pop_if_empty();
            segments.push(&obj.bucket);
            // Keep the key's `/` structure in the request path.
            for part in obj.key.split('/') {
                segments.push(part);
            }
        }
        Ok(url)
    }

    fn meta_from_response(resp: &Response) -> ObjectMeta {
        let header_str = |name: header::HeaderName| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        ObjectMeta {
            content_type: header_str(header::CONTENT_TYPE),
            content_length: header_str(header::CONTENT_LENGTH).and_then(|v| v.parse().ok()),
            content_range: header_str(header::CONTENT_RANGE),
            etag: header_str(header::ETAG),
            last_modified: header_str(header::LAST_MODIFIED),
            partial: resp.status() == StatusCode::PARTIAL_CONTENT,
        }
    }

    fn check_status(obj: &ObjectRef, url: &Url, resp: &Response) -> StoreResult<()> {
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                bucket: obj.bucket.clone(),
                key: obj.key.clone(),
            });
        }
        if !(status.is_success() || status == StatusCode::PARTIAL_CONTENT) {
            return Err(StoreError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, obj: &ObjectRef, range: Option<RangeSpec>) -> StoreResult<ObjectDownload> {
        let url = self.object_url(obj)?;
        let mut req = self.inner.get(url.clone());
        if let Some(range) = &range {
            req = req.header(header::RANGE, range.to_header_value());
        }

        // No timeout: transfer time is bounded by the consumer, not by us.
        let resp = req.send().await.map_err(StoreError::from)?;
        Self::check_status(obj, &url, &resp)?;

        let meta = Self::meta_from_response(&resp);
        tracing::debug!(
            obj = %obj,
            partial = meta.partial,
            content_length = ?meta.content_length,
            "store get"
        );

        let body = resp.bytes_stream().map_err(StoreError::from);
        Ok(ObjectDownload {
            meta,
            body: Box::pin(body),
        })
    }

    async fn head(&self, obj: &ObjectRef) -> StoreResult<ObjectMeta> {
        let url = self.object_url(obj)?;
        let resp = self
            .inner
            .head(url.clone())
            .send()
            .await
            .map_err(StoreError::from)?;
        Self::check_status(obj, &url, &resp)?;
        Ok(Self::meta_from_response(&resp))
    }

    async fn delete(&self, obj: &ObjectRef) -> StoreResult<()> {
        let url = self.object_url(obj)?;
        let resp = self
            .inner
            .delete(url.clone())
            .send()
            .await
            .map_err(StoreError::from)?;
        Self::check_status(obj, &url, &resp)?;
        tracing::debug!(obj = %obj, "store delete");
        Ok(())
    }
}
