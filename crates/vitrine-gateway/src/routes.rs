//! `/object` and `/hls/playlist` handlers.

use std::collections::HashMap;

use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use serde_json::json;
use vitrine_hls::{HLS_CONTENT_TYPE, rewrite_playlist};
use vitrine_store::{ObjectMeta, ObjectRef, RangeSpec};

use crate::{GatewayState, ObjectParams};

fn error_json(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

/// Resolves params into an [`ObjectRef`], or the error response for the
/// given status. No store call happens before this returns `Ok`.
fn resolve_object(
    query: &HashMap<String, String>,
    missing_status: StatusCode,
) -> Result<ObjectRef, Response> {
    let params = ObjectParams::from_query(query)
        .map_err(|name| error_json(missing_status, format!("missing required parameter: {name}")))?;
    ObjectRef::new(params.bucket, params.key).map_err(|e| error_json(missing_status, e))
}

fn append_meta_headers(headers: &mut HeaderMap, meta: &ObjectMeta) {
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let mut mirror = |name: header::HeaderName, value: &Option<String>| {
        if let Some(value) = value
            && let Ok(value) = HeaderValue::from_str(value)
        {
            headers.insert(name, value);
        }
    };
    mirror(header::CONTENT_TYPE, &meta.content_type);
    mirror(
        header::CONTENT_LENGTH,
        &meta.content_length.map(|n| n.to_string()),
    );
    mirror(header::ETAG, &meta.etag);
    mirror(header::LAST_MODIFIED, &meta.last_modified);
    if meta.partial {
        mirror(header::CONTENT_RANGE, &meta.content_range);
    }
}

/// `GET`/`HEAD /object`.
///
/// GET streams the store body straight through; a slow client back-pressures
/// the upstream read. HEAD returns metadata headers only, and collapses any
/// store failure (including not-found) to a bare 404 with no error detail.
pub(crate) async fn get_or_head_object(
    State(state): State<GatewayState>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    request_headers: HeaderMap,
) -> Response {
    let obj = match resolve_object(&query, StatusCode::BAD_REQUEST) {
        Ok(obj) => obj,
        Err(resp) => return resp,
    };

    if method == Method::HEAD {
        return match state.store.head(&obj).await {
            Ok(meta) => {
                let mut headers = HeaderMap::new();
                append_meta_headers(&mut headers, &meta);
                (StatusCode::OK, headers).into_response()
            }
            Err(_) => StatusCode::NOT_FOUND.into_response(),
        };
    }

    let range = request_headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(RangeSpec::parse_header);

    match state.store.get(&obj, range).await {
        Ok(download) => {
            let status = if download.meta.partial {
                StatusCode::PARTIAL_CONTENT
            } else {
                StatusCode::OK
            };
            let mut headers = HeaderMap::new();
            append_meta_headers(&mut headers, &download.meta);
            tracing::debug!(obj = %obj, status = %status, "proxying object");
            (status, headers, Body::from_stream(download.body)).into_response()
        }
        Err(e) => {
            tracing::warn!(obj = %obj, error = %e, "store get failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// `DELETE /object`.
pub(crate) async fn delete_object(
    State(state): State<GatewayState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let obj = match resolve_object(&query, StatusCode::BAD_REQUEST) {
        Ok(obj) => obj,
        Err(resp) => return resp,
    };

    match state.store.delete(&obj).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => {
            tracing::warn!(obj = %obj, error = %e, "store delete failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// `GET /hls/playlist`.
///
/// Fetches the manifest text directly from the store (bypassing `/object`)
/// and rewrites its references into proxied URLs. Any failure, including a
/// missing parameter, maps to 500; the body is never partially rewritten.
pub(crate) async fn get_playlist(
    State(state): State<GatewayState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let obj = match resolve_object(&query, StatusCode::INTERNAL_SERVER_ERROR) {
        Ok(obj) => obj,
        Err(resp) => return resp,
    };

    let text = match fetch_manifest_text(&state, &obj).await {
        Ok(text) => text,
        Err(resp) => return resp,
    };

    let rewritten = rewrite_playlist(&text, &obj.bucket, &obj.key, &state.public_base);
    tracing::debug!(obj = %obj, bytes = rewritten.len(), "rewrote playlist");

    (
        [
            (header::CONTENT_TYPE, HLS_CONTENT_TYPE),
            // Bounds staleness of segment lists without a refetch per play.
            (header::CACHE_CONTROL, "private, max-age=30"),
        ],
        rewritten,
    )
        .into_response()
}

async fn fetch_manifest_text(state: &GatewayState, obj: &ObjectRef) -> Result<String, Response> {
    let download = state
        .store
        .get(obj, None)
        .await
        .map_err(|e| error_json(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    let chunks: Vec<bytes::Bytes> = download
        .body
        .try_collect()
        .await
        .map_err(|e| error_json(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    String::from_utf8(chunks.concat())
        .map_err(|e| error_json(StatusCode::INTERNAL_SERVER_ERROR, e))
}
