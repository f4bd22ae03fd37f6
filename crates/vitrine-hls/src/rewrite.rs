//! Playlist line rewriting.

use once_cell::sync::Lazy;
use regex::Regex;

/// Tag-anchored `URI="..."` (or single-quoted) attribute inside the two
/// directive types that carry rewritable references.
static URI_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(#EXT-X-(?:MAP|KEY):[^\r\n]*?URI=)(?:"([^"]*)"|'([^']*)')"#)
        .expect("invalid URI attribute regex")
});

static SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").expect("invalid scheme regex"));

/// Builds the gateway URL for one object: `<base>/object?b=<bucket>&k=<path>`.
///
/// The path is percent-encoded as a single segment (`/` included), matching
/// what the gateway decodes from its `k` query parameter.
pub fn proxied_object_url(public_base: &str, bucket: &str, path: &str) -> String {
    format!(
        "{}/object?b={}&k={}",
        public_base.trim_end_matches('/'),
        urlencoding::encode(bucket),
        urlencoding::encode(path)
    )
}

fn is_absolute(reference: &str) -> bool {
    reference.starts_with("//") || SCHEME.is_match(reference)
}

/// Joins a reference to the manifest's directory prefix.
///
/// Plain string concatenation: `.`/`..` segments are *not* collapsed. If an
/// upstream manifest ever emits them the rewritten key is passed through
/// verbatim (and will likely miss), which is intentional until real
/// manifests demonstrate the need.
fn join_base(base_dir: &str, reference: &str) -> String {
    format!("{base_dir}{reference}")
}

/// Rewrites a `#EXT-X-MAP:`/`#EXT-X-KEY:` line's URI attribute in place.
///
/// Everything outside the quoted attribute value is preserved byte-for-byte.
/// Lines whose URI is absent, empty, or already absolute come back unchanged.
fn rewrite_directive_line(line: &str, base_dir: &str, bucket: &str, public_base: &str) -> String {
    let Some(caps) = URI_ATTR.captures(line) else {
        return line.to_string();
    };

    let value = caps
        .get(2)
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
        .unwrap_or_default();
    if value.is_empty() || is_absolute(value) {
        return line.to_string();
    }

    let prefix_end = caps.get(1).map(|m| m.end()).unwrap_or(0);
    // Quoted literal = value plus its two quote characters.
    let literal_end = prefix_end + value.len() + 2;

    let proxied = proxied_object_url(public_base, bucket, &join_base(base_dir, value));
    format!(
        "{}\"{}\"{}",
        &line[..prefix_end],
        proxied,
        &line[literal_end..]
    )
}

/// Rewrites a manifest so every segment/key/map reference resolves through
/// the gateway.
///
/// - `manifest_key` is the key of the manifest object itself; its path
///   prefix up to and including the last `/` becomes the base directory for
///   relative references.
/// - Input may use any newline convention; output lines are joined with
///   `\n`. A trailing newline is preserved.
/// - Only `#EXT-X-MAP:` and `#EXT-X-KEY:` directives are URI-rewritten;
///   all other `#` lines (including stream-variant declarations) and
///   absolute URLs pass through unchanged.
pub fn rewrite_playlist(text: &str, bucket: &str, manifest_key: &str, public_base: &str) -> String {
    let base_dir = match manifest_key.rfind('/') {
        Some(idx) => &manifest_key[..=idx],
        None => "",
    };

    let mut out: Vec<String> = Vec::new();
    for raw in text.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        let rewritten = if line.trim().is_empty() {
            line.to_string()
        } else if line.starts_with("#EXT-X-MAP:") || line.starts_with("#EXT-X-KEY:") {
            rewrite_directive_line(line, base_dir, bucket, public_base)
        } else if line.starts_with('#') || is_absolute(line) {
            line.to_string()
        } else {
            proxied_object_url(public_base, bucket, &join_base(base_dir, line))
        };
        out.push(rewritten);
    }

    out.join("\n")
}
