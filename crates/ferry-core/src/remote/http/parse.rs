//! Parse HTTP response header lines and store replies.

use serde::Deserialize;

/// Headers we care about from an object HEAD.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct HeadResult {
    /// Total size in bytes, if `Content-Length` is present.
    pub content_length: Option<u64>,
    /// `ETag` value if present, quotes stripped.
    pub etag: Option<String>,
}

/// Parse collected header lines into HeadResult. Later values win, so after
/// redirects the final response's headers are used.
pub(crate) fn parse_headers(lines: &[String]) -> HeadResult {
    let mut out = HeadResult::default();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                if let Ok(n) = value.parse::<u64>() {
                    out.content_length = Some(n);
                }
            }
            if name.eq_ignore_ascii_case("etag") {
                out.etag = Some(value.trim_matches('"').to_string());
            }
        }
    }

    out
}

/// Body of the store's reply to the chunk that completes an object.
#[derive(Debug, Deserialize)]
struct StoredObject {
    #[serde(rename = "objectId")]
    object_id: String,
}

/// Extract the object id from a chunk reply body, if it carries one.
pub(crate) fn parse_object_id(body: &[u8]) -> Option<String> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return None;
    }
    serde_json::from_slice::<StoredObject>(body)
        .ok()
        .map(|s| s.object_id)
}
