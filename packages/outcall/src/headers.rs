//! Header-name canonicalization and request header defaults.

use std::collections::BTreeMap;

use crate::options::RequestBody;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const ACCEPT: &str = "Accept";

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Header table keyed by canonical (Title-Case) header names.
pub type Headers = BTreeMap<String, String>;

/// Canonicalize a header name to Title-Case per dash-separated segment.
///
/// `content-type` and `CONTENT-TYPE` both become `Content-Type`.
pub fn canonical_name(name: &str) -> String {
    name.trim()
        .split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}

/// Rebuild a header table with canonical names. When two names collapse to the
/// same canonical form, the one that sorts later wins.
pub fn canonicalize(headers: Headers) -> Headers {
    headers
        .into_iter()
        .map(|(name, value)| (canonical_name(&name), value))
        .collect()
}

/// Content-Type inferred from a request body.
pub fn infer_content_type(body: &RequestBody) -> &'static str {
    match body {
        RequestBody::Text(text) if text.starts_with('<') => HTML_CONTENT_TYPE,
        RequestBody::Text(_) => TEXT_CONTENT_TYPE,
        RequestBody::Json(_) => JSON_CONTENT_TYPE,
    }
}

/// Media-type portion of a Content-Type value (text before the first `;`).
pub fn media_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}

/// Fill in `Content-Type` from the body and `Accept` from the Content-Type.
///
/// Expects a canonicalized table. Explicit values are never overwritten.
pub fn apply_defaults(headers: &mut Headers, body: Option<&RequestBody>) {
    if !headers.contains_key(CONTENT_TYPE) {
        if let Some(body) = body {
            headers.insert(
                CONTENT_TYPE.to_string(),
                infer_content_type(body).to_string(),
            );
        }
    }

    if !headers.contains_key(ACCEPT) {
        if let Some(content_type) = headers.get(CONTENT_TYPE) {
            let accept = media_type(content_type).to_string();
            headers.insert(ACCEPT.to_string(), accept);
        }
    }
}
