//! Response snapshots and body decoding.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::outcome::{classify, OutcomeKind};

lazy_static! {
    // application/json, application/vnd.api+json, text/json; charset=utf-8, ...
    static ref JSON_CONTENT_TYPE: Regex = Regex::new(r"(?i)[+/]json(;|$)").unwrap();
}

/// Decoded response body.
///
/// Persisted as `{"type": "json" | "text" | "bytes", "data": ...}` so that a
/// JSON string body and a text body stay distinct after a reload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ResponseBody {
    Json(JsonValue),
    Text(String),
    Bytes(Vec<u8>),
}

impl Default for ResponseBody {
    fn default() -> Self {
        ResponseBody::Text(String::new())
    }
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Whether a Content-Type value names a JSON-family media type.
pub fn is_json_content_type(content_type: &str) -> bool {
    JSON_CONTENT_TYPE.is_match(content_type.trim())
}

/// Decode a fully buffered body according to its Content-Type.
///
/// JSON-family bodies that fail to parse decode to an empty object; the
/// malformed bytes are dropped.
pub fn decode_body(content_type: Option<&str>, bytes: Vec<u8>) -> ResponseBody {
    if content_type.is_some_and(is_json_content_type) {
        return match serde_json::from_slice(&bytes) {
            Ok(value) => ResponseBody::Json(value),
            Err(error) => {
                tracing::warn!(%error, len = bytes.len(), "JSON body failed to parse, substituting {{}}");
                ResponseBody::Json(JsonValue::Object(Default::default()))
            }
        };
    }

    match String::from_utf8(bytes) {
        Ok(text) => ResponseBody::Text(text),
        Err(error) => ResponseBody::Bytes(error.into_bytes()),
    }
}

/// Fixed, serializable projection of a finished response.
///
/// The same shape is handed to callers and stored in the cache, so it holds
/// no reference to the connection it came from. Field names serialize in
/// camelCase (`statusCode`, `rawHeaders`, `httpVersionMajor`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    pub body: ResponseBody,

    /// Header table; repeated headers are joined with `", "`.
    pub headers: BTreeMap<String, String>,

    /// e.g. `"1.1"` or `"2.0"`.
    pub http_version: String,
    pub http_version_major: u8,
    pub http_version_minor: u8,

    pub method: String,

    /// Header (name, value) pairs in wire order.
    pub raw_headers: Vec<(String, String)>,

    pub status_code: u16,
    pub status_message: String,

    #[serde(default)]
    pub trailers: BTreeMap<String, String>,

    pub url: String,
}

impl ResponseSnapshot {
    /// Header lookup ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether the response counts as a success: 2xx or 304, the same rule
    /// [`classify`] applies.
    pub fn is_success(&self) -> bool {
        classify(self.status_code) == OutcomeKind::Ok
    }

    /// Check if the response status indicates a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code)
    }

    /// Check if the response status indicates a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code)
    }

    /// Deserialize a JSON body into a specific type.
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        match &self.body {
            ResponseBody::Json(value) => serde_json::from_value(value.clone()),
            ResponseBody::Text(text) => serde_json::from_str(text),
            ResponseBody::Bytes(bytes) => serde_json::from_slice(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_family_content_types() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("application/json; charset=utf-8"));
        assert!(is_json_content_type("application/vnd.api+json"));
        assert!(is_json_content_type("text/json"));
        assert!(is_json_content_type("Application/JSON"));
        assert!(!is_json_content_type("text/plain"));
        assert!(!is_json_content_type("application/jsonl"));
        assert!(!is_json_content_type("json"));
    }

    #[test]
    fn json_body_decodes() {
        let body = decode_body(Some("application/json"), br#"{"a":1}"#.to_vec());
        assert_eq!(body, ResponseBody::Json(json!({"a": 1})));
    }

    #[test]
    fn malformed_json_becomes_empty_object() {
        let body = decode_body(Some("application/json"), b"not json".to_vec());
        assert_eq!(body, ResponseBody::Json(json!({})));
    }

    #[test]
    fn non_json_content_type_stays_text() {
        let body = decode_body(Some("text/plain"), br#"{"a":1}"#.to_vec());
        assert_eq!(body, ResponseBody::Text(r#"{"a":1}"#.to_string()));

        let body = decode_body(None, b"hello".to_vec());
        assert_eq!(body.as_text(), Some("hello"));
    }

    #[test]
    fn invalid_utf8_stays_bytes() {
        let body = decode_body(Some("application/octet-stream"), vec![0xff, 0xfe, 0x00]);
        assert_eq!(body, ResponseBody::Bytes(vec![0xff, 0xfe, 0x00]));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut snapshot = ResponseSnapshot::default();
        snapshot
            .headers
            .insert("content-type".to_string(), "text/html".to_string());
        assert_eq!(snapshot.header("Content-Type"), Some("text/html"));
        assert_eq!(snapshot.header("etag"), None);
    }

    #[test]
    fn status_helpers() {
        let snapshot = ResponseSnapshot {
            status_code: 404,
            ..Default::default()
        };
        assert!(snapshot.is_client_error());
        assert!(!snapshot.is_success());
        assert!(!snapshot.is_server_error());
    }

    #[test]
    fn success_agrees_with_classification() {
        for status_code in [200, 204, 299, 304] {
            let snapshot = ResponseSnapshot {
                status_code,
                ..Default::default()
            };
            assert!(snapshot.is_success(), "{}", status_code);
        }
        for status_code in [0, 199, 301, 302, 404, 500] {
            let snapshot = ResponseSnapshot {
                status_code,
                ..Default::default()
            };
            assert!(!snapshot.is_success(), "{}", status_code);
        }
    }

    #[test]
    fn snapshot_serializes_camel_case_fields() {
        let snapshot = ResponseSnapshot {
            body: ResponseBody::Json(json!("quoted")),
            http_version: "1.1".to_string(),
            http_version_major: 1,
            http_version_minor: 1,
            raw_headers: vec![("etag".to_string(), "\"v1\"".to_string())],
            status_code: 200,
            status_message: "OK".to_string(),
            ..Default::default()
        };

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["statusMessage"], "OK");
        assert_eq!(value["httpVersion"], "1.1");
        assert_eq!(value["httpVersionMajor"], 1);
        assert_eq!(value["rawHeaders"], json!([["etag", "\"v1\""]]));
        assert!(value.get("status_code").is_none());

        let restored: ResponseSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(restored.body, ResponseBody::Json(json!("quoted")));
    }

    #[test]
    fn json_helper_reads_text_bodies_too() {
        let snapshot = ResponseSnapshot {
            body: ResponseBody::Text(r#"{"id": 7}"#.to_string()),
            ..Default::default()
        };
        let value: JsonValue = snapshot.json().unwrap();
        assert_eq!(value["id"], 7);
    }
}
