//! Request options and their normalization.
//!
//! A [`RequestOptions`] record is what callers hand to
//! [`Requester::request`](crate::Requester::request). Before anything touches
//! the network it goes through [`RequestOptions::normalize`], which:
//!
//! 1. splits the delivery mode (`request_type`) off the record,
//! 2. resolves `url` into `protocol`, `hostname`, `port`, `path` and `auth`,
//! 3. folds the legacy `host` alias into `hostname`,
//! 4. canonicalizes header names and fills in `Content-Type` and `Accept`.
//!
//! The normalized record is also the input of the cache key, so its JSON
//! serialization must stay deterministic (ordered header table, fixed field order).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use url::Url;

use crate::delivery::{Callback, RequestType};
use crate::error::Error;
use crate::headers::{self, Headers};
use crate::outcome::Outcome;

const HTTP: &str = "http:";
const HTTPS: &str = "https:";

/// HTTP method for requests.
///
/// Names are case-insensitive and stored uppercase. Methods outside the common
/// set are carried as [`Method::Other`] and checked during normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum Method {
    #[default]
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::PATCH => "PATCH",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::Other(method) => method,
        }
    }
}

impl From<&str> for Method {
    fn from(method: &str) -> Self {
        let method = method.to_ascii_uppercase();
        match method.as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "PATCH" => Method::PATCH,
            "HEAD" => Method::HEAD,
            "OPTIONS" => Method::OPTIONS,
            _ => Method::Other(method),
        }
    }
}

impl From<String> for Method {
    fn from(method: String) -> Self {
        Method::from(method.as_str())
    }
}

impl From<Method> for String {
    fn from(method: Method) -> Self {
        match method {
            Method::Other(method) => method,
            known => known.as_str().to_string(),
        }
    }
}

impl TryFrom<&Method> for http::Method {
    type Error = Error;

    fn try_from(method: &Method) -> Result<Self, Self::Error> {
        http::Method::from_bytes(method.as_str().as_bytes()).map_err(|e| {
            Error::invalid_argument(format!("invalid method '{}': {}", method.as_str(), e))
        })
    }
}

/// Request payload. Strings are sent verbatim, structured values as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RequestBody {
    Text(String),
    Json(JsonValue),
}

impl RequestBody {
    /// UTF-8 bytes written to the request stream.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        match self {
            RequestBody::Text(text) => Ok(text.as_bytes().to_vec()),
            RequestBody::Json(value) => Ok(serde_json::to_vec(value)?),
        }
    }
}

/// Options for a single request.
///
/// Either `url` or `hostname` (or its legacy alias `host`) must be set.
/// Durations (`timeout`, `cache_time`) are in milliseconds.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Legacy alias for `hostname`, removed during normalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Explicit path override; replaces any path derived from `url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pathname: Option<String>,

    /// Request path including the query string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// `"http:"` or `"https:"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default)]
    pub method: Method,

    #[serde(default)]
    pub headers: Headers,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RequestBody>,

    /// Basic auth credentials as `user:password`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,

    /// IP family of the local socket (4 or 6).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,

    /// Deadline in milliseconds for the whole exchange, from connect until the
    /// body is buffered. Unset means no deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Per-request cache duration in milliseconds; overrides the store default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_time: Option<u64>,

    /// Delivery mode. Never serialized and never forwarded to the transport.
    #[serde(skip)]
    pub request_type: RequestType,
}

impl RequestOptions {
    /// Options for a bare URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url).with_method(Method::GET)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(url).with_method(Method::POST)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(url).with_method(Method::PUT)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(url).with_method(Method::DELETE)
    }

    /// Build options from a configuration value.
    ///
    /// `null` means no options were supplied at all and is rejected. A string
    /// is treated as a bare URL. A `requestType` of `"promise"` selects
    /// promise delivery; anything else falls back to event delivery.
    pub fn from_value(value: JsonValue) -> Result<Self, Error> {
        match value {
            JsonValue::Null => Err(Error::invalid_argument("request options are required")),
            JsonValue::String(url) => Ok(Self::new(url)),
            JsonValue::Object(mut map) => {
                let request_type = match map.remove("requestType") {
                    Some(JsonValue::String(kind)) if kind == "promise" => RequestType::Promise,
                    _ => RequestType::Event,
                };
                let mut options: RequestOptions =
                    serde_json::from_value(JsonValue::Object(map))?;
                options.request_type = request_type;
                Ok(options)
            }
            other => Err(Error::invalid_argument(format!(
                "request options must be an object or a URL string, got {}",
                other
            ))),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Serialize) -> Result<Self, serde_json::Error> {
        self.body = Some(RequestBody::Json(serde_json::to_value(body)?));
        Ok(self)
    }

    pub fn with_json_body(mut self, body: JsonValue) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn with_text_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = Some(cache_time.as_millis() as u64);
        self
    }

    pub fn with_request_type(mut self, request_type: RequestType) -> Self {
        self.request_type = request_type;
        self
    }

    /// Deliver the outcome to `callback` instead of returning a handle.
    pub fn with_callback<F>(self, callback: F) -> Self
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        self.with_request_type(RequestType::Callback(Callback::new(callback)))
    }

    /// Resolve the options into connection fields.
    ///
    /// Returns the normalized options (with `request_type` reset to its default)
    /// and the delivery mode that was split off. Fails with
    /// [`Error::InvalidArgument`] if no hostname can be resolved, or if the
    /// method, a header, the local binding or the assembled URL would be
    /// rejected by the transport.
    pub fn normalize(mut self) -> Result<(RequestOptions, RequestType), Error> {
        let request_type = std::mem::take(&mut self.request_type);

        if let Some(raw) = self.url.take() {
            let parsed = Url::parse(&raw)
                .map_err(|e| Error::invalid_argument(format!("invalid url '{}': {}", raw, e)))?;
            self.merge_url(&parsed);
        } else if let Some(pathname) = &self.pathname {
            self.path = Some(pathname.clone());
        }

        self.resolve_hostname()?;

        self.protocol = Some(
            self.protocol
                .take()
                .map(|p| p.to_ascii_lowercase())
                .unwrap_or_else(|| HTTP.to_string()),
        );
        if self.path.as_deref().map_or(true, str::is_empty) {
            self.path = Some("/".to_string());
        }

        let mut headers = headers::canonicalize(std::mem::take(&mut self.headers));
        headers::apply_defaults(&mut headers, self.body.as_ref());
        self.headers = headers;

        self.validate()?;
        Ok((self, request_type))
    }

    fn validate(&self) -> Result<(), Error> {
        http::Method::try_from(&self.method)?;

        for (name, value) in &self.headers {
            HeaderName::try_from(name.as_str()).map_err(|e| {
                Error::invalid_argument(format!("invalid header name '{}': {}", name, e))
            })?;
            HeaderValue::try_from(value.as_str()).map_err(|e| {
                Error::invalid_argument(format!("invalid value for header '{}': {}", name, e))
            })?;
        }

        self.local_bind()?;
        self.target_url()
            .map_err(|e| Error::invalid_argument(format!("cannot assemble request url: {}", e)))?;
        Ok(())
    }

    /// Local address the socket binds to, from `local_address` or else `family`.
    pub fn local_bind(&self) -> Result<Option<IpAddr>, Error> {
        match (&self.local_address, self.family) {
            (_, Some(family)) if family != 4 && family != 6 => Err(Error::invalid_argument(
                format!("family must be 4 or 6, got {}", family),
            )),
            (Some(address), family) => {
                let ip = address.parse::<IpAddr>().map_err(|e| {
                    Error::invalid_argument(format!("invalid localAddress '{}': {}", address, e))
                })?;
                match (ip, family) {
                    (IpAddr::V4(_), Some(6)) | (IpAddr::V6(_), Some(4)) => {
                        Err(Error::invalid_argument(format!(
                            "localAddress '{}' does not match family {}",
                            address,
                            family.unwrap_or_default()
                        )))
                    }
                    _ => Ok(Some(ip)),
                }
            }
            (None, Some(4)) => Ok(Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED))),
            (None, Some(_)) => Ok(Some(IpAddr::V6(Ipv6Addr::UNSPECIFIED))),
            (None, None) => Ok(None),
        }
    }

    fn merge_url(&mut self, url: &Url) {
        self.protocol = Some(format!("{}:", url.scheme()));

        if let Some(host) = url.host_str() {
            self.hostname = Some(strip_brackets(host).to_string());
        }
        if let Some(port) = url.port() {
            self.port = Some(port);
        }

        if self.auth.is_none() && !url.username().is_empty() {
            self.auth = Some(match url.password() {
                Some(password) => format!("{}:{}", url.username(), password),
                None => url.username().to_string(),
            });
        }

        self.path = Some(match (&self.pathname, url.query()) {
            (Some(pathname), _) => pathname.clone(),
            (None, Some(query)) => format!("{}?{}", url.path(), query),
            (None, None) => url.path().to_string(),
        });
    }

    fn resolve_hostname(&mut self) -> Result<(), Error> {
        match self.host.take() {
            Some(host) if self.hostname.is_none() => {
                let (hostname, port) = split_host_port(&host);
                self.hostname = Some(hostname.to_string());
                if self.port.is_none() {
                    self.port = port;
                }
            }
            _ => {}
        }

        match self.hostname.as_deref() {
            Some(hostname) if !hostname.is_empty() => Ok(()),
            _ => Err(Error::invalid_argument(
                "request options must resolve to a hostname",
            )),
        }
    }

    /// Whether the request goes over TLS.
    pub fn is_https(&self) -> bool {
        self.protocol.as_deref() == Some(HTTPS)
    }

    /// Absolute URL of a normalized request.
    pub fn target_url(&self) -> Result<Url, Error> {
        let hostname = self
            .hostname
            .as_deref()
            .ok_or_else(|| Error::invalid_argument("request has no hostname"))?;
        let scheme = if self.is_https() { "https" } else { "http" };
        let host = if hostname.contains(':') {
            format!("[{}]", hostname)
        } else {
            hostname.to_string()
        };
        let authority = match self.port {
            Some(port) => format!("{}:{}", host, port),
            None => host,
        };
        let path = self.path.as_deref().unwrap_or("/");
        let separator = if path.starts_with('/') { "" } else { "/" };

        Ok(Url::parse(&format!(
            "{}://{}{}{}",
            scheme, authority, separator, path
        ))?)
    }
}

impl From<&str> for RequestOptions {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for RequestOptions {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

// "example.com:8080" -> ("example.com", Some(8080)); bare IPv6 literals are left alone.
fn split_host_port(host: &str) -> (&str, Option<u16>) {
    if let Some(rest) = host.strip_prefix('[') {
        if let Some((address, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
            return (address, port);
        }
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') => match port.parse() {
            Ok(port) => (name, Some(port)),
            Err(_) => (host, None),
        },
        _ => (host, None),
    }
}
