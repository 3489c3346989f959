//! HTTP execution abstraction.
//!
//! [`HttpExecutor`] performs exactly one network call for a normalized
//! [`RequestOptions`] and returns the fully buffered, decoded response. The
//! trait is the seam the [`Requester`](crate::Requester) is tested through;
//! [`ReqwestExecutor`] is the production transport.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Response};

use crate::error::Error;
use crate::options::RequestOptions;
use crate::response::{decode_body, ResponseSnapshot};

/// Trait for executing HTTP requests.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    /// Issue one request and return the buffered response.
    ///
    /// `Err` means the request never produced an HTTP response (DNS, connect,
    /// timeout, reset). Any status code, 4xx and 5xx included, is `Ok`.
    async fn execute(&self, request: &RequestOptions) -> Result<ResponseSnapshot, Error>;
}

/// Production HTTP executor using reqwest.
///
/// Redirects are never followed: a 3xx is reported as the response it is.
pub struct ReqwestExecutor {
    client: Client,
    timeout: Option<Duration>,
}

impl ReqwestExecutor {
    /// Create an executor with no client-level deadline. Requests are bounded
    /// only by their own `timeout` option.
    pub fn new() -> Result<Self, Error> {
        Self::build(None)
    }

    /// Create an executor that bounds every request by `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, Error> {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Result<Self, Error> {
        let client = Self::client_builder(timeout).build()?;
        Ok(Self { client, timeout })
    }

    fn client_builder(timeout: Option<Duration>) -> ClientBuilder {
        let builder = Client::builder().redirect(Policy::none());
        match timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    // Local binding is a client-level setting in reqwest, so requests that ask
    // for one get their own client.
    fn client_for(&self, request: &RequestOptions) -> Result<Client, Error> {
        match request.local_bind()? {
            Some(address) => Ok(Self::client_builder(self.timeout)
                .local_address(address)
                .build()?),
            None => Ok(self.client.clone()),
        }
    }

    fn header_map(request: &RequestOptions) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let header_name = HeaderName::try_from(name.as_str())?;
            let header_value = HeaderValue::try_from(value.as_str())?;
            headers.append(header_name, header_value);
        }
        Ok(headers)
    }

    async fn snapshot(mut response: Response, method: &str) -> Result<ResponseSnapshot, Error> {
        let status = response.status();
        let (http_version_major, http_version_minor) = version_numbers(response.version());

        let mut headers = BTreeMap::new();
        let mut raw_headers = Vec::with_capacity(response.headers().len());
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            raw_headers.push((name.to_string(), value.clone()));
            headers
                .entry(name.to_string())
                .and_modify(|existing: &mut String| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let url = response.url().to_string();

        let mut buffer = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            buffer.extend_from_slice(&chunk);
        }

        Ok(ResponseSnapshot {
            body: decode_body(content_type.as_deref(), buffer),
            headers,
            http_version: format!("{}.{}", http_version_major, http_version_minor),
            http_version_major,
            http_version_minor,
            method: method.to_string(),
            raw_headers,
            status_code: status.as_u16(),
            status_message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            trailers: BTreeMap::new(),
            url,
        })
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: &RequestOptions) -> Result<ResponseSnapshot, Error> {
        if let Some(socket_path) = &request.socket_path {
            return Err(Error::transport(format!(
                "unix socket transport is not available ({})",
                socket_path
            )));
        }

        let url = request.target_url()?;
        let client = self.client_for(request)?;
        let method = http::Method::try_from(&request.method)?;

        let mut req_builder = client
            .request(method, url)
            .headers(Self::header_map(request)?);

        if let Some(timeout_ms) = request.timeout {
            req_builder = req_builder.timeout(Duration::from_millis(timeout_ms));
        }

        if let Some(auth) = &request.auth {
            req_builder = match auth.split_once(':') {
                Some((user, password)) => req_builder.basic_auth(user, Some(password)),
                None => req_builder.basic_auth(auth, None::<&str>),
            };
        }

        if let Some(body) = &request.body {
            req_builder = req_builder.body(body.to_bytes()?);
        }

        let response = req_builder.send().await?;
        Self::snapshot(response, request.method.as_str()).await
    }
}

fn version_numbers(version: http::Version) -> (u8, u8) {
    match version {
        http::Version::HTTP_09 => (0, 9),
        http::Version::HTTP_10 => (1, 0),
        http::Version::HTTP_2 => (2, 0),
        http::Version::HTTP_3 => (3, 0),
        _ => (1, 1),
    }
}
