//! The request entry point.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::cache::{cache_key, CacheStore};
use crate::delivery::{self, Callback, Dispatched, OutcomeHandle, PendingResponse, Sink};
use crate::error::Error;
use crate::executor::{HttpExecutor, ReqwestExecutor};
use crate::headers::{canonical_name, Headers};
use crate::options::RequestOptions;
use crate::outcome::Outcome;
use crate::response::ResponseSnapshot;

/// Issues requests and delivers their outcomes.
///
/// Every call normalizes its options synchronously, so configuration errors
/// surface as an `Err` from the call itself. The network work then runs as one
/// task on the current tokio runtime and its outcome is delivered exactly once.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use std::time::Duration;
/// use outcall::{CacheStore, Outcome, Requester, RequestOptions};
///
/// let cache = Arc::new(CacheStore::with_default_ttl(Duration::from_secs(60)));
/// let requester = Requester::new(cache)?;
///
/// match requester.emit("https://api.example.com/users/1")?.await {
///     Outcome::Ok(response) => println!("{:?}", response.body),
///     Outcome::Fail(response) => println!("status {}", response.status_code),
///     Outcome::Error(error) => eprintln!("{}", error),
/// }
/// ```
#[derive(Clone)]
pub struct Requester {
    executor: Arc<dyn HttpExecutor>,
    cache: Arc<CacheStore>,
    default_headers: Headers,
}

impl Requester {
    /// Create a requester backed by reqwest. Only a request's own `timeout`
    /// option bounds it.
    pub fn new(cache: Arc<CacheStore>) -> Result<Self, Error> {
        let executor = ReqwestExecutor::new()?;
        Ok(Self::with_executor(Arc::new(executor), cache))
    }

    /// Create a requester that bounds every request by `timeout`, on top of
    /// any per-request `timeout` option.
    pub fn with_timeout(cache: Arc<CacheStore>, timeout: Duration) -> Result<Self, Error> {
        let executor = ReqwestExecutor::with_timeout(timeout)?;
        Ok(Self::with_executor(Arc::new(executor), cache))
    }

    pub fn with_executor(executor: Arc<dyn HttpExecutor>, cache: Arc<CacheStore>) -> Self {
        Self {
            executor,
            cache,
            default_headers: Headers::new(),
        }
    }

    /// Add a default header sent with every request. Headers set on the
    /// request itself take precedence.
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Issue a request, delivering the outcome per its `request_type`.
    pub fn request(&self, options: impl Into<RequestOptions>) -> Result<Dispatched, Error> {
        let (options, request_type) = self.prepare(options.into())?;
        let (sink, dispatched) = delivery::channel(request_type);
        self.spawn(options, sink)?;
        Ok(dispatched)
    }

    /// Issue a request in event mode, whatever its `request_type`.
    pub fn emit(&self, options: impl Into<RequestOptions>) -> Result<OutcomeHandle, Error> {
        let (options, _) = self.prepare(options.into())?;
        let (sink, handle) = delivery::event();
        self.spawn(options, sink)?;
        Ok(handle)
    }

    /// Issue a request in promise mode, whatever its `request_type`.
    pub fn fetch(&self, options: impl Into<RequestOptions>) -> Result<PendingResponse, Error> {
        let (options, _) = self.prepare(options.into())?;
        let (sink, pending) = delivery::promise();
        self.spawn(options, sink)?;
        Ok(pending)
    }

    /// Issue a request and hand its outcome to `callback`.
    pub fn on_complete<F>(&self, options: impl Into<RequestOptions>, callback: F) -> Result<(), Error>
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        let (options, _) = self.prepare(options.into())?;
        self.spawn(options, Sink::Callback(Callback::new(callback)))
    }

    fn prepare(
        &self,
        mut options: RequestOptions,
    ) -> Result<(RequestOptions, delivery::RequestType), Error> {
        for (name, value) in &self.default_headers {
            let canonical = canonical_name(name);
            let present = options
                .headers
                .keys()
                .any(|existing| canonical_name(existing) == canonical);
            if !present {
                options.headers.insert(name.clone(), value.clone());
            }
        }
        options.normalize()
    }

    fn spawn(&self, options: RequestOptions, sink: Sink) -> Result<(), Error> {
        let runtime = Handle::try_current().map_err(|e| Error::NoRuntime {
            message: e.to_string(),
        })?;

        let ttl = self.cache.effective_ttl(options.cache_time);
        let cache_slot = if ttl.is_zero() {
            None
        } else {
            Some((cache_key(&options)?, ttl))
        };

        let executor = Arc::clone(&self.executor);
        let cache = Arc::clone(&self.cache);
        runtime.spawn(async move {
            let result = execute(executor.as_ref(), &cache, &options, cache_slot).await;
            sink.deliver(Outcome::from_result(result));
        });

        Ok(())
    }
}

/// Serve from the cache when possible, otherwise hit the network and
/// populate the cache before returning.
async fn execute(
    executor: &dyn HttpExecutor,
    cache: &CacheStore,
    options: &RequestOptions,
    cache_slot: Option<(String, Duration)>,
) -> Result<ResponseSnapshot, Error> {
    if let Some((hash, _)) = &cache_slot {
        if let Some(cached) = cache.lookup(hash) {
            tracing::debug!(hash = %hash, "cache hit");
            return Ok(cached);
        }
        tracing::debug!(hash = %hash, "cache miss");
    }

    let response = executor.execute(options).await.map_err(|error| {
        tracing::debug!(%error, hostname = ?options.hostname, "request failed");
        error
    })?;

    if let Some((hash, ttl)) = &cache_slot {
        cache.insert(hash, *ttl, &response);
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::RequestType;
    use crate::executor::mock::MockExecutor;
    use crate::outcome::OutcomeKind;
    use crate::response::ResponseBody;
    use serde_json::json;

    fn requester(executor: &MockExecutor, cache: CacheStore) -> Requester {
        Requester::with_executor(Arc::new(executor.clone()), Arc::new(cache))
    }

    #[tokio::test]
    async fn event_mode_labels_ok() {
        let executor = MockExecutor::new()
            .with_response("/users/1", MockExecutor::success_response(json!({"id": 1})));
        let requester = requester(&executor, CacheStore::new());

        let handle = requester
            .request("http://example.com/users/1")
            .unwrap()
            .into_event()
            .unwrap();
        let outcome = handle.await;

        assert_eq!(outcome.kind(), OutcomeKind::Ok);
        assert_eq!(
            outcome.response().unwrap().body,
            ResponseBody::Json(json!({"id": 1}))
        );
    }

    #[tokio::test]
    async fn event_mode_labels_fail() {
        let executor = MockExecutor::new();
        let requester = requester(&executor, CacheStore::new());

        let outcome = requester.emit("http://example.com/missing").unwrap().await;
        assert_eq!(outcome.kind(), OutcomeKind::Fail);
        assert_eq!(outcome.status_code(), Some(404));
    }

    #[tokio::test]
    async fn event_mode_labels_transport_error() {
        let executor = MockExecutor::new().fail_with("connection refused");
        let requester = requester(&executor, CacheStore::new());

        let outcome = requester.emit("http://example.com/").unwrap().await;
        assert_eq!(outcome.kind(), OutcomeKind::Error);
        assert_eq!(outcome.status_code(), None);
    }

    #[tokio::test]
    async fn promise_mode_resolves_fail() {
        let executor = MockExecutor::new();
        let requester = requester(&executor, CacheStore::new());

        let pending = requester
            .request(RequestOptions::get("http://example.com/missing").with_request_type(RequestType::Promise))
            .unwrap()
            .into_promise()
            .unwrap();
        assert_eq!(pending.await.unwrap().status_code, 404);
    }

    #[tokio::test]
    async fn promise_mode_rejects_transport_error() {
        let executor = MockExecutor::new().fail_with("dns failure");
        let requester = requester(&executor, CacheStore::new());

        let err = requester.fetch("http://example.com/").unwrap().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn callback_mode_receives_outcome() {
        let executor = MockExecutor::new()
            .with_default_response(MockExecutor::success_response(json!({"ok": true})));
        let requester = requester(&executor, CacheStore::new());
        let (tx, rx) = tokio::sync::oneshot::channel();

        let dispatched = requester
            .request(RequestOptions::get("http://example.com/").with_callback(move |outcome| {
                let _ = tx.send(outcome.kind());
            }))
            .unwrap();

        assert!(matches!(dispatched, Dispatched::Callback));
        assert_eq!(rx.await.unwrap(), OutcomeKind::Ok);
    }

    #[tokio::test]
    async fn cache_hit_skips_the_executor() {
        let executor = MockExecutor::new()
            .with_default_response(MockExecutor::success_response(json!({"n": 1})));
        let requester = requester(&executor, CacheStore::new());
        let options = || RequestOptions::get("http://example.com/data").with_cache_time(Duration::from_secs(60));

        let first = requester.fetch(options()).unwrap().await.unwrap();
        let second = requester.fetch(options()).unwrap().await.unwrap();

        assert_eq!(executor.call_count(), 1);
        assert_eq!(first, second);
        assert_eq!(requester.cache().len(), 1);
    }

    #[tokio::test]
    async fn failed_responses_are_cached_too() {
        let executor = MockExecutor::new();
        let cache = CacheStore::with_default_ttl(Duration::from_secs(60));
        let requester = requester(&executor, cache);

        requester.emit("http://example.com/gone").unwrap().await;
        let outcome = requester.emit("http://example.com/gone").unwrap().await;

        assert_eq!(outcome.kind(), OutcomeKind::Fail);
        assert_eq!(executor.call_count(), 1);
    }

    #[tokio::test]
    async fn zero_ttl_disables_caching() {
        let executor = MockExecutor::new()
            .with_default_response(MockExecutor::success_response(json!({})));
        let requester = requester(&executor, CacheStore::with_default_ttl(Duration::from_secs(60)));
        let options = || RequestOptions::get("http://example.com/").with_cache_time(Duration::ZERO);

        requester.fetch(options()).unwrap().await.unwrap();
        requester.fetch(options()).unwrap().await.unwrap();

        assert_eq!(executor.call_count(), 2);
        assert!(requester.cache().is_empty());
    }

    #[tokio::test]
    async fn transport_errors_are_not_cached() {
        let executor = MockExecutor::new().fail_with("reset");
        let requester = requester(&executor, CacheStore::with_default_ttl(Duration::from_secs(60)));

        requester.emit("http://example.com/").unwrap().await;
        assert!(requester.cache().is_empty());
    }

    #[tokio::test]
    async fn default_headers_merge_under_request_headers() {
        let executor = MockExecutor::new()
            .with_default_response(MockExecutor::success_response(json!({})));
        let requester = requester(&executor, CacheStore::new())
            .with_default_header("authorization", "Bearer default")
            .with_default_header("User-Agent", "outcall");

        requester
            .fetch(RequestOptions::get("http://example.com/").with_header("Authorization", "Bearer mine"))
            .unwrap()
            .await
            .unwrap();

        let recorded = executor.recorded_requests();
        assert_eq!(recorded[0]["headers"]["Authorization"], "Bearer mine");
        assert_eq!(recorded[0]["headers"]["User-Agent"], "outcall");
        assert!(recorded[0].get("requestType").is_none());
    }

    #[tokio::test]
    async fn invalid_options_fail_synchronously() {
        let executor = MockExecutor::new();
        let requester = requester(&executor, CacheStore::new());
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&called);

        let result = requester.on_complete(RequestOptions::default(), move |_| {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
        tokio::task::yield_now().await;
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(executor.call_count(), 0);
    }

    #[tokio::test]
    async fn transport_configuration_errors_fail_synchronously() {
        let executor = MockExecutor::new();
        let requester = requester(&executor, CacheStore::new());

        let mut bad_bind = RequestOptions::get("http://example.com/");
        bad_bind.local_address = Some("not-an-ip".to_string());
        let bad_header = RequestOptions::get("http://example.com/").with_header("X-Bad", "a\r\nb");
        let bad_host = RequestOptions {
            hostname: Some("bad host".to_string()),
            ..Default::default()
        };

        assert!(matches!(requester.emit(bad_bind), Err(Error::InvalidArgument { .. })));
        assert!(matches!(requester.fetch(bad_header), Err(Error::InvalidArgument { .. })));
        assert!(matches!(requester.request(bad_host), Err(Error::InvalidArgument { .. })));

        tokio::task::yield_now().await;
        assert_eq!(executor.call_count(), 0);
    }

    #[test]
    fn request_outside_runtime_is_rejected() {
        let executor = MockExecutor::new();
        let requester = requester(&executor, CacheStore::new());

        let err = requester.emit("http://example.com/").unwrap_err();
        assert!(matches!(err, Error::NoRuntime { .. }));
    }
}
