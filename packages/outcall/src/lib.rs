//! # outcall
//!
//! HTTP request helper with outcome classification and a time-bounded
//! response cache.
//!
//! A request goes through four steps:
//!
//! 1. [`RequestOptions::normalize`] resolves the URL, the legacy `host` alias
//!    and header defaults, and splits off the delivery mode.
//! 2. If caching applies (a non-zero `cache_time`, or the [`CacheStore`]
//!    default TTL), the [`CacheStore`] is consulted by the SHA-256 of the
//!    normalized options.
//! 3. On a miss, an [`HttpExecutor`] performs the call, buffers the body and
//!    decodes JSON-family content types; the result is cached.
//! 4. The response is classified ([`classify`]) and delivered as an
//!    [`Outcome`] through the requested [`RequestType`].
//!
//! ## Delivery modes
//!
//! ```ignore
//! use std::sync::Arc;
//! use outcall::{CacheStore, Outcome, Requester, RequestOptions};
//!
//! let requester = Requester::new(Arc::new(CacheStore::new()))?;
//!
//! // Event mode: a handle that yields exactly one outcome.
//! let outcome = requester.emit("https://example.com/")?.await;
//! println!("{}", outcome.kind()); // request-ok, request-fail or request-error
//!
//! // Promise mode: 4xx/5xx responses resolve; only transport errors reject.
//! let response = requester.fetch("https://example.com/missing")?.await?;
//! assert_eq!(response.status_code, 404);
//!
//! // Callback mode.
//! requester.on_complete("https://example.com/", |outcome| {
//!     if let Outcome::Ok(response) = outcome {
//!         println!("{:?}", response.body);
//!     }
//! })?;
//! ```
//!
//! ## Cache persistence
//!
//! ```ignore
//! let cache = Arc::new(CacheStore::with_default_ttl(Duration::from_secs(300)));
//! cache.load_from("responses.json")?;
//! // ... issue requests ...
//! cache.dump_to("responses.json")?;
//! ```

pub mod cache;
pub mod client;
pub mod delivery;
pub mod error;
pub mod executor;
pub mod headers;
pub mod options;
pub mod outcome;
pub mod response;

pub use cache::{cache_key, CacheEntry, CacheStore, CacheTable};
pub use client::Requester;
pub use delivery::{Callback, Dispatched, OutcomeHandle, PendingResponse, RequestType};
pub use error::Error;
pub use executor::{HttpExecutor, ReqwestExecutor};
pub use options::{Method, RequestBody, RequestOptions};
pub use outcome::{classify, Outcome, OutcomeKind};
pub use response::{ResponseBody, ResponseSnapshot};
