//! Delivery modes for request outcomes.
//!
//! A request's outcome reaches the caller in one of three shapes, chosen by
//! [`RequestType`]:
//!
//! - **Event** (default): [`Requester::request`](crate::Requester::request)
//!   returns an [`OutcomeHandle`] immediately; awaiting it yields the
//!   [`Outcome`], whose [`kind`](Outcome::kind) is the emitted event.
//! - **Promise**: returns a [`PendingResponse`] that resolves for Ok *and*
//!   Fail responses and rejects only on transport errors.
//! - **Callback**: the [`Callback`] runs once with the [`Outcome`] and nothing
//!   is returned.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::Error;
use crate::outcome::Outcome;
use crate::response::ResponseSnapshot;

/// A one-shot outcome consumer.
///
/// Held behind a `Mutex` so that [`RequestOptions`](crate::RequestOptions)
/// stays `Sync` while it carries one.
pub struct Callback(Mutex<Box<dyn FnOnce(Outcome) + Send + 'static>>);

impl Callback {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        Self(Mutex::new(Box::new(callback)))
    }

    pub(crate) fn call(self, outcome: Outcome) {
        let callback = self.0.into_inner().unwrap_or_else(PoisonError::into_inner);
        callback(outcome)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(..)")
    }
}

/// How the outcome of a request is handed back.
#[derive(Debug, Default)]
pub enum RequestType {
    #[default]
    Event,
    Promise,
    Callback(Callback),
}

/// What [`Requester::request`](crate::Requester::request) returns for each
/// delivery mode.
#[derive(Debug)]
pub enum Dispatched {
    Event(OutcomeHandle),
    Promise(PendingResponse),
    /// The outcome goes to the callback.
    Callback,
}

impl Dispatched {
    pub fn into_event(self) -> Option<OutcomeHandle> {
        match self {
            Dispatched::Event(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn into_promise(self) -> Option<PendingResponse> {
        match self {
            Dispatched::Promise(pending) => Some(pending),
            _ => None,
        }
    }
}

/// Sending half used by the request task.
pub(crate) enum Sink {
    Channel(oneshot::Sender<Outcome>),
    Callback(Callback),
}

impl Sink {
    pub(crate) fn deliver(self, outcome: Outcome) {
        tracing::trace!(kind = %outcome.kind(), "delivering outcome");
        match self {
            Sink::Channel(tx) => {
                // The receiver may have been dropped; nobody is listening then.
                let _ = tx.send(outcome);
            }
            Sink::Callback(callback) => callback.call(outcome),
        }
    }
}

pub(crate) fn event() -> (Sink, OutcomeHandle) {
    let (tx, rx) = oneshot::channel();
    (Sink::Channel(tx), OutcomeHandle { rx })
}

pub(crate) fn promise() -> (Sink, PendingResponse) {
    let (tx, rx) = oneshot::channel();
    (Sink::Channel(tx), PendingResponse { rx })
}

/// Split a delivery mode into the task-side sink and the caller-side value.
pub(crate) fn channel(request_type: RequestType) -> (Sink, Dispatched) {
    match request_type {
        RequestType::Event => {
            let (sink, handle) = event();
            (sink, Dispatched::Event(handle))
        }
        RequestType::Promise => {
            let (sink, pending) = promise();
            (sink, Dispatched::Promise(pending))
        }
        RequestType::Callback(callback) => (Sink::Callback(callback), Dispatched::Callback),
    }
}

/// Event-mode handle: resolves to exactly one [`Outcome`].
#[derive(Debug)]
pub struct OutcomeHandle {
    rx: oneshot::Receiver<Outcome>,
}

impl Future for OutcomeHandle {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Outcome::Error(Error::ChannelClosed)))
    }
}

/// Promise-mode handle.
///
/// Resolves with the response for Ok and Fail outcomes alike; callers tell
/// them apart by `status_code`. Rejects only with transport errors.
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<Outcome>,
}

impl Future for PendingResponse {
    type Output = Result<ResponseSnapshot, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(outcome) => outcome.into_result(),
            Err(_) => Err(Error::ChannelClosed),
        })
    }
}
