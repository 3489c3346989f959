//! Classification of finished requests.

use std::fmt;

use crate::error::Error;
use crate::response::ResponseSnapshot;

pub const REQUEST_ERROR: &str = "request-error";
pub const REQUEST_FAIL: &str = "request-fail";
pub const REQUEST_OK: &str = "request-ok";

/// The three outcome kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    /// Transport failure; no status code.
    Error,
    /// Response outside 2xx and 304.
    Fail,
    /// 2xx or 304.
    Ok,
}

impl OutcomeKind {
    /// Event/callback label: `request-error`, `request-fail` or `request-ok`.
    pub fn label(self) -> &'static str {
        match self {
            OutcomeKind::Error => REQUEST_ERROR,
            OutcomeKind::Fail => REQUEST_FAIL,
            OutcomeKind::Ok => REQUEST_OK,
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a status code. `0` stands for an absent code and is a failure.
pub fn classify(status_code: u16) -> OutcomeKind {
    if (200..300).contains(&status_code) || status_code == 304 {
        OutcomeKind::Ok
    } else {
        OutcomeKind::Fail
    }
}

/// One finished request attempt.
#[derive(Debug)]
pub enum Outcome {
    Ok(ResponseSnapshot),
    Fail(ResponseSnapshot),
    Error(Error),
}

impl Outcome {
    /// Label a response by its status code.
    pub fn from_response(response: ResponseSnapshot) -> Self {
        match classify(response.status_code) {
            OutcomeKind::Ok => Outcome::Ok(response),
            _ => Outcome::Fail(response),
        }
    }

    /// Ok/Fail from a response, Error from a transport failure.
    pub fn from_result(result: Result<ResponseSnapshot, Error>) -> Self {
        match result {
            Ok(response) => Self::from_response(response),
            Err(error) => Outcome::Error(error),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Ok(_) => OutcomeKind::Ok,
            Outcome::Fail(_) => OutcomeKind::Fail,
            Outcome::Error(_) => OutcomeKind::Error,
        }
    }

    pub fn response(&self) -> Option<&ResponseSnapshot> {
        match self {
            Outcome::Ok(response) | Outcome::Fail(response) => Some(response),
            Outcome::Error(_) => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.response().map(|response| response.status_code)
    }

    /// Collapse into the promise shape: Ok and Fail resolve, Error rejects.
    pub fn into_result(self) -> Result<ResponseSnapshot, Error> {
        match self {
            Outcome::Ok(response) | Outcome::Fail(response) => Ok(response),
            Outcome::Error(error) => Err(error),
        }
    }
}
