//! Error types for outcall.

/// Errors produced while preparing, dispatching or caching a request.
///
/// Configuration errors (`InvalidArgument`, `UrlParse`, `NoRuntime`) are raised
/// synchronously by the entry point. Transport errors reach the caller through
/// the selected delivery mode as [`crate::Outcome::Error`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No async runtime: {message}")]
    NoRuntime { message: String },

    #[error("Outcome channel closed before delivery")]
    ChannelClosed,
}

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
        }
    }

    /// Whether this error belongs to the transport class (DNS, connect,
    /// timeout, reset) rather than to request configuration.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_display() {
        let e = Error::invalid_argument("hostname is required");
        assert!(e.to_string().contains("Invalid argument"));
        assert!(e.to_string().contains("hostname is required"));
        assert!(!e.is_transport());
    }

    #[test]
    fn transport_errors_are_classified() {
        assert!(Error::transport("connection refused").is_transport());
        assert!(!Error::ChannelClosed.is_transport());
        assert!(!Error::NoRuntime {
            message: "none".to_string()
        }
        .is_transport());
    }

    #[test]
    fn url_parse_error_converts() {
        let e: Error = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(e, Error::UrlParse(_)));
        assert!(e.to_string().starts_with("URL parse error"));
    }
}
