use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Longest response body carried by an error, in bytes.
pub const MAX_DIAGNOSTIC_BODY: usize = 1024;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unexpected HTTP status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },

    #[error("Could not decode response: {body}")]
    ResponseDecode { body: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn decode(body: &str) -> Self {
        Error::ResponseDecode {
            body: truncate_body(body).to_string(),
        }
    }

    pub(crate) fn status(status: StatusCode, body: &str) -> Self {
        Error::HttpStatus {
            status,
            body: truncate_body(body).to_string(),
        }
    }
}

/// Cut `body` to at most [`MAX_DIAGNOSTIC_BODY`] bytes without splitting a char.
pub fn truncate_body(body: &str) -> &str {
    if body.len() <= MAX_DIAGNOSTIC_BODY {
        return body;
    }
    let mut end = MAX_DIAGNOSTIC_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
