//! Client error types.
//!
//! Wire errors are deliberately flat: an unexpected status carries the
//! numeric code (and, for control operations, the status text), and body
//! decode failures surface the JSON error unchanged.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors returned by the wire client and its factory.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("https scheme not supported since certificates aren't provided")]
    HttpsNotSupported,

    #[error("https scheme is required but none of the addresses support it")]
    HttpsRequired,

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("missing route parameter: {0}")]
    MissingParam(String),

    #[error("unexpected status code: {0}")]
    UnexpectedStatus(u16),

    #[error("http error: status code {code} ({text})")]
    HttpStatus { code: u16, text: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] hyper::Error),

    #[error(transparent)]
    Request(#[from] http::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("https requested but no TLS configuration is available")]
    TlsUnavailable,

    #[error("tls configuration error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),
}

pub type ClientResult<T> = Result<T, ClientError>;
