//! Error taxonomy for the explorer core

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An aggregation was asked to summarize an empty (or too short) sample set
    #[error("not enough samples to summarize")]
    InsufficientData,

    /// Two adjacent cumulative samples share an end timestamp
    #[error("samples are not strictly increasing in time at {at}")]
    ZeroInterval { at: DateTime<Utc> },

    #[error("\"{field}\" is not a valid field. Possible values are:\n\n{}", .valid.join(", "))]
    UnknownField {
        field: String,
        valid: Vec<&'static str>,
    },

    #[error("invalid quantity {input:?}: {reason}")]
    InvalidQuantity { input: String, reason: &'static str },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("Failed to {context}")]
    Kube {
        context: String,
        #[source]
        source: kube::Error,
    },

    #[error("Failed to {context}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("time-series backend returned {status}: {body}")]
    BackendStatus { status: u16, body: String },

    #[error("malformed time-series response: {0}")]
    MalformedResponse(String),

    #[error("time-series query timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("collection pipeline failure: {0}")]
    Pipeline(String),
}

impl Error {
    /// Whether this error must abort the whole run.
    ///
    /// Per-job failures (a single query or reduction) are recovered by the
    /// pipeline; everything that prevents building a report at all is fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::InsufficientData
            | Error::ZeroInterval { .. }
            | Error::Http { .. }
            | Error::BackendStatus { .. }
            | Error::MalformedResponse(_)
            | Error::Timeout { .. } => false,
            Error::UnknownField { .. }
            | Error::InvalidQuantity { .. }
            | Error::Config(_)
            | Error::Kube { .. }
            | Error::Pipeline(_) => true,
        }
    }

    /// Whether retrying the same backend request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http { source, .. } => source.is_timeout() || source.is_connect(),
            Error::BackendStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
