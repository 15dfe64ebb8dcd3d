//! Error types for the dialer engine

use thiserror::Error;

/// Result type for dialer operations
pub type DialerResult<T> = Result<T, DialerError>;

/// Errors produced by the dialer layer
#[derive(Debug, Error)]
pub enum DialerError {
    /// Job referenced by an operation is not where the caller expected it
    #[error("job {job_id} not found in {place}")]
    JobNotFound {
        /// Job identifier
        job_id: String,
        /// Which structure was searched
        place: &'static str,
    },

    /// Campaign or lead lookup failed in the store
    #[error("store error: {0}")]
    Store(String),

    /// Telephony provider refused or failed to place the call
    #[error("telephony error: {0}")]
    Telephony(String),

    /// Calling rules reference an unknown timezone
    #[error("invalid timezone {tz}")]
    InvalidTimezone {
        /// The unparsable timezone name
        tz: String,
    },

    /// Worker halted after too many consecutive loop errors
    #[error("worker halted after {count} consecutive errors")]
    TooManyErrors {
        /// Consecutive error count at halt
        count: u32,
    },

    /// Worker halted because the store stayed unreachable past its limit
    #[error("store unreachable for {seconds} s; giving up")]
    StoreUnreachable {
        /// How long the store had been unreachable at halt
        seconds: u64,
    },
}
