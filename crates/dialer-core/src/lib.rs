//! voxdial Dialer Core Library
//!
//! The outbound half of the system: a three-structure job queue (priority
//! stack, per-tenant FIFO lanes, a time-ordered retry set), calling-rule
//! enforcement (time windows, weekday masks, concurrency, cooldown), the
//! bounded call-outcome taxonomy with its retry policy, and the worker
//! loop that turns queued jobs into placed calls.
//!
//! The worker talks to persistence and telephony through the [`DialerStore`]
//! and [`OutboundDialer`] traits so the queue mechanics stay testable
//! without a database or a carrier.

pub mod error;
pub mod job;
pub mod model;
pub mod outcome;
pub mod queue;
pub mod rules;
pub mod worker;

pub use error::{DialerError, DialerResult};
pub use job::{DialerJob, JobStatus};
pub use model::{Campaign, CampaignStatus, Lead, LeadStatus};
pub use outcome::{should_retry, CallOutcome};
pub use queue::DialerQueue;
pub use rules::{ActiveCallTracker, CallingRules, SkipReason};
pub use worker::{DialerStore, DialerWorker, OutboundDialer, WorkerConfig};
