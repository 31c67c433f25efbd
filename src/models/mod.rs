//! # Data Model
//!
//! Jobs, lanes and subscription tiers shared by every scheduling component.

pub mod job;
pub mod lane;
pub mod tier;

pub use job::{FailureRecord, Job, JobHandle, JobStatus, JobSubmission};
pub use lane::Lane;
pub use tier::{SubscriptionTier, PRIORITY_MAXIMUM, PRIORITY_PREMIUM, PRIORITY_STANDARD};
