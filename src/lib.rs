#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Docflow Core
//!
//! Tiered job scheduling and fault recovery for asynchronous document
//! conversion.
//!
//! ## Overview
//!
//! Submitted conversion jobs are classified into one of three lanes
//! (premium, normal, large-file) by subscription tier and payload size, and
//! given a dequeue priority. Pools of execution slots pull jobs per lane and
//! hand them to an opaque external processor. A recovery manager tracks which
//! worker owns which job, detects dead workers and stalled jobs, and drives
//! retry-with-backoff or permanent-failure decisions behind a circuit breaker.
//!
//! Delivery is at-least-once with idempotent completion.
//!
//! ## Module Organization
//!
//! - [`models`] - jobs, lanes and subscription tiers
//! - [`queue`] - durable queue seam and the priority queue router
//! - [`worker`] - execution slots, worker pool and telemetry
//! - [`recovery`] - failure recovery manager, backoff and recovery events
//! - [`coordinator`] - binds recovery events to persistence, notifications and the router
//! - [`resilience`] - circuit breaker
//! - [`services`] - persistence, notification and worker lifecycle collaborators
//! - [`config`] - layered configuration
//! - [`bootstrap`] - wires everything into a running [`SchedulingSystem`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docflow_core::bootstrap::{Collaborators, SchedulingSystem};
//! use docflow_core::config::ConfigManager;
//! use docflow_core::models::JobSubmission;
//! use docflow_core::queue::InMemoryQueue;
//! use docflow_core::services::{BroadcastNotifier, InMemoryJobStore};
//! use docflow_core::worker::JobProcessor;
//! use std::sync::Arc;
//!
//! # async fn example(processor: Arc<dyn JobProcessor>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//! let collaborators = Collaborators {
//!     queue: Arc::new(InMemoryQueue::new()),
//!     processor,
//!     store: Arc::new(InMemoryJobStore::new()),
//!     notifier: Arc::new(BroadcastNotifier::default()),
//! };
//!
//! let (system, report) = SchedulingSystem::start(&config, collaborators).await?;
//! println!("recovered {} jobs", report.requeued);
//!
//! let handle = system
//!     .submit(JobSubmission::new("user-42", "uploads/contract.pdf", "pro", 120_000))
//!     .await?;
//! println!("job {} queued in {} lane", handle.job_id, handle.lane);
//!
//! system.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod models;
pub mod queue;
pub mod recovery;
pub mod resilience;
pub mod services;
pub mod worker;

pub use bootstrap::{Collaborators, SchedulingSystem, SystemStatus};
pub use config::{ConfigManager, DocflowConfig};
pub use coordinator::RecoveryCoordinator;
pub use error::{DocflowError, Result};
pub use models::{Job, JobHandle, JobStatus, JobSubmission, Lane, SubscriptionTier};
pub use queue::{DurableQueue, InMemoryQueue, PriorityQueueRouter};
pub use recovery::{FailureRecoveryManager, RecoveryEvent, RecoveryReport, RecoveryStats};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use worker::{JobProcessor, ProcessingError, WorkerPool};
