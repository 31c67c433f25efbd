//! # Resilience Module
//!
//! Fault tolerance for the scheduling core. The circuit breaker guards the
//! retry requeue path so that a systemically failing destination turns retries
//! into fast permanent failures instead of an ever-growing delay backlog.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docflow_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 3,
//!     timeout: Duration::from_secs(1),
//!     monitoring_window: Duration::from_secs(60),
//!     failure_rate_threshold: 0.5,
//! };
//!
//! let breaker = CircuitBreaker::new("requeue", config);
//!
//! let result = breaker
//!     .call(|| async { Ok::<&str, std::io::Error>("requeued") })
//!     .await?;
//! println!("{result} ({})", breaker.state().as_str());
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::CircuitBreakerConfig;
pub use metrics::CircuitBreakerMetrics;
