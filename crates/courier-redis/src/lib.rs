//! # Courier Redis
//!
//! Low-level Redis client used by the email delivery pipeline.
//!
//! - **No business logic** - Pure infrastructure layer
//! - **No dependencies** on other courier-* crates
//!
//! Covers the handful of commands the pipeline needs: conditional SET with
//! millisecond expiry and compare-and-delete scripts for the token lock, and
//! consumer-group stream commands for the delivery log.
//!
//! ```rust,no_run
//! use courier_redis::RedisClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = RedisClient::connect("redis://localhost:6379").await?;
//!
//!     let acquired = client.set_nx_px("lock:key", "token", 120_000).await?;
//!     assert!(acquired);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod streams;

pub use client::RedisClient;
pub use streams::{StreamEntry, StreamReadOptions};

pub use redis::RedisError;

/// Result type for Redis operations
pub type Result<T> = std::result::Result<T, RedisError>;
