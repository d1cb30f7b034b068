//! Peerlink Common - Shared utilities for the Peerlink crates
//!
//! This crate provides:
//! - Configuration validation chains and validators
//! - Retry policies for transient network operations
//! - Host/port helpers
//! - Tracing subscriber initialization

pub mod error;
pub mod logging;
pub mod retry;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use error::{BoxError, ValidationError};
pub use retry::Retrier;
pub use utils::{join_host_port, local_ip, split_host_port};
pub use validation::{ValidationChain, Validator};
