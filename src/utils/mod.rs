//! The `utils` module provides shared definitions used across the `courier`
//! crate.
//!
//! It centralizes the error taxonomy used by the delivery pipeline and the
//! logging bootstrap used by the agent binary and by tests.

pub mod error;
pub mod logging;

pub use error::{ClientError, HandlerError, StorageError, TransportError};

#[cfg(test)]
mod tests;
