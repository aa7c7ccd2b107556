//! Shared types for bandstand

pub mod error;

pub use error::{GatewayError, Result};
