//! bandstand - storage and delegation gateway for the band site
//!
//! A small JSON-over-HTTP service that sits behind the band's website and
//! handles uploads, storage spaces and capability delegations.
//!
//! ## Services
//!
//! - **Spaces**: create, list, switch and verify storage spaces per account
//! - **Delegations**: issue signed, time-bounded grants on a space and install
//!   grants received from others
//! - **Uploads**: store files plus a `metadata.json` companion as one
//!   content-addressed directory
//! - **Probing**: existence checks against an allow-list of IPFS gateways

pub mod capability;
pub mod config;
pub mod local;
pub mod routes;
pub mod server;
pub mod services;
pub mod session;
pub mod types;

pub use config::Args;
pub use server::{dispatch, run, AppState};
pub use types::{GatewayError, Result};
