//! Request workflows built on the capability provider

pub mod consumer;
pub mod issuer;
pub mod probe;
pub mod upload;
pub mod verify;

pub use consumer::{apply_delegation, AppliedDelegation};
pub use issuer::{issue_delegation, DelegationRequest};
pub use probe::GatewayProbe;
pub use upload::{upload, UploadOutcome, UploadRequest};
pub use verify::{verify, Verification};
