//! Local capability provider: agent key, registry and blob store on disk

pub mod agent;
pub mod blob_store;
pub mod provider;
pub mod registry;

pub use agent::Agent;
pub use blob_store::BlobStore;
pub use provider::LocalProvider;
pub use registry::Registry;
