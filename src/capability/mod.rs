//! Capability primitives: abilities, DIDs, delegations and their archives,
//! plus the provider trait that the rest of the service talks to.

pub mod ability;
pub mod archive;
pub mod delegation;
pub mod did;
pub mod provider;

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};

pub use ability::Ability;
pub use delegation::{Delegation, DelegationError, DelegationPayload};
pub use did::Did;
pub use provider::{CapabilityProvider, IssuedDelegation, SignedGrant, SpaceInfo, UploadFile};

/// Multicodec for raw bytes
pub const RAW: u64 = 0x55;

/// Multicodec for DAG-CBOR
pub const DAG_CBOR: u64 = 0x71;

/// CIDv1 (sha2-256) of `bytes` under `codec`
pub fn content_id(codec: u64, bytes: &[u8]) -> Cid {
    let hash = Code::Sha2_256.digest(bytes);
    Cid::new_v1(codec, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_is_stable() {
        let a = content_id(RAW, b"Hello, band!");
        let b = content_id(RAW, b"Hello, band!");
        assert_eq!(a, b);
        assert_eq!(a.codec(), RAW);
        assert!(a.to_string().starts_with("bafkrei"));
        assert_ne!(a, content_id(DAG_CBOR, b"Hello, band!"));
    }
}
