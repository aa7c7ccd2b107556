//! Transport archive for delegations
//!
//! An archive is a DAG-CBOR document holding a root CID and the blocks needed
//! to verify it (the delegation itself plus its proofs). Every block is
//! checked against its CID on extraction, so a delegation can travel through
//! untrusted channels (base64 over JSON) without losing integrity.

use cid::Cid;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use std::collections::HashMap;
use std::str::FromStr;

use super::content_id;
use super::delegation::{Delegation, DelegationError};

pub const ARCHIVE_VERSION: u64 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ArchiveEnvelope {
    version: u64,
    roots: Vec<String>,
    blocks: Vec<Block>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Block {
    cid: String,
    bytes: ByteBuf,
}

/// A delegation pulled out of an archive together with its proofs
#[derive(Debug, Clone)]
pub struct Extracted {
    pub id: Cid,
    pub delegation: Delegation,
    pub proofs: Vec<Delegation>,
}

/// Serialize a delegation and its proofs into one archive
pub fn pack(delegation: &Delegation, proofs: &[Delegation]) -> Result<(Cid, Vec<u8>), DelegationError> {
    let root_bytes = delegation.encode()?;
    let root = content_id(super::DAG_CBOR, &root_bytes);

    let mut blocks = vec![Block {
        cid: root.to_string(),
        bytes: ByteBuf::from(root_bytes),
    }];
    for proof in proofs {
        let bytes = proof.encode()?;
        blocks.push(Block {
            cid: content_id(super::DAG_CBOR, &bytes).to_string(),
            bytes: ByteBuf::from(bytes),
        });
    }

    let envelope = ArchiveEnvelope {
        version: ARCHIVE_VERSION,
        roots: vec![root.to_string()],
        blocks,
    };
    let bytes = serde_ipld_dagcbor::to_vec(&envelope)
        .map_err(|e| DelegationError::Encode(e.to_string()))?;
    Ok((root, bytes))
}

/// Decode an archive, check block integrity and resolve the root's proofs.
///
/// Signatures and the authority chain are not checked here; see
/// [`Delegation::verify_chain`].
pub fn extract(bytes: &[u8]) -> Result<Extracted, DelegationError> {
    let envelope: ArchiveEnvelope = serde_ipld_dagcbor::from_slice(bytes)
        .map_err(|e| DelegationError::Decode(format!("not a delegation archive: {}", e)))?;

    if envelope.version != ARCHIVE_VERSION {
        return Err(DelegationError::Decode(format!(
            "unsupported archive version {}",
            envelope.version
        )));
    }

    let root = match envelope.roots.as_slice() {
        [root] => parse_cid(root)?,
        _ => {
            return Err(DelegationError::Decode(format!(
                "expected exactly one root, found {}",
                envelope.roots.len()
            )))
        }
    };

    let mut blocks: HashMap<Cid, ByteBuf> = HashMap::with_capacity(envelope.blocks.len());
    for block in envelope.blocks {
        let cid = parse_cid(&block.cid)?;
        let computed = content_id(cid.codec(), &block.bytes);
        if computed != cid {
            return Err(DelegationError::Decode(format!(
                "block {} does not match its content (got {})",
                cid, computed
            )));
        }
        blocks.insert(cid, block.bytes);
    }

    let root_bytes = blocks
        .get(&root)
        .ok_or_else(|| DelegationError::Decode(format!("root block {} missing", root)))?;
    let delegation = Delegation::decode(root_bytes)?;

    let mut proofs = Vec::with_capacity(delegation.payload.proofs.len());
    for proof_cid in &delegation.payload.proofs {
        let cid = parse_cid(proof_cid)?;
        let proof_bytes = blocks
            .get(&cid)
            .ok_or_else(|| DelegationError::Decode(format!("proof block {} missing", cid)))?;
        proofs.push(Delegation::decode(proof_bytes)?);
    }

    Ok(Extracted {
        id: root,
        delegation,
        proofs,
    })
}

fn parse_cid(s: &str) -> Result<Cid, DelegationError> {
    Cid::from_str(s).map_err(|e| DelegationError::Decode(format!("invalid CID {}: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ability::Ability;
    use crate::capability::delegation::DelegationPayload;
    use crate::capability::did::Did;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn signed_pair() -> (Delegation, Delegation) {
        let space_key = SigningKey::generate(&mut OsRng);
        let agent_key = SigningKey::generate(&mut OsRng);
        let space = Did::from_verifying_key(&space_key.verifying_key());
        let agent = Did::from_verifying_key(&agent_key.verifying_key());

        let owner = Delegation::sign(
            DelegationPayload::new(space.clone(), agent.clone(), space.clone(), Ability::ALL.to_vec(), None),
            &space_key,
        )
        .unwrap();
        let issued = Delegation::sign(
            DelegationPayload::new(agent.clone(), agent, space, vec![Ability::UploadList], Some(4_000_000_000))
                .with_proof(&owner.cid().unwrap()),
            &agent_key,
        )
        .unwrap();
        (issued, owner)
    }

    #[test]
    fn test_pack_and_extract() {
        let (issued, owner) = signed_pair();
        let (id, bytes) = pack(&issued, std::slice::from_ref(&owner)).unwrap();

        let extracted = extract(&bytes).unwrap();
        assert_eq!(extracted.id, id);
        assert_eq!(extracted.id, issued.cid().unwrap());
        assert_eq!(extracted.delegation, issued);
        assert_eq!(extracted.proofs, vec![owner]);
    }

    #[test]
    fn test_extract_rejects_garbage() {
        assert!(matches!(
            extract(b"definitely not cbor"),
            Err(DelegationError::Decode(_))
        ));
    }

    #[test]
    fn test_extract_rejects_missing_proof() {
        let (issued, _) = signed_pair();
        let (_, bytes) = pack(&issued, &[]).unwrap();
        let err = extract(&bytes).unwrap_err();
        assert!(err.to_string().contains("proof block"));
    }

    #[test]
    fn test_extract_rejects_tampered_block() {
        let (issued, owner) = signed_pair();
        let (_, bytes) = pack(&issued, &[owner]).unwrap();

        let mut envelope: ArchiveEnvelope = serde_ipld_dagcbor::from_slice(&bytes).unwrap();
        let last = envelope.blocks[1].bytes.len() - 1;
        envelope.blocks[1].bytes[last] ^= 0xff;
        let tampered = serde_ipld_dagcbor::to_vec(&envelope).unwrap();

        let err = extract(&tampered).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }
}
