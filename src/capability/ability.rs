//! Abilities that may be delegated on a space
//!
//! The set is fixed. Anything outside it is rejected before signing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::types::{GatewayError, Result};

/// A single capability tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Ability {
    SpaceInfo,
    SpaceBlobAdd,
    SpaceIndexAdd,
    SpaceIndexList,
    UploadAdd,
    UploadList,
    UploadRemove,
    FilecoinOffer,
    FilecoinList,
    FilecoinInfo,
}

impl Ability {
    /// Every valid ability, in canonical order
    pub const ALL: [Ability; 10] = [
        Ability::SpaceInfo,
        Ability::SpaceBlobAdd,
        Ability::SpaceIndexAdd,
        Ability::SpaceIndexList,
        Ability::UploadAdd,
        Ability::UploadList,
        Ability::UploadRemove,
        Ability::FilecoinOffer,
        Ability::FilecoinList,
        Ability::FilecoinInfo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ability::SpaceInfo => "space/info",
            Ability::SpaceBlobAdd => "space/blob/add",
            Ability::SpaceIndexAdd => "space/index/add",
            Ability::SpaceIndexList => "space/index/list",
            Ability::UploadAdd => "upload/add",
            Ability::UploadList => "upload/list",
            Ability::UploadRemove => "upload/remove",
            Ability::FilecoinOffer => "filecoin/offer",
            Ability::FilecoinList => "filecoin/list",
            Ability::FilecoinInfo => "filecoin/info",
        }
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ability {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ability::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl Serialize for Ability {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Ability {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|bad| serde::de::Error::custom(format!("unknown ability: {}", bad)))
    }
}

/// Parse a caller-supplied ability list.
///
/// Fails with a Validation error when the list is empty or when any entry is
/// outside the fixed set. The message names every invalid entry, in the order
/// given. Duplicates are collapsed.
pub fn parse_abilities<S: AsRef<str>>(requested: &[S]) -> Result<Vec<Ability>> {
    if requested.is_empty() {
        return Err(GatewayError::Validation(
            "abilities must be a non-empty array".to_string(),
        ));
    }

    let mut valid = Vec::with_capacity(requested.len());
    let mut invalid = Vec::new();

    for raw in requested {
        match raw.as_ref().parse::<Ability>() {
            Ok(ability) => {
                if !valid.contains(&ability) {
                    valid.push(ability);
                }
            }
            Err(bad) => invalid.push(bad),
        }
    }

    if !invalid.is_empty() {
        return Err(GatewayError::Validation(format!(
            "Invalid abilities: {}. Valid abilities are: {}",
            invalid.join(", "),
            Ability::ALL
                .iter()
                .map(Ability::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    Ok(valid)
}

/// True when every ability in `requested` is also in `granted`
pub fn covers(granted: &[Ability], requested: &[Ability]) -> bool {
    requested.iter().all(|a| granted.contains(a))
}
