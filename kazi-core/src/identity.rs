//! Identity types for KAZI resources

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Resource identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Identifier of the acting principal that owns a resource row.
///
/// Every mutation is filtered by this id in addition to the record id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(transparent)]
pub struct OwnerId(Uuid);

impl OwnerId {
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Fresh random principal, mostly useful in tests and fixtures.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for OwnerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<OwnerId> for Uuid {
    fn from(owner: OwnerId) -> Self {
        owner.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OwnerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Hex-encoded SHA-256 digest of a secret (API keys, release passwords).
pub fn digest_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a plaintext secret against a stored digest without short-circuiting
/// on the first differing byte.
pub fn verify_secret(secret: &str, expected_digest: &str) -> bool {
    let actual = digest_secret(secret);
    if actual.len() != expected_digest.len() {
        return false;
    }
    actual
        .bytes()
        .zip(expected_digest.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_id_is_v7() {
        let id = new_entity_id();
        assert_eq!(id.get_version_num(), 7);
        assert_ne!(id, new_entity_id());
    }

    #[test]
    fn test_owner_id_parses_and_displays() {
        let raw = Uuid::now_v7();
        let owner: OwnerId = raw.to_string().parse().expect("valid uuid");
        assert_eq!(owner.as_uuid(), raw);
        assert_eq!(owner.to_string(), raw.to_string());
    }

    #[test]
    fn test_owner_id_serializes_transparently() {
        let owner = OwnerId::generate();
        let json = serde_json::to_value(owner).expect("serialize");
        assert_eq!(json, serde_json::Value::String(owner.to_string()));
    }

    #[test]
    fn test_digest_secret_is_stable_hex() {
        let digest = digest_secret("open-sesame");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, digest_secret("open-sesame"));
        assert_ne!(digest, digest_secret("open-sesame!"));
    }

    #[test]
    fn test_verify_secret() {
        let digest = digest_secret("hunter2");
        assert!(verify_secret("hunter2", &digest));
        assert!(!verify_secret("hunter3", &digest));
        assert!(!verify_secret("hunter2", "short"));
    }
}
