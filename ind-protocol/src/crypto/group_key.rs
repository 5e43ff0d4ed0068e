//! This defines [`GroupKey`], the symmetric key protecting one field group of
//! a trade record, and the per-field encryption performed under it.

use super::{
    generic::{AssociatedData, EncryptionKey, KEY_LEN},
    CryptoError, Encrypted,
};
use crate::types::Guid;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Identifier of a [`GroupKey`]. A key id is unique within the scope of one
/// trade guid; it is never global.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// The `index`-th key of a trade, counting from 1: `k1`, `k2`, ...
    pub fn sequential(index: usize) -> Self {
        Self(format!("k{index}"))
    }

    /// An id derived from the key material itself: `k` followed by the first
    /// 8 bytes of a domain separated SHA3-256 digest of the key. Callers that
    /// only hold some of a trade's keys get the same id for a key no matter
    /// which other keys they list with it.
    pub fn fingerprint(key: &GroupKey) -> Self {
        let digest = Sha3_256::new()
            .chain_update(b"ind group key fingerprint")
            .chain_update(key.0.as_bytes())
            .finalize();
        Self(format!("k{}", hex::encode(&digest[..8])))
    }

    /// The index of a [sequential](KeyId::sequential) id.
    pub fn index(&self) -> Option<usize> {
        self.0.strip_prefix('k')?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for KeyId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for KeyId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A default-length symmetric encryption key for an AEAD scheme, used to
/// encrypt every field of one field group.
///
/// Group keys never leave the process in plaintext: they are either held in a
/// [`KeyStore`](crate::key_store::KeyStore) or wrapped for a grantee. The key
/// material is zeroized on drop.
///
/// Note: we don't implement the Copy trait, to avoid leaving stray copies of
/// the key in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct GroupKey(pub(super) EncryptionKey);

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupKey {}", GroupKey::REDACTED_INFO)
    }
}

impl GroupKey {
    const REDACTED_INFO: &'static str = "REDACTED";

    fn domain_separator() -> &'static str {
        "ind field group key"
    }

    /// Generate a new 32-byte [`GroupKey`].
    pub fn generate(rng: &mut (impl CryptoRng + RngCore)) -> Self {
        Self(EncryptionKey::new(rng))
    }

    /// Use caller-provided key material, e.g. a key decoded from a data
    /// endpoint request.
    pub fn from_bytes(key_material: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self(EncryptionKey::from_bytes(key_material)?))
    }

    fn field_context(guid: &Guid, key_id: &KeyId, field_name: &str) -> AssociatedData {
        AssociatedData::new()
            .with_str(Self::domain_separator())
            .with_str(guid.as_str())
            .with_str(key_id.as_str())
            .with_str(field_name)
    }

    /// Encrypt one field value under this key.
    ///
    /// The ciphertext is bound to `guid`, `key_id` and `field_name`, so it
    /// does not decrypt if moved to another field, listed under another key
    /// id or replayed into another trade.
    pub fn encrypt_field(
        &self,
        rng: &mut (impl CryptoRng + RngCore),
        guid: &Guid,
        key_id: &KeyId,
        field_name: &str,
        value: &str,
    ) -> Result<Encrypted<FieldValue>, CryptoError> {
        let context = Self::field_context(guid, key_id, field_name);
        Encrypted::encrypt(rng, &self.0, FieldValue(value.to_string()), &context)
    }
}

impl Encrypted<FieldValue> {
    /// Decrypt a field value encrypted by [`GroupKey::encrypt_field`].
    pub fn decrypt_field(
        &self,
        key: &GroupKey,
        guid: &Guid,
        key_id: &KeyId,
        field_name: &str,
    ) -> Result<String, CryptoError> {
        let context = GroupKey::field_context(guid, key_id, field_name);
        let mut value = self.decrypt(&key.0, &context)?;
        Ok(std::mem::take(&mut value.0))
    }
}

impl From<GroupKey> for Vec<u8> {
    fn from(key: GroupKey) -> Self {
        GroupKey::domain_separator()
            .as_bytes()
            .iter()
            .chain(key.0.as_bytes())
            .copied()
            .collect()
    }
}

impl TryFrom<Vec<u8>> for GroupKey {
    type Error = CryptoError;

    fn try_from(mut bytes: Vec<u8>) -> Result<Self, Self::Error> {
        let expected_domain_sep = GroupKey::domain_separator().as_bytes();
        let split = expected_domain_sep.len();
        let result = match (bytes.get(..split), bytes.get(split..)) {
            (Some(domain_separator), Some(key_bytes))
                if domain_separator == expected_domain_sep && key_bytes.len() == KEY_LEN =>
            {
                GroupKey::from_bytes(key_bytes)
            }
            _ => Err(CryptoError::ConversionError),
        };
        bytes.zeroize();
        result
    }
}

/// The plaintext of one trade record field, stable UTF-8 encoded.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct FieldValue(String);

impl From<FieldValue> for Vec<u8> {
    fn from(value: FieldValue) -> Self {
        value.0.as_bytes().to_vec()
    }
}

impl TryFrom<Vec<u8>> for FieldValue {
    type Error = CryptoError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        String::from_utf8(bytes)
            .map(FieldValue)
            .map_err(|_| CryptoError::ConversionError)
    }
}
