//! Wrapping of [`GroupKey`]s for a recipient's one-time public key.
//!
//! A fresh ephemeral secp256k1 key is combined with the recipient's one-time
//! public key by ECDH. The shared secret is expanded with HKDF-SHA3-256 into a
//! key-wrapping key, and the group key is encrypted under it with
//! ChaCha20-Poly1305. Only the holder of the matching one-time secret key can
//! recompute the wrapping key.

use super::{
    generic::{AssociatedData, EncryptionKey, KEY_LEN},
    CryptoError, Encrypted, GroupKey, KeyId, OneTimePublicKey, OneTimeSecretKey,
};
use crate::{infrastructure::encoding, types::Guid};

use hkdf::Hkdf;
use k256::ecdh::SharedSecret;
use rand::{CryptoRng, RngCore};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha3::Sha3_256;
use std::fmt;
use zeroize::Zeroize;

/// Everything a wrapped key is bound to besides the recipient's public key.
/// Both sides must agree on every field or unwrapping fails.
#[derive(Debug, Clone, Copy)]
pub struct WrapContext<'a> {
    pub guid: &'a Guid,
    pub group_name: &'a str,
    pub key_id: &'a KeyId,
    pub grantee_address: &'a str,
}

impl WrapContext<'_> {
    fn associated_data(&self, recipient: &OneTimePublicKey) -> AssociatedData {
        AssociatedData::new()
            .with_str("ind group key wrap")
            .with_str(self.guid.as_str())
            .with_str(self.group_name)
            .with_str(self.key_id.as_str())
            .with_str(self.grantee_address)
            .with_bytes(recipient.to_sec1_bytes())
    }
}

/// A [`GroupKey`] encrypted for exactly one one-time public key.
///
/// Serialized as `ephemeral_public_key || nonce || tag || ciphertext`.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKey {
    ephemeral_public_key: OneTimePublicKey,
    encrypted_key: Encrypted<GroupKey>,
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedKey")
            .field("ephemeral_public_key", &self.ephemeral_public_key)
            .field("encrypted_key", &self.encrypted_key)
            .finish()
    }
}

/// Derive the key-wrapping key from an ECDH shared secret. Both public keys
/// salt the derivation so that the wrapping key is unique to this pairing.
fn derive_wrapping_key(
    shared_secret: &SharedSecret,
    ephemeral_public_key: &OneTimePublicKey,
    recipient: &OneTimePublicKey,
) -> Result<EncryptionKey, CryptoError> {
    let mut salt = ephemeral_public_key.to_sec1_bytes();
    salt.extend(recipient.to_sec1_bytes());

    let hkdf = Hkdf::<Sha3_256>::new(Some(&salt), shared_secret.raw_secret_bytes().as_slice());
    let mut okm = [0u8; KEY_LEN];
    hkdf.expand(b"ind key wrapping key", &mut okm)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;

    let key = EncryptionKey::from_bytes(&okm);
    okm.zeroize();
    key
}

impl WrappedKey {
    /// Wrap `key` so that only the holder of the secret key behind
    /// `recipient` can recover it, in the given `context`.
    pub fn wrap(
        rng: &mut (impl CryptoRng + RngCore),
        key: &GroupKey,
        recipient: &OneTimePublicKey,
        context: &WrapContext<'_>,
    ) -> Result<Self, CryptoError> {
        let ephemeral = OneTimeSecretKey::generate(rng);
        let ephemeral_public_key = ephemeral.public_key();
        let shared_secret = ephemeral.diffie_hellman(recipient);
        let wrapping_key = derive_wrapping_key(&shared_secret, &ephemeral_public_key, recipient)?;

        let encrypted_key = Encrypted::encrypt(
            rng,
            &wrapping_key,
            key.clone(),
            &context.associated_data(recipient),
        )?;

        Ok(Self {
            ephemeral_public_key,
            encrypted_key,
        })
    }

    /// Recover the wrapped key with the recipient's one-time secret key.
    ///
    /// Fails with [`CryptoError::DecryptionFailed`] if the key was wrapped
    /// for someone else or if any part of `context` differs.
    pub fn unwrap(
        &self,
        recipient: &OneTimeSecretKey,
        context: &WrapContext<'_>,
    ) -> Result<GroupKey, CryptoError> {
        let recipient_public_key = recipient.public_key();
        let shared_secret = recipient.diffie_hellman(&self.ephemeral_public_key);
        let wrapping_key = derive_wrapping_key(
            &shared_secret,
            &self.ephemeral_public_key,
            &recipient_public_key,
        )?;

        self.encrypted_key
            .decrypt(&wrapping_key, &context.associated_data(&recipient_public_key))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.ephemeral_public_key.to_sec1_bytes();
        bytes.extend(self.encrypted_key.to_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < OneTimePublicKey::COMPRESSED_LEN {
            return Err(CryptoError::ConversionError);
        }
        let (public_key, encrypted_key) = bytes.split_at(OneTimePublicKey::COMPRESSED_LEN);
        Ok(Self {
            ephemeral_public_key: OneTimePublicKey::from_sec1_bytes(public_key)?,
            encrypted_key: Encrypted::from_bytes(encrypted_key)?,
        })
    }

    #[cfg(test)]
    pub(crate) fn tamper(&mut self) {
        self.encrypted_key.tamper(0);
    }
}

impl Serialize for WrappedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encoding::to_prefixed_hex(self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for WrappedKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex_string = String::deserialize(deserializer)?;
        let bytes = encoding::from_prefixed_hex(&hex_string).map_err(de::Error::custom)?;
        Self::from_bytes(&bytes).map_err(de::Error::custom)
    }
}
