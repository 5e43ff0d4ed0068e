//! One-time key pairs over secp256k1.
//!
//! The wallet service issues a fresh key pair for every trade guid and only
//! ever hands out the public half. A party that receives an
//! [`AccessGrant`](crate::grant::AccessGrant) holds the secret half of the
//! one-time key the grant was wrapped for.

use super::CryptoError;
use crate::infrastructure::encoding;

use k256::{
    ecdh::{diffie_hellman, SharedSecret},
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey, SecretKey,
};
use rand::{CryptoRng, RngCore};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::{fmt, str::FromStr};

/// The public half of a one-time key, as issued by the wallet service.
#[derive(Clone, PartialEq, Eq)]
pub struct OneTimePublicKey(PublicKey);

impl OneTimePublicKey {
    /// Length of the SEC1 compressed encoding.
    pub const COMPRESSED_LEN: usize = 33;

    /// Parse a SEC1 encoded point, compressed or uncompressed.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        PublicKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// SEC1 compressed encoding of the key.
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        self.0.to_encoded_point(true).as_bytes().to_vec()
    }

    /// The `0x`-prefixed account address of this key: the last 20 bytes of
    /// the Keccak-256 hash of the uncompressed point.
    pub fn address(&self) -> String {
        let uncompressed = self.0.to_encoded_point(false);
        // Skip the 0x04 SEC1 tag.
        let digest = Keccak256::digest(&uncompressed.as_bytes()[1..]);
        encoding::to_prefixed_hex(&digest[12..])
    }

    #[cfg(test)]
    pub(super) fn as_inner(&self) -> &PublicKey {
        &self.0
    }
}

impl From<PublicKey> for OneTimePublicKey {
    fn from(key: PublicKey) -> Self {
        Self(key)
    }
}

impl fmt::Debug for OneTimePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OneTimePublicKey({self})")
    }
}

impl fmt::Display for OneTimePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encoding::to_prefixed_hex(self.to_sec1_bytes()))
    }
}

impl FromStr for OneTimePublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = encoding::from_prefixed_hex(s).map_err(|_| CryptoError::InvalidPublicKey)?;
        Self::from_sec1_bytes(&bytes)
    }
}

impl Serialize for OneTimePublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OneTimePublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(de::Error::custom)
    }
}

/// The secret half of a one-time key. Zeroized on drop.
#[derive(Clone)]
pub struct OneTimeSecretKey(SecretKey);

impl fmt::Debug for OneTimeSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneTimeSecretKey")
            .field("public_key", &self.public_key())
            .field("secret", &"REDACTED")
            .finish()
    }
}

impl OneTimeSecretKey {
    /// Generate a fresh one-time key. In production the wallet service does
    /// this; local generation is used by recipients that custody their own
    /// keys and by tests.
    pub fn generate(rng: &mut (impl CryptoRng + RngCore)) -> Self {
        Self(SecretKey::random(rng))
    }

    /// Parse a 32-byte big-endian scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        SecretKey::from_slice(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidSecretKey)
    }

    pub fn public_key(&self) -> OneTimePublicKey {
        OneTimePublicKey(self.0.public_key())
    }

    /// Elliptic-curve Diffie-Hellman against `peer`.
    pub(super) fn diffie_hellman(&self, peer: &OneTimePublicKey) -> SharedSecret {
        diffie_hellman(self.0.to_nonzero_scalar(), peer.0.as_affine())
    }
}
