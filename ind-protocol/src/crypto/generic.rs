use chacha20poly1305::{aead::AeadInPlace, AeadCore, ChaCha20Poly1305, KeyInit};
use rand::{CryptoRng, RngCore};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{convert::Infallible, fmt, marker::PhantomData};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::infrastructure::encoding;

/// Length in bytes of every symmetric key in the protocol.
pub(super) const KEY_LEN: usize = 32;
pub(super) const NONCE_LEN: usize = 12;
pub(super) const TAG_LEN: usize = 16;

/// Errors that arise in the cryptography module.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Key derivation failed")]
    KeyDerivationFailed,
    #[error("Conversion error")]
    ConversionError,
    #[error("Invalid encryption key")]
    InvalidEncryptionKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid secret key")]
    InvalidSecretKey,
}

impl From<Infallible> for CryptoError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// The associated data used in [`Encrypted`] AEAD ciphertexts and
/// key derivations.
///
/// Every component is length-prefixed, so `("ab", "c")` and `("a", "bc")`
/// authenticate differently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct AssociatedData(Vec<u8>);

impl Default for AssociatedData {
    fn default() -> Self {
        Self(b"ind-protocol v1.".to_vec())
    }
}

impl<'a> From<&'a AssociatedData> for &'a [u8] {
    fn from(associated_data: &'a AssociatedData) -> Self {
        associated_data.0.as_ref()
    }
}

impl AssociatedData {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn with_str(self, ad: &str) -> Self {
        self.with_bytes(ad.as_bytes())
    }

    pub(super) fn with_bytes(mut self, ad: impl AsRef<[u8]>) -> Self {
        let ad = ad.as_ref();
        self.0.extend_from_slice(&(ad.len() as u32).to_be_bytes());
        self.0.extend_from_slice(ad);
        self
    }
}

/// A well-formed symmetric encryption key for an AEAD scheme.
///
/// The key material is zeroized when the key is dropped.
#[derive(Clone, PartialEq, Eq)]
pub(super) struct EncryptionKey {
    material: Box<[u8; KEY_LEN]>,
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.material.as_mut().zeroize();
    }
}

impl ZeroizeOnDrop for EncryptionKey {}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("material", &"REDACTED")
            .finish()
    }
}

impl EncryptionKey {
    /// Generate a new symmetric AEAD encryption key from scratch.
    pub(super) fn new(rng: &mut (impl CryptoRng + RngCore)) -> Self {
        let mut material = Box::new([0u8; KEY_LEN]);
        rng.fill_bytes(material.as_mut());
        Self { material }
    }

    /// Use the given bytes as a symmetric AEAD encryption key.
    pub(super) fn from_bytes(key_material: &[u8]) -> Result<Self, CryptoError> {
        if key_material.len() != KEY_LEN {
            return Err(CryptoError::InvalidEncryptionKey);
        }
        let mut material = Box::new([0u8; KEY_LEN]);
        material.copy_from_slice(key_material);
        Ok(Self { material })
    }

    /// WARNING: this exposes the raw key. It is only used to serialize the
    /// key right before it gets encrypted under another key.
    pub(super) fn as_bytes(&self) -> &[u8] {
        self.material.as_ref()
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(self.material.as_ref()))
    }
}

/// A ciphertext representing an object of type `T`, encrypted under the
/// [ChaCha20Poly1305 scheme](https://www.rfc-editor.org/rfc/rfc8439) for
/// authenticated encryption with associated data (AEAD).
///
/// The associated data is not carried with the ciphertext; the decrypting
/// party rebuilds it from its own view of the context, which is what binds a
/// ciphertext to its field, key and trade.
///
/// Serialized form is `nonce || tag || ciphertext`, hex encoded on the wire.
pub struct Encrypted<T> {
    nonce: chacha20poly1305::Nonce,
    tag: chacha20poly1305::Tag,
    ciphertext: Vec<u8>,
    original_type: PhantomData<T>,
}

impl<T> Clone for Encrypted<T> {
    fn clone(&self) -> Self {
        Self {
            nonce: self.nonce,
            tag: self.tag,
            ciphertext: self.ciphertext.clone(),
            original_type: PhantomData,
        }
    }
}

impl<T> PartialEq for Encrypted<T> {
    fn eq(&self, other: &Self) -> bool {
        self.nonce == other.nonce && self.tag == other.tag && self.ciphertext == other.ciphertext
    }
}

impl<T> Eq for Encrypted<T> {}

impl<T> fmt::Debug for Encrypted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encrypted")
            .field("nonce", &encoding::to_prefixed_hex(self.nonce))
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

impl<T> Encrypted<T> {
    /// Minimum length of a serialized ciphertext: an empty plaintext still
    /// carries a nonce and a tag.
    pub const MIN_LEN: usize = NONCE_LEN + TAG_LEN;

    /// Serialize as `nonce || tag || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.nonce
            .iter()
            .chain(self.tag.iter())
            .chain(self.ciphertext.iter())
            .copied()
            .collect()
    }

    /// Parse `nonce || tag || ciphertext`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < Self::MIN_LEN {
            return Err(CryptoError::ConversionError);
        }
        let (nonce, rest) = bytes.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);
        Ok(Self {
            nonce: *chacha20poly1305::Nonce::from_slice(nonce),
            tag: *chacha20poly1305::Tag::from_slice(tag),
            ciphertext: ciphertext.to_vec(),
            original_type: PhantomData,
        })
    }

    /// Length of the serialized ciphertext.
    pub fn len(&self) -> usize {
        Self::MIN_LEN + self.ciphertext.len()
    }

    /// Whether the encrypted payload is empty. The serialized form still
    /// carries the nonce and tag, so [`Encrypted::len`] is then `MIN_LEN`.
    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn tamper(&mut self, index: usize) {
        if let Some(byte) = self.ciphertext.get_mut(index) {
            *byte ^= 1;
        } else {
            self.tag[0] ^= 1;
        }
    }
}

impl<T> Encrypted<T>
where
    T: TryFrom<Vec<u8>>,
    CryptoError: From<<T as TryFrom<Vec<u8>>>::Error>,
    Vec<u8>: From<T>,
{
    /// Encrypt the `T` and authenticate the [`AssociatedData`] under the
    /// [`EncryptionKey`]. A fresh random nonce is drawn for every call.
    ///
    /// Raises a [`CryptoError::EncryptionFailed`] if encryption fails.
    pub(super) fn encrypt(
        rng: &mut (impl CryptoRng + RngCore),
        enc_key: &EncryptionKey,
        object: T,
        associated_data: &AssociatedData,
    ) -> Result<Self, CryptoError> {
        let cipher = enc_key.cipher();
        let mut buffer = Vec::from(object);

        let nonce = ChaCha20Poly1305::generate_nonce(rng);
        let tag = cipher
            .encrypt_in_place_detached(&nonce, associated_data.into(), &mut buffer)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(Self {
            nonce,
            tag,
            ciphertext: buffer,
            original_type: PhantomData,
        })
    }

    /// Decrypt the ciphertext to a `T`.
    ///
    /// Raises a [`CryptoError::DecryptionFailed`] if authentication fails or
    /// [`CryptoError::ConversionError`] if the decrypted plaintext cannot be
    /// converted into `T`.
    pub(super) fn decrypt(
        &self,
        enc_key: &EncryptionKey,
        associated_data: &AssociatedData,
    ) -> Result<T, CryptoError> {
        let cipher = enc_key.cipher();
        let mut buffer = self.ciphertext.clone();

        cipher
            .decrypt_in_place_detached(&self.nonce, associated_data.into(), &mut buffer, &self.tag)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        Ok(buffer.try_into()?)
    }
}

impl<T> Serialize for Encrypted<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encoding::to_prefixed_hex(self.to_bytes()))
    }
}

impl<'de, T> Deserialize<'de> for Encrypted<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex_string = String::deserialize(deserializer)?;
        let bytes = encoding::from_prefixed_hex(&hex_string).map_err(de::Error::custom)?;
        Self::from_bytes(&bytes).map_err(de::Error::custom)
    }
}
