//! Application-specific cryptographic types and operations.
//!
//! Field values are encrypted under per-group [`GroupKey`]s. Group keys are
//! shared with other parties by wrapping them for a one-time public key
//! ([`WrappedKey`]). Nothing in this module performs I/O.

mod generic;
mod group_key;
mod key_wrap;
mod one_time_key;

pub use generic::{CryptoError, Encrypted};
pub use group_key::{FieldValue, GroupKey, KeyId};
pub use key_wrap::{WrapContext, WrappedKey};
pub use one_time_key::{OneTimePublicKey, OneTimeSecretKey};
