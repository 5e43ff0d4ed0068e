use thiserror::Error;

use crate::crypto::{CryptoError, KeyId};

#[derive(Debug, Error)]
pub enum IndError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    // Key store errors
    #[error("No key {key_id} bound for trade {guid}")]
    KeyNotFound { guid: String, key_id: KeyId },
    /// The `KeyNotFound` kind for lookups by group name rather than key id.
    /// See [`IndError::is_key_not_found`].
    #[error("No key bound to group {group_name} for trade {guid}")]
    GroupKeyNotFound { guid: String, group_name: String },
    #[error(
        "Key {key_id} of trade {guid} is bound to group {bound_group}; cannot rebind it to \
         {requested_group}"
    )]
    KeyBindingConflict {
        guid: String,
        key_id: KeyId,
        bound_group: String,
        requested_group: String,
    },

    // Codec errors
    #[error("Integrity check failed for field {field}")]
    Integrity { field: String },
    #[error(transparent)]
    FieldCoverage(#[from] CoverageError),

    // Assembler errors
    #[error("Contract {contract} does not support function {function}")]
    UnsupportedOperation { contract: String, function: String },
    #[error("Unknown contract {0}")]
    UnknownContract(String),
    #[error("Invalid party: {0}")]
    InvalidParty(String),

    // Request errors
    #[error("Trade guid must not be empty")]
    EmptyGuid,
    #[error("Invalid key for trade {guid}")]
    InvalidKey { guid: String },

    // Wrapped errors
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl IndError {
    /// Whether no key was found, by key id or by group name.
    pub fn is_key_not_found(&self) -> bool {
        matches!(
            self,
            IndError::KeyNotFound { .. } | IndError::GroupKeyNotFound { .. }
        )
    }

    /// The text reported in the `error` field of a response.
    ///
    /// Protocol errors are reported as they are. Low-level errors collapse to
    /// a generic message so that responses never echo key material or
    /// internal paths.
    pub fn response_message(&self) -> String {
        match self {
            // Errors that are safe to return to the caller
            IndError::KeyNotFound { .. }
            | IndError::GroupKeyNotFound { .. }
            | IndError::KeyBindingConflict { .. }
            | IndError::Integrity { .. }
            | IndError::FieldCoverage(_)
            | IndError::UnsupportedOperation { .. }
            | IndError::UnknownContract(_)
            | IndError::InvalidParty(_)
            | IndError::EmptyGuid
            | IndError::InvalidKey { .. }
            | IndError::Hex(_)
            | IndError::SerdeJson(_) => self.to_string(),

            // Errors that the caller should not see
            IndError::Crypto(_) | IndError::Io(_) | IndError::Toml(_) => {
                "Internal error".to_string()
            }
        }
    }
}

/// Ways in which a set of field groups can fail to partition a record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoverageError {
    #[error("Field {0} is not assigned to any group")]
    Unassigned(String),
    #[error("Field {field} is assigned to both {first} and {second}")]
    AssignedTwice {
        field: String,
        first: String,
        second: String,
    },
    #[error("Group {group} lists field {field}, which the record does not have")]
    UnknownField { field: String, group: String },
    #[error("Group {0} is defined more than once")]
    DuplicateGroup(String),
    #[error("Field groups must be named")]
    EmptyGroupName,
    #[error("Group {0} has no fields")]
    EmptyGroup(String),
    #[error("Field {0} is listed under a key but has no ciphertext")]
    MissingCiphertext(String),
    #[error("Ciphertext for field {0} is not listed under any key")]
    UnlistedCiphertext(String),
}
