//! Payloads posted to the relay and contract layer.

use crate::{
    constants::OK,
    types::{EncryptedRecord, Guid, Party},
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Routing metadata attached to a posted trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingInfo {
    pub factory_address: String,
    pub marketplace_address: String,
    pub contract_name: String,
    pub my_party: Party,
    pub other_party: Party,
    pub function_list: Vec<String>,
}

/// The `data` of a posted trade: the encrypted record and the hash of its
/// plaintext. No plaintext field is ever part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeData {
    #[serde(flatten)]
    pub record: EncryptedRecord,
    pub message_hash: String,
}

/// A signed trade, ready to be posted to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEnvelope {
    pub data: EnvelopeData,
    pub signature: String,
    pub other_info: RoutingInfo,
}

impl TransactionEnvelope {
    pub fn guid(&self) -> &Guid {
        &self.data.record.guid
    }
}

/// Contract function and the record fields it takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
}

/// The `data` of a contract creation: guid, message hash, and the hex
/// ciphertext of every field under the field's own name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    pub guid: Guid,
    pub message_hash: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    pub marketplace_address: String,
    pub factory_address: String,
    pub my_party: Party,
    pub other_party: Party,
    pub function_list: Vec<Function>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    pub data: TransactionData,
    pub signature: String,
    pub other_info: TransactionInfo,
}

/// Outcome reported by the relay for operations that are not tied to a guid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub error: String,
    pub status: bool,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            error: OK.to_string(),
            status: true,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error == OK
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionResponse {
    pub error: String,
    pub status: bool,
    #[serde(default)]
    pub contract_id: u64,
    #[serde(default)]
    pub transaction_hash: Vec<String>,
}

impl CreateTransactionResponse {
    pub fn is_ok(&self) -> bool {
        self.error == OK
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationData {
    pub company_name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnRegistrationData {
    pub company_name: String,
}

/// A message together with the sender's signature over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest<T> {
    pub message: T,
    pub signature: String,
}

pub type WalletRegistrationRequest = SignedRequest<RegistrationData>;
pub type WalletUnRegistrationRequest = SignedRequest<UnRegistrationData>;
pub type WalletRegistrationResponse = Response;
pub type WalletUnRegistrationResponse = Response;
