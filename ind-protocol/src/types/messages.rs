//! Request and response messages of the wallet service and the data
//! endpoints. Field names follow the JSON the wallet service speaks.

use crate::{constants::OK, types::Guid};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fields every guid-scoped response carries. `error` is exactly
/// [`OK`] on success and the failure message otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseResponse {
    pub guid: String,
    pub error: String,
}

impl BaseResponse {
    pub fn ok(guid: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            error: OK.to_string(),
        }
    }

    pub fn failed(guid: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error == OK
    }
}

pub type PostTransactionResponse = BaseResponse;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimeAddressRequest {
    pub guid: Guid,
    pub company_name: String,
    pub signer_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimeAddressResponse {
    #[serde(default)]
    pub guid: String,
    #[serde(rename = "OTAddress", default)]
    pub ot_address: String,
    #[serde(default)]
    pub bitcore_public_key: String,
    #[serde(default)]
    pub encrypted_symmetric_key: String,
    pub error: String,
}

impl OneTimeAddressResponse {
    pub fn is_ok(&self) -> bool {
        self.error == OK
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantAccessRequest {
    pub guid: Guid,
    pub accessible_symmetric_key: String,
    #[serde(rename = "partyOTAddress")]
    pub party_ot_address: String,
    pub party_bitcore_public_key: String,
    pub contract_address: String,
    pub company_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantAccessResponse {
    #[serde(default)]
    pub guid: String,
    #[serde(default)]
    pub party_encrypted_symmetric_key: String,
    pub error: String,
}

impl GrantAccessResponse {
    pub fn is_ok(&self) -> bool {
        self.error == OK
    }
}

/// One key of a data endpoint request and the fields it covers. The key is
/// hex encoded.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFields {
    pub key: String,
    pub fields: Vec<String>,
}

impl std::fmt::Debug for KeyFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyFields")
            .field("key", &"REDACTED")
            .field("fields", &self.fields)
            .finish()
    }
}

/// Request of the encrypt and decrypt data endpoints. For encryption `data`
/// holds plaintext values, for decryption hex ciphertexts.
///
/// `guid` stays a plain string here so that a request with an empty guid can
/// still be answered with a response naming it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRequest {
    pub guid: String,
    pub keys: Vec<KeyFields>,
    pub data: BTreeMap<String, String>,
    /// Decryption only: fail on ciphertexts that no listed key covers
    /// instead of leaving them out of the response.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub strict: bool,
}

pub type EncryptDataRequest = DataRequest;
pub type DecryptDataRequest = DataRequest;

/// Response of the data endpoints. `data` is empty unless `error` is
/// [`OK`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResponse {
    pub guid: String,
    pub error: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl DataResponse {
    pub fn is_ok(&self) -> bool {
        self.error == OK
    }
}

pub type EncryptDataResponse = DataResponse;
pub type DecryptDataResponse = DataResponse;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn one_time_address_response_uses_wallet_field_names() {
        let response: OneTimeAddressResponse = serde_json::from_str(
            r#"{"guid":"0x1234","OTAddress":"0xabc","bitcorePublicKey":"0x02","encryptedSymmetricKey":"","error":"OK"}"#,
        )
        .unwrap();
        assert!(response.is_ok());
        assert_eq!(response.ot_address, "0xabc");
        assert_eq!(response.bitcore_public_key, "0x02");
    }

    #[test]
    fn only_exact_ok_is_success() {
        assert!(BaseResponse::ok("g").is_ok());
        assert!(!BaseResponse::failed("g", "ok").is_ok());
        assert!(!BaseResponse::failed("g", "OK ").is_ok());
    }

    #[test]
    fn grant_access_request_uses_wallet_field_names() {
        let request = GrantAccessRequest {
            guid: Guid::new("1234").unwrap(),
            accessible_symmetric_key: "0x01".to_string(),
            party_ot_address: "0xabc".to_string(),
            party_bitcore_public_key: "0x02".to_string(),
            contract_address: "0xdef".to_string(),
            company_name: "ICAP".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["partyOTAddress"], "0xabc");
        assert_eq!(json["partyBitcorePublicKey"], "0x02");
        assert_eq!(json["accessibleSymmetricKey"], "0x01");
    }

    #[test]
    fn data_request_keys_are_not_logged() {
        let request = KeyFields {
            key: "0xdeadbeef".to_string(),
            fields: vec!["price".to_string()],
        };
        assert!(!format!("{request:?}").contains("deadbeef"));
    }
}
