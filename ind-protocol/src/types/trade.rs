//! Trade identities: guids, parties, one-time addresses and the plaintext
//! trade record.

use crate::{
    crypto::OneTimePublicKey,
    infrastructure::encoding,
    IndError,
};

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::{collections::BTreeMap, fmt, str::FromStr};
use strum::{Display, EnumIter, EnumString};
use uuid::Builder;

/// A plaintext record: field name to stable UTF-8 value. Ordered, so that its
/// JSON form is canonical.
pub type PlainRecord = BTreeMap<String, String>;

/// Correlation id of one trade flow. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Guid(String);

impl Guid {
    pub fn new(guid: impl Into<String>) -> Result<Self, IndError> {
        let guid = guid.into();
        if guid.trim().is_empty() {
            return Err(IndError::EmptyGuid);
        }
        Ok(Self(guid))
    }

    /// Generate a random guid.
    pub fn generate(rng: &mut (impl CryptoRng + RngCore)) -> Self {
        let mut bytes = [0_u8; 16];
        rng.fill_bytes(&mut bytes);
        Self(Builder::from_random_bytes(bytes).into_uuid().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Guid {
    type Error = IndError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Guid> for String {
    fn from(guid: Guid) -> Self {
        guid.0
    }
}

impl FromStr for Guid {
    type Err = IndError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role of a party in a trade. Encoded on the wire by position, `0` for
/// [`PartyType::Unassigned`] through `3` for [`PartyType::Broker`].
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize,
    Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum PartyType {
    #[default]
    Unassigned,
    Buyer,
    Seller,
    Broker,
}

impl From<PartyType> for u8 {
    fn from(party_type: PartyType) -> Self {
        match party_type {
            PartyType::Unassigned => 0,
            PartyType::Buyer => 1,
            PartyType::Seller => 2,
            PartyType::Broker => 3,
        }
    }
}

impl TryFrom<u8> for PartyType {
    type Error = IndError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unassigned),
            1 => Ok(Self::Buyer),
            2 => Ok(Self::Seller),
            3 => Ok(Self::Broker),
            other => Err(IndError::InvalidParty(format!("unknown party type {other}"))),
        }
    }
}

/// A participant in a trade. Carries no wallet secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub party_type: PartyType,
    pub party_address: String,
    pub company_name: String,
}

impl Party {
    pub fn new(
        party_type: PartyType,
        party_address: impl Into<String>,
        company_name: impl Into<String>,
    ) -> Self {
        Self {
            party_type,
            party_address: party_address.into(),
            company_name: company_name.into(),
        }
    }

    /// A party is well formed when it names a company and has an assigned
    /// role.
    pub fn validate(&self) -> Result<(), IndError> {
        if self.company_name.trim().is_empty() {
            return Err(IndError::InvalidParty("company name is empty".to_string()));
        }
        if self.party_type == PartyType::Unassigned {
            return Err(IndError::InvalidParty(format!(
                "{} has no assigned party type",
                self.company_name
            )));
        }
        Ok(())
    }
}

/// A single-use address and public key issued by the wallet service for one
/// guid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimeAddress {
    pub correlation_id: Guid,
    pub address: String,
    pub public_key: OneTimePublicKey,
}

impl OneTimeAddress {
    /// A one-time address whose address is derived from its public key.
    pub fn from_public_key(correlation_id: Guid, public_key: OneTimePublicKey) -> Self {
        Self {
            correlation_id,
            address: public_key.address(),
            public_key,
        }
    }
}

/// The plaintext trade record exchanged between buyer, seller and broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub guid: Guid,
    pub trade_date: String,
    pub qty: String,
    pub product: String,
    pub price: String,
    pub buyer: String,
    pub seller: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message_hash: String,
}

impl TradeRecord {
    /// The fields that must be encrypted before the record leaves the party:
    /// everything except the guid and the message hash.
    pub fn sensitive_fields(&self) -> PlainRecord {
        let mut fields = PlainRecord::new();
        for (name, value) in [
            ("tradeDate", &self.trade_date),
            ("qty", &self.qty),
            ("product", &self.product),
            ("price", &self.price),
            ("buyer", &self.buyer),
            ("seller", &self.seller),
        ] {
            let _ = fields.insert(name.to_string(), value.clone());
        }
        if let Some(broker) = &self.broker {
            let _ = fields.insert("broker".to_string(), broker.clone());
        }
        fields
    }

    /// Hash of the sensitive fields. See [`message_hash`].
    pub fn compute_message_hash(&self) -> Result<String, IndError> {
        message_hash(&self.sensitive_fields())
    }

    /// Fill in `message_hash` from the current field values.
    pub fn with_message_hash(mut self) -> Result<Self, IndError> {
        self.message_hash = self.compute_message_hash()?;
        Ok(self)
    }
}

/// `0x`-prefixed SHA3-256 of the canonical JSON form of `record`.
pub fn message_hash(record: &PlainRecord) -> Result<String, IndError> {
    let canonical = serde_json::to_vec(record)?;
    Ok(encoding::to_prefixed_hex(Sha3_256::digest(canonical)))
}
