//! Field groups and the encrypted form of a record.

use crate::{
    crypto::{Encrypted, FieldValue, KeyId},
    error::CoverageError,
    types::Guid,
};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A named set of fields that share one [`GroupKey`](crate::crypto::GroupKey).
/// Field order is preserved as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldGroup {
    pub name: String,
    pub fields: Vec<String>,
}

impl FieldGroup {
    pub fn new(name: impl Into<String>, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// The fields encrypted under one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyedFields {
    pub key_id: KeyId,
    pub fields: Vec<String>,
}

/// A record whose fields are encrypted group by group. Every field in `data`
/// is listed under exactly one entry of `keys`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub guid: Guid,
    pub keys: Vec<KeyedFields>,
    pub data: BTreeMap<String, Encrypted<FieldValue>>,
}

impl EncryptedRecord {
    /// Check that `keys` and `data` describe the same set of fields, each
    /// listed exactly once.
    ///
    /// Records built by [`encrypt_groups`](crate::codec::encrypt_groups)
    /// always pass; records parsed from the wire might not.
    pub fn validate(&self) -> Result<(), CoverageError> {
        let mut listed: HashMap<&str, &KeyId> = HashMap::new();
        for keyed in &self.keys {
            for field in &keyed.fields {
                if let Some(first) = listed.insert(field, &keyed.key_id) {
                    return Err(CoverageError::AssignedTwice {
                        field: field.clone(),
                        first: first.to_string(),
                        second: keyed.key_id.to_string(),
                    });
                }
                if !self.data.contains_key(field) {
                    return Err(CoverageError::MissingCiphertext(field.clone()));
                }
            }
        }
        match self.data.keys().find(|field| !listed.contains_key(field.as_str())) {
            Some(field) => Err(CoverageError::UnlistedCiphertext(field.clone())),
            None => Ok(()),
        }
    }

    /// The key id whose group covers `field`, if any.
    pub fn key_for_field(&self, field: &str) -> Option<&KeyId> {
        self.keys
            .iter()
            .find(|keyed| keyed.fields.iter().any(|listed| listed == field))
            .map(|keyed| &keyed.key_id)
    }

    /// Hex form of every ciphertext, as published on-chain.
    pub fn ciphertexts_hex(&self) -> BTreeMap<String, String> {
        self.data
            .iter()
            .map(|(field, ciphertext)| {
                (
                    field.clone(),
                    crate::infrastructure::encoding::to_prefixed_hex(ciphertext.to_bytes()),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ciphertext() -> Encrypted<FieldValue> {
        Encrypted::from_bytes(&[0; Encrypted::<FieldValue>::MIN_LEN + 4]).unwrap()
    }

    fn record(keys: Vec<KeyedFields>, fields: &[&str]) -> EncryptedRecord {
        EncryptedRecord {
            guid: Guid::new("T1").unwrap(),
            keys,
            data: fields
                .iter()
                .map(|field| (field.to_string(), ciphertext()))
                .collect(),
        }
    }

    fn keyed(key_id: &str, fields: &[&str]) -> KeyedFields {
        KeyedFields {
            key_id: key_id.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn consistent_records_validate() {
        let record = record(
            vec![keyed("k1", &["buyer", "price"]), keyed("k2", &["commodity"])],
            &["buyer", "price", "commodity"],
        );
        assert_eq!(record.validate(), Ok(()));
        assert_eq!(record.key_for_field("commodity"), Some(&KeyId::from("k2")));
        assert_eq!(record.key_for_field("qty"), None);
    }

    #[test]
    fn inconsistent_records_are_rejected() {
        let twice = record(
            vec![keyed("k1", &["buyer"]), keyed("k2", &["buyer"])],
            &["buyer"],
        );
        assert!(matches!(
            twice.validate(),
            Err(CoverageError::AssignedTwice { .. })
        ));

        let missing = record(vec![keyed("k1", &["buyer", "price"])], &["buyer"]);
        assert_eq!(
            missing.validate(),
            Err(CoverageError::MissingCiphertext("price".to_string()))
        );

        let unlisted = record(vec![keyed("k1", &["buyer"])], &["buyer", "price"]);
        assert_eq!(
            unlisted.validate(),
            Err(CoverageError::UnlistedCiphertext("price".to_string()))
        );
    }

    #[test]
    fn records_use_wire_field_names() {
        let record = record(vec![keyed("k1", &["buyer"])], &["buyer"]);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["keys"][0]["keyId"], "k1");
        assert!(json["data"]["buyer"].as_str().unwrap().starts_with("0x"));

        let parsed: EncryptedRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }
}
