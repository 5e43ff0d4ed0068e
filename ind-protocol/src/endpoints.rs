//! The encrypt and decrypt data endpoints.
//!
//! Both take `{guid, keys: [{key, fields}], data}` with hex encoded keys. Each
//! key is identified by its [fingerprint](KeyId::fingerprint), so a caller
//! holding only some keys of a record lists just those, in any order.
//! Failures never escape as errors: they are reported in the response's
//! `error` field, with the guid preserved.

use crate::{
    codec::{decrypt_fields, encrypt_groups, AssignedKeys, DecryptOptions, KeyMap},
    crypto::{Encrypted, FieldValue, GroupKey, KeyId},
    infrastructure::{encoding, logging},
    types::{
        messages::{DataRequest, DataResponse, DecryptDataResponse, EncryptDataResponse, KeyFields},
        EncryptedRecord, FieldGroup, Guid, KeyedFields,
    },
    IndError,
};

use rand::{CryptoRng, RngCore};
use std::collections::{BTreeMap, HashSet};
use tracing::{info, instrument, warn};

fn respond(guid: String, result: Result<BTreeMap<String, String>, IndError>) -> DataResponse {
    match result {
        Ok(data) => DataResponse {
            guid,
            error: crate::constants::OK.to_string(),
            data,
        },
        Err(error) => {
            warn!(?error, "Data request failed");
            DataResponse {
                guid,
                error: error.response_message(),
                data: BTreeMap::new(),
            }
        }
    }
}

/// Decode the request keys into `(key_id, key, fields)` triples.
fn decode_keys(
    guid: &Guid,
    keys: &[KeyFields],
) -> Result<Vec<(KeyId, GroupKey, Vec<String>)>, IndError> {
    keys.iter()
        .map(|key_fields| {
            let invalid_key = || IndError::InvalidKey {
                guid: guid.to_string(),
            };
            let bytes = encoding::from_prefixed_hex(&key_fields.key).map_err(|_| invalid_key())?;
            let key = GroupKey::from_bytes(&bytes).map_err(|_| invalid_key())?;
            Ok((KeyId::fingerprint(&key), key, key_fields.fields.clone()))
        })
        .collect()
}

/// Encrypt every field of `request.data` under the key it is listed with.
/// Responds with the hex ciphertext of every field.
#[instrument(skip_all, fields(guid))]
pub fn handle_encrypt_data(
    rng: &mut (impl CryptoRng + RngCore),
    request: &DataRequest,
) -> EncryptDataResponse {
    logging::record_field("guid", &request.guid);

    let result = Guid::new(request.guid.clone()).and_then(|guid| {
        let mut provider = AssignedKeys::new(guid.clone());
        let mut groups = Vec::with_capacity(request.keys.len());
        for (key_id, key, fields) in decode_keys(&guid, &request.keys)? {
            groups.push(FieldGroup::new(key_id.as_str(), fields));
            provider.assign(key_id.to_string(), key_id, key);
        }

        let encrypted = encrypt_groups(rng, &guid, &request.data, &groups, &mut provider)?;
        info!("Encrypted data request");
        Ok(encrypted.ciphertexts_hex())
    });

    respond(request.guid.clone(), result)
}

/// Decrypt the fields of `request.data` listed with one of the request keys.
/// Ciphertexts no key lists are left out of the response, or fail the
/// request when `request.strict` is set. A field that fails authentication
/// fails the whole request.
#[instrument(skip_all, fields(guid))]
pub fn handle_decrypt_data(request: &DataRequest) -> DecryptDataResponse {
    logging::record_field("guid", &request.guid);

    let result = Guid::new(request.guid.clone()).and_then(|guid| {
        let mut available = KeyMap::new();
        let mut keys = Vec::with_capacity(request.keys.len());
        let mut listed = HashSet::new();
        for (key_id, key, fields) in decode_keys(&guid, &request.keys)? {
            listed.extend(fields.iter().cloned());
            keys.push(KeyedFields {
                key_id: key_id.clone(),
                fields,
            });
            let _ = available.insert(key_id, key);
        }

        let data: BTreeMap<String, Encrypted<FieldValue>> = request
            .data
            .iter()
            .filter(|(field, _)| request.strict || listed.contains(*field))
            .map(|(field, hex_ciphertext)| {
                let malformed = || IndError::Integrity {
                    field: field.clone(),
                };
                let bytes =
                    encoding::from_prefixed_hex(hex_ciphertext).map_err(|_| malformed())?;
                let ciphertext = Encrypted::from_bytes(&bytes).map_err(|_| malformed())?;
                Ok((field.clone(), ciphertext))
            })
            .collect::<Result<_, IndError>>()?;

        let encrypted = EncryptedRecord { guid, keys, data };
        let decrypted = decrypt_fields(&encrypted, &available, DecryptOptions::strict())?;
        info!("Decrypted data request");
        Ok(decrypted.fields)
    });

    respond(request.guid.clone(), result)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::OK;
    use rand::{rngs::StdRng, SeedableRng};

    fn key_hex(rng: &mut StdRng) -> String {
        let mut key = [0u8; 32];
        rng.fill_bytes(&mut key);
        encoding::to_prefixed_hex(key)
    }

    fn request(rng: &mut StdRng) -> DataRequest {
        DataRequest {
            guid: "1234".to_string(),
            keys: vec![
                KeyFields {
                    key: key_hex(rng),
                    fields: ["buyer", "seller", "price", "quantity", "uom"]
                        .map(String::from)
                        .to_vec(),
                },
                KeyFields {
                    key: key_hex(rng),
                    fields: ["commodity", "apiGravity"].map(String::from).to_vec(),
                },
            ],
            data: [
                ("buyer", "Mercuria"),
                ("seller", "Shell"),
                ("price", "55"),
                ("quantity", "100000"),
                ("uom", "BBL"),
                ("commodity", "Brent"),
                ("apiGravity", "38.5"),
            ]
            .into_iter()
            .map(|(field, value)| (field.to_string(), value.to_string()))
            .collect(),
            strict: false,
        }
    }

    #[test]
    fn encrypt_then_decrypt_returns_the_data() {
        let mut rng = StdRng::seed_from_u64(1);
        let plain = request(&mut rng);

        let encrypted = handle_encrypt_data(&mut rng, &plain);
        assert_eq!(encrypted.error, OK);
        assert_eq!(encrypted.guid, "1234");
        assert_eq!(encrypted.data.len(), 7);
        assert!(encrypted.data.values().all(|value| value.starts_with("0x")));

        let decrypted = handle_decrypt_data(&DataRequest {
            data: encrypted.data,
            ..plain.clone()
        });
        assert_eq!(decrypted.error, OK);
        assert_eq!(decrypted.data, plain.data);
    }

    #[test]
    fn key_order_does_not_matter() {
        let mut rng = StdRng::seed_from_u64(2);
        let plain = request(&mut rng);
        let encrypted = handle_encrypt_data(&mut rng, &plain);

        let mut keys = plain.keys.clone();
        keys.swap(0, 1);
        let decrypted = handle_decrypt_data(&DataRequest {
            keys,
            data: encrypted.data,
            ..plain.clone()
        });
        assert_eq!(decrypted.error, OK);
        assert_eq!(decrypted.data, plain.data);
    }

    #[test]
    fn holder_of_one_key_decrypts_its_fields() {
        let mut rng = StdRng::seed_from_u64(7);
        let plain = request(&mut rng);
        let encrypted = handle_encrypt_data(&mut rng, &plain);
        assert_eq!(encrypted.error, OK);

        // A grantee holding only the second key, listing one of its fields.
        let quality_key = KeyFields {
            key: plain.keys[1].key.clone(),
            fields: vec!["commodity".to_string()],
        };
        let decrypted = handle_decrypt_data(&DataRequest {
            keys: vec![quality_key.clone()],
            data: encrypted.data.clone(),
            ..plain.clone()
        });
        assert_eq!(decrypted.error, OK);
        assert_eq!(
            decrypted.data,
            BTreeMap::from([("commodity".to_string(), "Brent".to_string())])
        );

        let strict = handle_decrypt_data(&DataRequest {
            keys: vec![quality_key],
            data: encrypted.data,
            strict: true,
            ..plain
        });
        assert_ne!(strict.error, OK);
        assert!(strict.data.is_empty());
    }

    #[test]
    fn fields_listed_under_the_wrong_key_fail() {
        let mut rng = StdRng::seed_from_u64(8);
        let plain = request(&mut rng);
        let encrypted = handle_encrypt_data(&mut rng, &plain);

        let mut keys = plain.keys.clone();
        keys[1].fields.push("price".to_string());
        keys[0].fields.retain(|field| field != "price");
        let decrypted = handle_decrypt_data(&DataRequest {
            keys,
            data: encrypted.data,
            ..plain
        });
        assert_eq!(decrypted.error, "Integrity check failed for field price");
        assert!(decrypted.data.is_empty());
    }

    #[test]
    fn failures_keep_the_guid() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut plain = request(&mut rng);
        let _ = plain.keys[1].fields.pop();

        let response = handle_encrypt_data(&mut rng, &plain);
        assert_eq!(response.guid, "1234");
        assert_eq!(response.error, "Field apiGravity is not assigned to any group");
        assert!(response.data.is_empty());
    }

    #[test]
    fn empty_guid_is_reported() {
        let mut rng = StdRng::seed_from_u64(4);
        let plain = DataRequest {
            guid: String::new(),
            ..request(&mut rng)
        };
        let response = handle_encrypt_data(&mut rng, &plain);
        assert_eq!(response.guid, "");
        assert_eq!(response.error, "Trade guid must not be empty");
    }

    #[test]
    fn malformed_keys_are_reported() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut plain = request(&mut rng);
        plain.keys[0].key = "0x1234".to_string();
        let response = handle_encrypt_data(&mut rng, &plain);
        assert_eq!(response.error, "Invalid key for trade 1234");

        plain.keys[0].key = "not hex".to_string();
        let response = handle_encrypt_data(&mut rng, &plain);
        assert_eq!(response.error, "Invalid key for trade 1234");
    }

    #[test]
    fn tampered_ciphertext_fails_decryption() {
        let mut rng = StdRng::seed_from_u64(6);
        let plain = request(&mut rng);
        let mut encrypted = handle_encrypt_data(&mut rng, &plain);

        let price = encrypted.data["price"].clone();
        let flipped = if price.ends_with('0') { "1" } else { "0" };
        let tampered = format!("{}{}", &price[..price.len() - 1], flipped);
        let _ = encrypted.data.insert("price".to_string(), tampered);

        let decrypted = handle_decrypt_data(&DataRequest {
            data: encrypted.data,
            ..plain
        });
        assert_eq!(decrypted.error, "Integrity check failed for field price");
    }
}
