//! Field group codec: splits a flat record into named groups and encrypts
//! every field under its group's key.

use crate::{
    crypto::{GroupKey, KeyId},
    error::CoverageError,
    infrastructure::logging,
    key_store::KeyBinding,
    types::{EncryptedRecord, FieldGroup, Guid, KeyedFields, PlainRecord},
    IndError,
};

use rand::{CryptoRng, RngCore};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, instrument, warn};

/// Keys available for decryption, by key id.
pub type KeyMap = HashMap<KeyId, GroupKey>;

/// Source of the key each field group is encrypted under.
pub trait KeyProvider {
    fn key_for(
        &mut self,
        rng: &mut (impl CryptoRng + RngCore),
        group_name: &str,
    ) -> Result<(KeyId, GroupKey), IndError>;
}

/// A [`KeyProvider`] that reuses the current key of groups it already knows
/// and generates keys with the next sequential id for the rest.
///
/// Freshly generated keys are not bound anywhere; collect them with
/// [`Keyring::new_bindings`] once the encryption succeeded.
#[derive(Debug, Default)]
pub struct Keyring {
    /// Group name to its current key.
    current: HashMap<String, (KeyId, GroupKey)>,
    /// Groups that get a fresh key even if they have one.
    rotate: HashSet<String>,
    fresh: Vec<KeyBinding>,
    next_index: usize,
}

impl Keyring {
    /// A keyring for a trade without keys; ids start at `k1`.
    pub fn new() -> Self {
        Self {
            next_index: 1,
            ..Self::default()
        }
    }

    /// A keyring continuing the given bindings of a trade, in bind order.
    /// Later bindings of a group supersede earlier ones, and new ids
    /// continue after the highest sequential id among them.
    pub fn continuing(bindings: impl IntoIterator<Item = KeyBinding>) -> Self {
        let mut keyring = Self::new();
        for binding in bindings {
            if let Some(index) = binding.key_id.index() {
                keyring.next_index = keyring.next_index.max(index + 1);
            }
            let _ = keyring
                .current
                .insert(binding.group_name, (binding.key_id, binding.key));
        }
        keyring
    }

    /// Give `group_name` a fresh key on its next use.
    pub fn rotate(&mut self, group_name: impl Into<String>) {
        let _ = self.rotate.insert(group_name.into());
    }

    /// Keys generated by this keyring that still need to be bound.
    pub fn new_bindings(self) -> Vec<KeyBinding> {
        self.fresh
    }

    fn next_key_id(&mut self) -> KeyId {
        let key_id = KeyId::sequential(self.next_index);
        self.next_index += 1;
        key_id
    }
}

impl KeyProvider for Keyring {
    fn key_for(
        &mut self,
        rng: &mut (impl CryptoRng + RngCore),
        group_name: &str,
    ) -> Result<(KeyId, GroupKey), IndError> {
        if !self.rotate.remove(group_name) {
            if let Some(current) = self.current.get(group_name) {
                return Ok(current.clone());
            }
        }

        let key_id = self.next_key_id();
        let key = GroupKey::generate(rng);
        let _ = self
            .current
            .insert(group_name.to_string(), (key_id.clone(), key.clone()));
        self.fresh.push(KeyBinding {
            key_id: key_id.clone(),
            group_name: group_name.to_string(),
            key: key.clone(),
        });
        Ok((key_id, key))
    }
}

/// A [`KeyProvider`] over keys fixed in advance, e.g. the keys of a data
/// endpoint request. Unknown groups are [`IndError::GroupKeyNotFound`].
#[derive(Debug)]
pub struct AssignedKeys {
    guid: Guid,
    keys: HashMap<String, (KeyId, GroupKey)>,
}

impl AssignedKeys {
    pub fn new(guid: Guid) -> Self {
        Self {
            guid,
            keys: HashMap::new(),
        }
    }

    pub fn assign(&mut self, group_name: impl Into<String>, key_id: KeyId, key: GroupKey) {
        let _ = self.keys.insert(group_name.into(), (key_id, key));
    }
}

impl KeyProvider for AssignedKeys {
    fn key_for(
        &mut self,
        _rng: &mut (impl CryptoRng + RngCore),
        group_name: &str,
    ) -> Result<(KeyId, GroupKey), IndError> {
        self.keys
            .get(group_name)
            .cloned()
            .ok_or_else(|| IndError::GroupKeyNotFound {
                guid: self.guid.to_string(),
                group_name: group_name.to_string(),
            })
    }
}

/// Check that `groups` partition the fields of `record`: every field in
/// exactly one group, no group naming a field the record lacks.
pub fn validate_coverage(record: &PlainRecord, groups: &[FieldGroup]) -> Result<(), CoverageError> {
    let mut group_names = HashSet::new();
    let mut owners: HashMap<&str, &str> = HashMap::new();

    for group in groups {
        if group.name.trim().is_empty() {
            return Err(CoverageError::EmptyGroupName);
        }
        if !group_names.insert(group.name.as_str()) {
            return Err(CoverageError::DuplicateGroup(group.name.clone()));
        }
        if group.fields.is_empty() {
            return Err(CoverageError::EmptyGroup(group.name.clone()));
        }
        for field in &group.fields {
            if let Some(first) = owners.insert(field, &group.name) {
                return Err(CoverageError::AssignedTwice {
                    field: field.clone(),
                    first: first.to_string(),
                    second: group.name.clone(),
                });
            }
            if !record.contains_key(field) {
                return Err(CoverageError::UnknownField {
                    field: field.clone(),
                    group: group.name.clone(),
                });
            }
        }
    }

    match record.keys().find(|field| !owners.contains_key(field.as_str())) {
        Some(field) => Err(CoverageError::Unassigned(field.clone())),
        None => Ok(()),
    }
}

/// Encrypt every field of `record` under the key of its group.
///
/// Each field is encrypted on its own with a fresh nonce, so equal values
/// never produce equal ciphertexts. `keys` lists the groups in the order of
/// `groups`.
#[instrument(skip_all, err(Debug), fields(guid))]
pub fn encrypt_groups(
    rng: &mut (impl CryptoRng + RngCore),
    guid: &Guid,
    record: &PlainRecord,
    groups: &[FieldGroup],
    provider: &mut impl KeyProvider,
) -> Result<EncryptedRecord, IndError> {
    logging::record_field("guid", guid);
    validate_coverage(record, groups)?;

    let mut keys = Vec::with_capacity(groups.len());
    let mut data = BTreeMap::new();
    for group in groups {
        let (key_id, key) = provider.key_for(rng, &group.name)?;
        for field in &group.fields {
            // Coverage was validated, so every listed field exists.
            let value = record.get(field).ok_or_else(|| {
                CoverageError::UnknownField {
                    field: field.clone(),
                    group: group.name.clone(),
                }
            })?;
            let ciphertext = key.encrypt_field(rng, guid, &key_id, field, value)?;
            let _ = data.insert(field.clone(), ciphertext);
        }
        keys.push(KeyedFields {
            key_id,
            fields: group.fields.clone(),
        });
    }

    info!("Encrypted {} fields in {} groups", data.len(), keys.len());
    Ok(EncryptedRecord {
        guid: guid.clone(),
        keys,
        data,
    })
}

/// What to do when a field fails authentication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnCorrupt {
    /// Fail the whole call with [`IndError::Integrity`].
    #[default]
    Fail,
    /// Leave the field out and report it in [`DecryptedFields::corrupt`].
    Flag,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecryptOptions {
    /// Fail with [`IndError::KeyNotFound`] when any key of the record is not
    /// available, instead of omitting its fields.
    pub require_all_keys: bool,
    pub on_corrupt: OnCorrupt,
}

impl DecryptOptions {
    pub fn strict() -> Self {
        Self {
            require_all_keys: true,
            on_corrupt: OnCorrupt::Fail,
        }
    }
}

/// The result of [`decrypt_fields`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecryptedFields {
    /// Every field that could be decrypted.
    pub fields: PlainRecord,
    /// Fields whose ciphertext failed authentication. Only filled with
    /// [`OnCorrupt::Flag`].
    pub corrupt: Vec<String>,
    /// Keys of the record that were not available.
    pub missing_keys: Vec<KeyId>,
}

/// Decrypt the fields of `encrypted` whose key is in `available`.
///
/// Fields under a missing key are omitted unless
/// [`DecryptOptions::require_all_keys`] is set.
#[instrument(skip_all, err(Debug), fields(guid))]
pub fn decrypt_fields(
    encrypted: &EncryptedRecord,
    available: &KeyMap,
    options: DecryptOptions,
) -> Result<DecryptedFields, IndError> {
    logging::record_field("guid", &encrypted.guid);
    encrypted.validate()?;

    let mut result = DecryptedFields::default();
    for keyed in &encrypted.keys {
        let Some(key) = available.get(&keyed.key_id) else {
            if options.require_all_keys {
                return Err(IndError::KeyNotFound {
                    guid: encrypted.guid.to_string(),
                    key_id: keyed.key_id.clone(),
                });
            }
            result.missing_keys.push(keyed.key_id.clone());
            continue;
        };

        for field in &keyed.fields {
            let ciphertext = encrypted
                .data
                .get(field)
                .ok_or_else(|| CoverageError::MissingCiphertext(field.clone()))?;
            match ciphertext.decrypt_field(key, &encrypted.guid, &keyed.key_id, field) {
                Ok(value) => {
                    let _ = result.fields.insert(field.clone(), value);
                }
                Err(_) => {
                    warn!("Field {} failed authentication", field);
                    match options.on_corrupt {
                        OnCorrupt::Fail => {
                            return Err(IndError::Integrity {
                                field: field.clone(),
                            })
                        }
                        OnCorrupt::Flag => result.corrupt.push(field.clone()),
                    }
                }
            }
        }
    }

    info!(
        "Decrypted {} fields, {} keys missing",
        result.fields.len(),
        result.missing_keys.len()
    );
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn guid() -> Guid {
        Guid::new("T1").unwrap()
    }

    fn record() -> PlainRecord {
        [
            ("buyer", "Mercuria"),
            ("seller", "Shell"),
            ("price", "55"),
            ("commodity", "Brent"),
        ]
        .into_iter()
        .map(|(field, value)| (field.to_string(), value.to_string()))
        .collect()
    }

    fn groups() -> Vec<FieldGroup> {
        vec![
            FieldGroup::new("commercial", ["buyer", "seller", "price"]),
            FieldGroup::new("quality", ["commodity"]),
        ]
    }

    fn encrypt(rng: &mut StdRng) -> (EncryptedRecord, Keyring) {
        let mut keyring = Keyring::new();
        let encrypted = encrypt_groups(rng, &guid(), &record(), &groups(), &mut keyring).unwrap();
        (encrypted, keyring)
    }

    fn key_map(bindings: Vec<KeyBinding>) -> KeyMap {
        bindings
            .into_iter()
            .map(|binding| (binding.key_id, binding.key))
            .collect()
    }

    #[test]
    fn encryption_follows_group_layout() {
        let mut rng = StdRng::seed_from_u64(1);
        let (encrypted, keyring) = encrypt(&mut rng);

        assert_eq!(
            encrypted.keys,
            vec![
                KeyedFields {
                    key_id: "k1".into(),
                    fields: vec!["buyer".into(), "seller".into(), "price".into()],
                },
                KeyedFields {
                    key_id: "k2".into(),
                    fields: vec!["commodity".into()],
                },
            ]
        );
        assert_eq!(encrypted.data.len(), 4);
        assert_eq!(keyring.new_bindings().len(), 2);
    }

    #[test]
    fn round_trip_with_all_keys() -> Result<(), IndError> {
        let mut rng = StdRng::seed_from_u64(2);
        let (encrypted, keyring) = encrypt(&mut rng);

        let decrypted = decrypt_fields(
            &encrypted,
            &key_map(keyring.new_bindings()),
            DecryptOptions::strict(),
        )?;
        assert_eq!(decrypted.fields, record());
        assert!(decrypted.corrupt.is_empty());
        assert!(decrypted.missing_keys.is_empty());
        Ok(())
    }

    #[test]
    fn partial_keys_yield_partial_records() -> Result<(), IndError> {
        let mut rng = StdRng::seed_from_u64(3);
        let (encrypted, keyring) = encrypt(&mut rng);
        let mut keys = key_map(keyring.new_bindings());
        let _ = keys.remove(&KeyId::from("k1"));

        let decrypted = decrypt_fields(&encrypted, &keys, DecryptOptions::default())?;
        assert_eq!(
            decrypted.fields,
            PlainRecord::from([("commodity".to_string(), "Brent".to_string())])
        );
        assert_eq!(decrypted.missing_keys, vec![KeyId::from("k1")]);

        assert!(matches!(
            decrypt_fields(&encrypted, &keys, DecryptOptions::strict()),
            Err(IndError::KeyNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn group_key_does_not_open_other_groups() {
        let mut rng = StdRng::seed_from_u64(4);
        let (encrypted, keyring) = encrypt(&mut rng);
        let keys = key_map(keyring.new_bindings());
        let quality_key = keys[&KeyId::from("k2")].clone();

        for field in ["buyer", "seller", "price"] {
            assert!(encrypted.data[field]
                .decrypt_field(&quality_key, &guid(), &KeyId::from("k1"), field)
                .is_err());
        }
    }

    #[test]
    fn tampered_fields_fail_or_are_flagged() -> Result<(), IndError> {
        let mut rng = StdRng::seed_from_u64(5);
        let (mut encrypted, keyring) = encrypt(&mut rng);
        let keys = key_map(keyring.new_bindings());
        if let Some(price) = encrypted.data.get_mut("price") {
            price.tamper(0);
        }

        assert!(matches!(
            decrypt_fields(&encrypted, &keys, DecryptOptions::default()),
            Err(IndError::Integrity { field }) if field == "price"
        ));

        let options = DecryptOptions {
            on_corrupt: OnCorrupt::Flag,
            ..DecryptOptions::default()
        };
        let decrypted = decrypt_fields(&encrypted, &keys, options)?;
        assert_eq!(decrypted.corrupt, vec!["price".to_string()]);
        assert_eq!(decrypted.fields.len(), 3);
        assert!(!decrypted.fields.contains_key("price"));
        Ok(())
    }

    #[test]
    fn swapped_ciphertexts_fail_authentication() {
        let mut rng = StdRng::seed_from_u64(6);
        let (mut encrypted, keyring) = encrypt(&mut rng);
        let keys = key_map(keyring.new_bindings());

        let buyer = encrypted.data["buyer"].clone();
        let seller = encrypted.data["seller"].clone();
        let _ = encrypted.data.insert("buyer".to_string(), seller);
        let _ = encrypted.data.insert("seller".to_string(), buyer);

        assert!(matches!(
            decrypt_fields(&encrypted, &keys, DecryptOptions::default()),
            Err(IndError::Integrity { .. })
        ));
    }

    #[test]
    fn coverage_errors_are_detected() {
        let record = record();
        let cases = [
            (
                vec![FieldGroup::new("commercial", ["buyer", "seller", "price"])],
                CoverageError::Unassigned("commodity".to_string()),
            ),
            (
                vec![
                    FieldGroup::new("commercial", ["buyer", "seller", "price"]),
                    FieldGroup::new("quality", ["commodity", "price"]),
                ],
                CoverageError::AssignedTwice {
                    field: "price".to_string(),
                    first: "commercial".to_string(),
                    second: "quality".to_string(),
                },
            ),
            (
                vec![
                    FieldGroup::new("commercial", ["buyer", "seller", "price"]),
                    FieldGroup::new("quality", ["commodity", "apiGravity"]),
                ],
                CoverageError::UnknownField {
                    field: "apiGravity".to_string(),
                    group: "quality".to_string(),
                },
            ),
            (
                vec![
                    FieldGroup::new("commercial", ["buyer", "seller", "price"]),
                    FieldGroup::new("commercial", ["commodity"]),
                ],
                CoverageError::DuplicateGroup("commercial".to_string()),
            ),
            (
                vec![FieldGroup::new("", ["buyer"])],
                CoverageError::EmptyGroupName,
            ),
            (
                vec![FieldGroup::new("quality", Vec::<String>::new())],
                CoverageError::EmptyGroup("quality".to_string()),
            ),
        ];

        for (groups, expected) in cases {
            assert_eq!(validate_coverage(&record, &groups), Err(expected));
        }
        assert_eq!(validate_coverage(&record, &groups()), Ok(()));
    }

    #[test]
    fn continuing_keyring_reuses_and_rotates() -> Result<(), IndError> {
        let mut rng = StdRng::seed_from_u64(7);
        let (_, keyring) = encrypt(&mut rng);
        let existing = keyring.new_bindings();

        let mut keyring = Keyring::continuing(existing.clone());
        keyring.rotate("quality");
        let encrypted = encrypt_groups(&mut rng, &guid(), &record(), &groups(), &mut keyring)?;

        assert_eq!(encrypted.keys[0].key_id, KeyId::from("k1"));
        assert_eq!(encrypted.keys[1].key_id, KeyId::from("k3"));

        let fresh = keyring.new_bindings();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].group_name, "quality");
        assert_ne!(fresh[0].key, existing[1].key);
        Ok(())
    }

    #[test]
    fn continuing_keyring_skips_ids_received_out_of_order() -> Result<(), IndError> {
        let mut rng = StdRng::seed_from_u64(9);
        // Only the second key of the trade was received, through a grant.
        let received = KeyBinding {
            key_id: KeyId::sequential(2),
            group_name: "quality".to_string(),
            key: GroupKey::generate(&mut rng),
        };

        let mut keyring = Keyring::continuing([received]);
        let encrypted = encrypt_groups(&mut rng, &guid(), &record(), &groups(), &mut keyring)?;
        assert_eq!(encrypted.keys[0].key_id, KeyId::sequential(3));
        assert_eq!(encrypted.keys[1].key_id, KeyId::sequential(2));
        Ok(())
    }

    #[test]
    fn assigned_keys_reject_unknown_groups() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut keys = AssignedKeys::new(guid());
        keys.assign("commercial", "k1".into(), GroupKey::generate(&mut rng));

        assert!(matches!(
            encrypt_groups(&mut rng, &guid(), &record(), &groups(), &mut keys),
            Err(IndError::GroupKeyNotFound { .. })
        ));
    }
}
