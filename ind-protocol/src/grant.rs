//! Access grants: capability tokens giving one party read access to exactly
//! one field group of a trade.

use crate::{
    crypto::{GroupKey, KeyId, OneTimeSecretKey, WrapContext, WrappedKey},
    infrastructure::logging,
    key_store::KeyStore,
    types::{Guid, OneTimeAddress},
    IndError,
};

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// A group key wrapped for one grantee. Grants do not expire; to revoke one,
/// rotate the group's key and grant again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub guid: Guid,
    pub grantee_address: String,
    pub group_name: String,
    pub key_id: KeyId,
    pub wrapped_key: WrappedKey,
}

impl AccessGrant {
    fn context(&self) -> WrapContext<'_> {
        WrapContext {
            guid: &self.guid,
            group_name: &self.group_name,
            key_id: &self.key_id,
            grantee_address: &self.grantee_address,
        }
    }
}

/// Wrap the current key of `group_name` for the holder of `recipient`'s
/// one-time secret key.
///
/// Only reads the store. Fails with [`IndError::GroupKeyNotFound`], the
/// group flavor of `KeyNotFound`, if the group has no key for `guid`.
#[instrument(skip_all, err(Debug), fields(guid, group_name))]
pub async fn grant_access(
    rng: &mut (impl CryptoRng + RngCore),
    store: &(impl KeyStore + ?Sized),
    guid: &Guid,
    group_name: &str,
    recipient: &OneTimeAddress,
) -> Result<AccessGrant, IndError> {
    logging::record_field("guid", guid);
    logging::record_field("group_name", &group_name);

    let (key_id, key) = store.current_for_group(guid, group_name).await?;
    let grant = wrap_for(rng, guid, group_name, key_id, &key, recipient)?;

    info!("Granted access to {}", recipient.address);
    Ok(grant)
}

/// Wrap a key the caller already holds. Used by parties that received the key
/// through a grant themselves.
pub fn wrap_for(
    rng: &mut (impl CryptoRng + RngCore),
    guid: &Guid,
    group_name: &str,
    key_id: KeyId,
    key: &GroupKey,
    recipient: &OneTimeAddress,
) -> Result<AccessGrant, IndError> {
    let context = WrapContext {
        guid,
        group_name,
        key_id: &key_id,
        grantee_address: &recipient.address,
    };
    let wrapped_key = WrappedKey::wrap(rng, key, &recipient.public_key, &context)?;

    Ok(AccessGrant {
        guid: guid.clone(),
        grantee_address: recipient.address.clone(),
        group_name: group_name.to_string(),
        key_id,
        wrapped_key,
    })
}

/// Recover the key of an [`AccessGrant`] with the grantee's one-time secret
/// key. The returned key id is the one the encrypted record lists for the
/// group.
#[instrument(skip_all, err(Debug), fields(guid))]
pub fn unwrap_grant(
    grant: &AccessGrant,
    recipient: &OneTimeSecretKey,
) -> Result<(KeyId, GroupKey), IndError> {
    logging::record_field("guid", &grant.guid);
    let key = grant.wrapped_key.unwrap(recipient, &grant.context())?;
    Ok((grant.key_id.clone(), key))
}
