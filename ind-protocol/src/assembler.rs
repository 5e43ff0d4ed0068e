//! Composition of encrypted records, routing metadata and signatures into the
//! payloads posted to the relay. Nothing here touches key material.

use crate::{
    config::ContractRegistry,
    types::{
        transaction::{
            CreateTransactionRequest, EnvelopeData, Function, TransactionData, TransactionInfo,
        },
        EncryptedRecord, RoutingInfo, TransactionEnvelope,
    },
    IndError,
};

use tracing::instrument;

/// Check the routing metadata against the registry: the contract must be
/// known, every listed function must belong to it, and both parties must be
/// well formed. Returns the listed functions with their parameters.
pub fn validate_routing(
    registry: &ContractRegistry,
    routing: &RoutingInfo,
) -> Result<Vec<Function>, IndError> {
    if !registry.contains(&routing.contract_name) {
        return Err(IndError::UnknownContract(routing.contract_name.clone()));
    }
    routing.my_party.validate()?;
    routing.other_party.validate()?;

    routing
        .function_list
        .iter()
        .map(|name| registry.function(&routing.contract_name, name).cloned())
        .collect()
}

/// Build the envelope posted through `postTransaction`.
#[instrument(skip_all, err(Debug), fields(guid = %record.guid))]
pub fn assemble(
    registry: &ContractRegistry,
    record: EncryptedRecord,
    message_hash: impl Into<String>,
    signature: impl Into<String>,
    routing: RoutingInfo,
) -> Result<TransactionEnvelope, IndError> {
    record.validate()?;
    let _ = validate_routing(registry, &routing)?;

    Ok(TransactionEnvelope {
        data: EnvelopeData {
            record,
            message_hash: message_hash.into(),
        },
        signature: signature.into(),
        other_info: routing,
    })
}

/// Build the request posted through `createTransaction`. Every field of the
/// record is published as its hex ciphertext, and every function carries
/// the parameters the registry lists for it.
#[instrument(skip_all, err(Debug), fields(guid = %record.guid))]
pub fn assemble_transaction(
    registry: &ContractRegistry,
    record: &EncryptedRecord,
    message_hash: impl Into<String>,
    signature: impl Into<String>,
    routing: RoutingInfo,
) -> Result<CreateTransactionRequest, IndError> {
    record.validate()?;
    let function_list = validate_routing(registry, &routing)?;

    Ok(CreateTransactionRequest {
        data: TransactionData {
            guid: record.guid.clone(),
            message_hash: message_hash.into(),
            fields: record.ciphertexts_hex(),
        },
        signature: signature.into(),
        other_info: TransactionInfo {
            marketplace_address: routing.marketplace_address,
            factory_address: routing.factory_address,
            my_party: routing.my_party,
            other_party: routing.other_party,
            function_list,
        },
    })
}
