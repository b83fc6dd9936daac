//! Required signature parties per contract.

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::types::SignatureData;
use crate::models::{ContractSigner, NewContractSigner, SignerChanges};
use crate::store::{ContractStore, StoreResult};

#[derive(Debug, Clone, Deserialize)]
pub struct SignerInput {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Position under sequential signing; lower signs first.
    #[serde(default)]
    pub order_index: i32,
}

pub fn add_signer<S: ContractStore>(
    store: &mut S,
    contract_id: Uuid,
    input: SignerInput,
) -> StoreResult<ContractSigner> {
    store.insert_signer(NewContractSigner {
        id: Uuid::new_v4(),
        contract_id,
        name: input.name,
        email: input.email,
        phone: input.phone,
        order_index: input.order_index,
    })
}

pub fn get_signers<S: ContractStore>(
    store: &mut S,
    contract_id: Uuid,
) -> StoreResult<Vec<ContractSigner>> {
    store.list_signers(contract_id)
}

pub fn update_signer<S: ContractStore>(
    store: &mut S,
    signer_id: Uuid,
    changes: SignerChanges,
) -> StoreResult<Option<ContractSigner>> {
    store.update_signer(signer_id, changes)
}

/// Records the signature. A signer who already signed keeps the original
/// timestamp and signature; the existing row is returned unchanged.
pub fn mark_signed<S: ContractStore>(
    store: &mut S,
    signer_id: Uuid,
    signature: &SignatureData,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> StoreResult<Option<ContractSigner>> {
    let Some(existing) = store.find_signer(signer_id)? else {
        return Ok(None);
    };
    if existing.has_signed {
        return Ok(Some(existing));
    }

    let signature_value = serde_json::to_value(signature)?;
    store.update_signer(
        signer_id,
        SignerChanges {
            has_signed: Some(true),
            signed_at: Some(Some(Utc::now().naive_utc())),
            signature_data: Some(Some(signature_value)),
            ip: Some(ip.map(str::to_string)),
            user_agent: Some(user_agent.map(str::to_string)),
            ..Default::default()
        },
    )
}

/// True once every signer has signed. A contract without signers is never
/// complete.
pub fn all_signed<S: ContractStore>(store: &mut S, contract_id: Uuid) -> StoreResult<bool> {
    let signers = store.list_signers(contract_id)?;
    Ok(!signers.is_empty() && signers.iter().all(|signer| signer.has_signed))
}
