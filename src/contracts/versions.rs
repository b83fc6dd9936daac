//! Append-only document versions. The current version of a contract is the
//! row with the highest number; rows are never changed once written.

use serde_json::Value;
use uuid::Uuid;

use super::error::{ContractError, ContractResult};
use super::template::{self, MergeData};
use crate::models::{ContractVersion, NewContractVersion};
use crate::store::{ContractStore, StoreResult};

/// Appends `version` exactly as given. Callers compute the number; the
/// store's unique index rejects a reused one.
pub fn create_version<S: ContractStore>(
    store: &mut S,
    contract_id: Uuid,
    version: i32,
    body: &str,
    merge_data: MergeData,
) -> StoreResult<ContractVersion> {
    store.insert_version(NewContractVersion {
        id: Uuid::new_v4(),
        contract_id,
        version,
        body: body.to_string(),
        merge_data: Value::Object(merge_data),
    })
}

pub fn current_version<S: ContractStore>(
    store: &mut S,
    contract_id: Uuid,
) -> StoreResult<Option<ContractVersion>> {
    store.latest_version(contract_id)
}

pub fn next_version_number<S: ContractStore>(store: &mut S, contract_id: Uuid) -> StoreResult<i32> {
    Ok(store
        .latest_version(contract_id)?
        .map_or(1, |current| current.version + 1))
}

/// Appends `current + 1`. Must run while the contract row is locked so two
/// writers cannot both claim the same number.
pub fn append_version<S: ContractStore>(
    store: &mut S,
    contract_id: Uuid,
    body: &str,
    merge_data: MergeData,
) -> StoreResult<ContractVersion> {
    let next = next_version_number(store, contract_id)?;
    create_version(store, contract_id, next, body, merge_data)
}

/// Renders the current version. Values stored with the version act as
/// defaults that `merge_data` overrides key by key.
pub fn render_current<S: ContractStore>(
    store: &mut S,
    contract_id: Uuid,
    merge_data: &MergeData,
) -> ContractResult<String> {
    let version = current_version(store, contract_id)?.ok_or(ContractError::NotFound)?;
    let mut data = match version.merge_data {
        Value::Object(stored) => stored,
        _ => MergeData::new(),
    };
    for (key, value) in merge_data {
        data.insert(key.clone(), value.clone());
    }
    Ok(template::render(&version.body, &data))
}

pub fn list_versions<S: ContractStore>(
    store: &mut S,
    contract_id: Uuid,
) -> StoreResult<Vec<ContractVersion>> {
    store.list_versions(contract_id)
}
