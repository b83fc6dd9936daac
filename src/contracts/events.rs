//! Append-only audit trail. Rows are only ever inserted; there is no update
//! or delete path.

use serde_json::Value;
use uuid::Uuid;

use super::types::{Actor, EventKind};
use crate::models::{ContractEvent, NewContractEvent};
use crate::store::{ContractStore, StoreResult};

pub fn log_event<S: ContractStore>(
    store: &mut S,
    contract_id: Uuid,
    kind: EventKind,
    actor: Actor,
    meta: Value,
) -> StoreResult<ContractEvent> {
    let meta = if meta.is_null() {
        Value::Object(Default::default())
    } else {
        meta
    };
    store.insert_event(NewContractEvent {
        contract_id,
        kind,
        actor: actor.to_string(),
        meta,
    })
}

pub fn list_events<S: ContractStore>(
    store: &mut S,
    contract_id: Uuid,
) -> StoreResult<Vec<ContractEvent>> {
    store.list_events(contract_id)
}
