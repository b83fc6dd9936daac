//! Contract lifecycle: creation, edits, status transitions, sending and
//! signature collection.
//!
//! Every mutation runs inside [`ContractStore::in_transaction`] with the
//! contract row locked, and writes its audit event in the same transaction.
//! Lookups across tenants behave exactly like lookups of missing rows.

use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::automation::on_contract_countersigned;
use super::error::{ContractError, ContractResult};
use super::events::{self, log_event};
use super::signers::{self, SignerInput};
use super::template::MergeData;
use super::tokens::generate_token;
use super::types::{Actor, ContractStatus, EventKind, SignatureData, SigningPolicy};
use super::versions::{self, append_version, create_version};
use crate::jobs::Delivery;
use crate::models::{Contract, ContractEvent, ContractSigner, ContractVersion, NewContract};
use crate::store::{ContractStore, ProjectStore, StoreResult};

#[derive(Debug, Clone, Deserialize)]
pub struct ContractInput {
    pub title: String,
    #[serde(default)]
    pub template_id: Option<Uuid>,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub signing_policy: SigningPolicy,
}

fn lock_owned<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
    contract_id: Uuid,
) -> StoreResult<Option<Contract>> {
    Ok(store
        .lock_contract(contract_id)?
        .filter(|contract| contract.company_id == company_id))
}

fn require_open(contract: &Contract) -> ContractResult<()> {
    if contract.status.is_open() {
        Ok(())
    } else {
        Err(ContractError::Closed(contract.status))
    }
}

/// Moves `contract` to `next` and logs `status_changed`. The caller must hold
/// the row lock; losing the compare-and-set anyway is reported as a conflict.
fn transition<S: ContractStore>(
    store: &mut S,
    contract: &Contract,
    next: ContractStatus,
    actor: Actor,
) -> ContractResult<()> {
    if !contract.status.can_transition_to(next) {
        return Err(ContractError::InvalidTransition {
            from: contract.status,
            to: next,
        });
    }
    if !store.compare_and_set_status(contract.id, contract.status, next)? {
        return Err(ContractError::Conflict);
    }
    log_event(
        store,
        contract.id,
        EventKind::StatusChanged,
        actor,
        json!({ "from": contract.status, "to": next }),
    )?;
    Ok(())
}

/// Creates a draft. With a template, version 1 is the template body verbatim
/// with empty merge data.
pub fn create_contract<S>(
    store: &mut S,
    company_id: Uuid,
    input: ContractInput,
    created_by: Uuid,
) -> ContractResult<Contract>
where
    S: ContractStore + ProjectStore,
{
    let title = input.title.trim();
    if title.is_empty() {
        return Err(ContractError::validation("contract title must not be empty"));
    }

    store.in_transaction::<_, ContractError, _>(|store| {
        let template = match input.template_id {
            Some(template_id) => Some(
                store
                    .find_template(company_id, template_id)?
                    .ok_or(ContractError::NotFound)?,
            ),
            None => None,
        };
        if let Some(customer_id) = input.customer_id {
            store
                .find_customer(company_id, customer_id)?
                .ok_or(ContractError::NotFound)?;
        }

        let contract = store.insert_contract(NewContract {
            id: Uuid::new_v4(),
            company_id,
            template_id: input.template_id,
            customer_id: input.customer_id,
            title: title.to_string(),
            status: ContractStatus::Draft,
            signing_policy: input.signing_policy,
            created_by,
        })?;

        if let Some(template) = &template {
            create_version(store, contract.id, 1, &template.body, MergeData::new())?;
        }

        log_event(
            store,
            contract.id,
            EventKind::Created,
            Actor::User(created_by),
            json!({
                "title": contract.title,
                "template_id": contract.template_id,
                "customer_id": contract.customer_id,
            }),
        )?;
        info!(contract_id = %contract.id, %company_id, "contract created");
        Ok(contract)
    })
}

pub fn get_contract<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
    contract_id: Uuid,
) -> StoreResult<Option<Contract>> {
    Ok(store
        .find_contract(contract_id)?
        .filter(|contract| contract.company_id == company_id))
}

pub fn list_contracts<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
) -> StoreResult<Vec<Contract>> {
    store.list_contracts(company_id)
}

/// Returns false when the contract does not exist for this company.
/// `Signed` is refused here; only `sign_contract` completes a contract.
pub fn update_status<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
    contract_id: Uuid,
    next: ContractStatus,
    actor: Actor,
) -> ContractResult<bool> {
    store.in_transaction::<_, ContractError, _>(|store| {
        let Some(contract) = lock_owned(store, company_id, contract_id)? else {
            return Ok(false);
        };
        if !contract.status.user_can_transition_to(next) {
            return Err(ContractError::InvalidTransition {
                from: contract.status,
                to: next,
            });
        }
        transition(store, &contract, next, actor)?;
        info!(%contract_id, from = %contract.status, to = %next, "contract status changed");
        Ok(true)
    })
}

/// Appends the template's body as the next version.
pub fn insert_template_into_contract<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
    contract_id: Uuid,
    template_id: Uuid,
    actor: Actor,
) -> ContractResult<ContractVersion> {
    store.in_transaction::<_, ContractError, _>(|store| {
        let contract =
            lock_owned(store, company_id, contract_id)?.ok_or(ContractError::NotFound)?;
        let template = store
            .find_template(company_id, template_id)?
            .ok_or(ContractError::NotFound)?;
        require_open(&contract)?;

        let version = append_version(store, contract_id, &template.body, MergeData::new())?;
        log_event(
            store,
            contract_id,
            EventKind::TemplateInserted,
            actor,
            json!({
                "template_id": template.id,
                "template_name": template.name,
                "version": version.version,
            }),
        )?;
        Ok(version)
    })
}

/// Saves an edited body (and the merge values used with it) as the next
/// version.
pub fn update_contract_body<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
    contract_id: Uuid,
    body: &str,
    merge_data: MergeData,
    actor: Actor,
) -> ContractResult<ContractVersion> {
    store.in_transaction::<_, ContractError, _>(|store| {
        let contract =
            lock_owned(store, company_id, contract_id)?.ok_or(ContractError::NotFound)?;
        require_open(&contract)?;

        let version = append_version(store, contract_id, body, merge_data)?;
        log_event(
            store,
            contract_id,
            EventKind::VersionCreated,
            actor,
            json!({ "version": version.version }),
        )?;
        Ok(version)
    })
}

pub fn render_contract<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
    contract_id: Uuid,
    merge_data: &MergeData,
) -> ContractResult<String> {
    get_contract(store, company_id, contract_id)?.ok_or(ContractError::NotFound)?;
    versions::render_current(store, contract_id, merge_data)
}

pub fn list_contract_versions<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
    contract_id: Uuid,
) -> StoreResult<Option<Vec<ContractVersion>>> {
    if get_contract(store, company_id, contract_id)?.is_none() {
        return Ok(None);
    }
    versions::list_versions(store, contract_id).map(Some)
}

pub fn list_contract_signers<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
    contract_id: Uuid,
) -> StoreResult<Option<Vec<ContractSigner>>> {
    if get_contract(store, company_id, contract_id)?.is_none() {
        return Ok(None);
    }
    signers::get_signers(store, contract_id).map(Some)
}

pub fn list_contract_events<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
    contract_id: Uuid,
) -> StoreResult<Option<Vec<ContractEvent>>> {
    if get_contract(store, company_id, contract_id)?.is_none() {
        return Ok(None);
    }
    events::list_events(store, contract_id).map(Some)
}

pub fn add_contract_signer<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
    contract_id: Uuid,
    input: SignerInput,
    actor: Actor,
) -> ContractResult<ContractSigner> {
    if input.name.trim().is_empty() {
        return Err(ContractError::validation("signer name must not be empty"));
    }
    if input.email.is_none() && input.phone.is_none() {
        return Err(ContractError::validation(
            "signer needs an email address or phone number",
        ));
    }

    store.in_transaction::<_, ContractError, _>(|store| {
        let contract =
            lock_owned(store, company_id, contract_id)?.ok_or(ContractError::NotFound)?;
        require_open(&contract)?;

        let signer = signers::add_signer(store, contract_id, input)?;
        log_event(
            store,
            contract_id,
            EventKind::SignerAdded,
            actor,
            json!({
                "signer_id": signer.id,
                "name": signer.name,
                "order_index": signer.order_index,
            }),
        )?;
        Ok(signer)
    })
}

fn signing_link(public_base_url: &str, token: &str) -> String {
    format!("{}/sign/{}", public_base_url.trim_end_matches('/'), token)
}

/// Sends the contract out for signature: every signer that has not signed
/// yet gets a fresh magic link through the delivery queue. A contract that
/// is already `sent` can be sent again to re-issue links.
///
/// Returns the ids of the signers a link was issued for.
pub fn send_contract<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
    contract_id: Uuid,
    actor: Actor,
    public_base_url: &str,
) -> ContractResult<Vec<Uuid>> {
    store.in_transaction::<_, ContractError, _>(|store| {
        let contract =
            lock_owned(store, company_id, contract_id)?.ok_or(ContractError::NotFound)?;
        let signers = store.list_signers(contract_id)?;
        if signers.is_empty() {
            return Err(ContractError::NoSigners);
        }

        match contract.status {
            ContractStatus::Draft => transition(store, &contract, ContractStatus::Sent, actor)?,
            ContractStatus::Sent => {}
            other => {
                return Err(ContractError::InvalidTransition {
                    from: other,
                    to: ContractStatus::Sent,
                })
            }
        }

        let mut notified = Vec::new();
        for signer in signers.into_iter().filter(|signer| !signer.has_signed) {
            let token = generate_token(store, contract_id, signer.id)?;
            let channel = if signer.email.is_some() { "email" } else { "sms" };
            store.enqueue_delivery(&Delivery::SigningLink {
                contract_id,
                signer_id: signer.id,
                recipient: signer.name.clone(),
                email: signer.email.clone(),
                phone: signer.phone.clone(),
                contract_title: contract.title.clone(),
                link: signing_link(public_base_url, &token),
            })?;
            log_event(
                store,
                contract_id,
                EventKind::EmailSent,
                actor,
                json!({ "signer_id": signer.id, "channel": channel }),
            )?;
            notified.push(signer.id);
        }

        info!(%contract_id, signers = notified.len(), "contract sent for signature");
        Ok(notified)
    })
}

/// Records a signature and, when it is the last one outstanding, completes
/// the contract and runs the automation hook, all in one transaction.
///
/// Returns false when the signer does not exist on this contract. Signing a
/// second time is accepted and changes nothing.
pub fn sign_contract<S>(
    store: &mut S,
    contract_id: Uuid,
    signer_id: Uuid,
    signature: &SignatureData,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> ContractResult<bool>
where
    S: ContractStore + ProjectStore,
{
    store.in_transaction::<_, ContractError, _>(|store| {
        let Some(contract) = store.lock_contract(contract_id)? else {
            return Ok(false);
        };
        let Some(signer) = store
            .find_signer(signer_id)?
            .filter(|signer| signer.contract_id == contract_id)
        else {
            return Ok(false);
        };
        if signer.has_signed {
            return Ok(true);
        }
        if !contract.status.is_open() {
            return Err(ContractError::NotSignable(contract.status));
        }
        if contract.signing_policy == SigningPolicy::Sequential {
            let waiting_on_earlier = store
                .list_signers(contract_id)?
                .iter()
                .any(|other| other.order_index < signer.order_index && !other.has_signed);
            if waiting_on_earlier {
                return Err(ContractError::OutOfOrder(signer_id));
            }
        }

        if signers::mark_signed(store, signer_id, signature, ip, user_agent)?.is_none() {
            return Ok(false);
        }
        log_event(
            store,
            contract_id,
            EventKind::Signed,
            Actor::Signer(signer_id),
            json!({
                "signer_name": signer.name,
                "method": signature.method.as_str(),
                "ip": ip,
                "user_agent": user_agent,
            }),
        )?;
        info!(%contract_id, %signer_id, "signer signed");

        if signers::all_signed(store, contract_id)? {
            transition(store, &contract, ContractStatus::Signed, Actor::System)?;
            info!(%contract_id, company_id = %contract.company_id, "contract fully executed");
            on_contract_countersigned(store, contract_id, contract.company_id)?;
        }
        Ok(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_link_joins_base_and_token() {
        assert_eq!(
            signing_link("https://app.example.co.za/", "abc"),
            "https://app.example.co.za/sign/abc"
        );
        assert_eq!(signing_link("http://localhost:5173", "t"), "http://localhost:5173/sign/t");
    }

    #[test]
    fn contract_input_defaults_to_any_order() {
        let input: ContractInput = serde_json::from_str(r#"{"title":"Engagement"}"#).unwrap();
        assert_eq!(input.signing_policy, SigningPolicy::AnyOrder);
        assert!(input.template_id.is_none());
    }
}
