mod common;

use chrono::{Duration, Utc};
use common::Firm;
use contracts_backend::contracts::automation::tasks_for;
use contracts_backend::contracts::signers::all_signed;
use contracts_backend::contracts::tokens::{
    generate_otp_at, generate_token, use_token, validate_token, verify_otp_at,
};
use contracts_backend::contracts::{
    self, Actor, ContractError, ContractStatus, EventKind, ServicePackage, SignatureData,
    SignatureMethod, SigningPolicy,
};
use contracts_backend::store::{ContractStore, ProjectStore};
use uuid::Uuid;

fn typed(name: &str) -> SignatureData {
    SignatureData {
        method: SignatureMethod::Typed,
        payload: name.to_string(),
    }
}

fn count(firm: &mut Firm, contract_id: Uuid, kind: EventKind) -> usize {
    firm.store
        .list_events(contract_id)
        .unwrap()
        .iter()
        .filter(|event| event.kind == kind)
        .count()
}

fn status(firm: &mut Firm, contract_id: Uuid) -> ContractStatus {
    firm.store.find_contract(contract_id).unwrap().unwrap().status
}

#[test]
fn tokens_are_single_use() {
    let mut firm = Firm::new(None);
    let contract = firm.create_contract(SigningPolicy::AnyOrder);
    let signer = firm.add_signer(contract.id, "Thandi", 0);

    let token = generate_token(&mut firm.store, contract.id, signer).unwrap();
    let scope = validate_token(&mut firm.store, &token).unwrap().unwrap();
    assert_eq!((scope.contract_id, scope.signer_id), (contract.id, signer));

    assert!(use_token(&mut firm.store, &token).unwrap());
    assert!(!use_token(&mut firm.store, &token).unwrap());
    assert!(validate_token(&mut firm.store, &token).unwrap().is_none());
    assert!(validate_token(&mut firm.store, "not-a-token").unwrap().is_none());
}

#[test]
fn otp_expires_after_ten_minutes_and_is_consumed() {
    let mut firm = Firm::new(None);
    let contract = firm.create_contract(SigningPolicy::AnyOrder);
    let signer = firm.add_signer(contract.id, "Thandi", 0);
    generate_token(&mut firm.store, contract.id, signer).unwrap();

    let issued = Utc::now().naive_utc();
    let code = generate_otp_at(&mut firm.store, contract.id, signer, issued).unwrap();
    assert_eq!(code.len(), 6);
    let wrong = if code == "123456" { "654321" } else { "123456" };

    assert!(!verify_otp_at(
        &mut firm.store,
        contract.id,
        signer,
        wrong,
        issued + Duration::minutes(1)
    )
    .unwrap());
    assert!(!verify_otp_at(
        &mut firm.store,
        contract.id,
        signer,
        &code,
        issued + Duration::minutes(10)
    )
    .unwrap());
    assert!(verify_otp_at(
        &mut firm.store,
        contract.id,
        signer,
        &code,
        issued + Duration::minutes(9)
    )
    .unwrap());
    assert!(!verify_otp_at(
        &mut firm.store,
        contract.id,
        signer,
        &code,
        issued + Duration::minutes(9)
    )
    .unwrap());

    assert_eq!(count(&mut firm, contract.id, EventKind::OtpSent), 1);
    assert_eq!(count(&mut firm, contract.id, EventKind::OtpVerified), 1);
}

#[test]
fn otp_needs_an_unused_token() {
    let mut firm = Firm::new(None);
    let contract = firm.create_contract(SigningPolicy::AnyOrder);
    let signer = firm.add_signer(contract.id, "Thandi", 0);

    let err = generate_otp_at(&mut firm.store, contract.id, signer, Utc::now().naive_utc())
        .unwrap_err();
    assert!(matches!(err, ContractError::NoSigningSession(id) if id == signer));
}

#[test]
fn all_signed_requires_at_least_one_signer() {
    let mut firm = Firm::new(None);
    let contract = firm.create_contract(SigningPolicy::AnyOrder);
    assert!(!all_signed(&mut firm.store, contract.id).unwrap());

    let a = firm.add_signer(contract.id, "Thandi", 0);
    firm.add_signer(contract.id, "Pieter", 1);
    assert!(!all_signed(&mut firm.store, contract.id).unwrap());

    assert!(contracts::sign_contract(
        &mut firm.store,
        contract.id,
        a,
        &typed("Thandi"),
        None,
        None
    )
    .unwrap());
    assert!(!all_signed(&mut firm.store, contract.id).unwrap());
}

#[test]
fn two_signers_complete_the_contract_and_provision_work() {
    let mut firm = Firm::new(Some(ServicePackage::AuditServices));
    let contract = firm.create_contract(SigningPolicy::AnyOrder);
    let a = firm.add_signer(contract.id, "Thandi", 0);
    let b = firm.add_signer(contract.id, "Pieter", 1);
    let links = firm.send(contract.id);
    let token_a = links.iter().find(|(id, _)| *id == a).unwrap().1.clone();
    let token_b = links.iter().find(|(id, _)| *id == b).unwrap().1.clone();

    let session = contracts::open_session(&mut firm.store, &token_a).unwrap();
    assert_eq!(session.signer_id, a);
    assert!(!session.has_signed);
    assert_eq!(session.version, Some(1));

    let code_a = firm.request_otp(&token_a);
    let receipt = contracts::complete_signing(
        &mut firm.store,
        &token_a,
        &code_a,
        &typed("Thandi"),
        Some("196.25.1.1"),
        Some("test-agent"),
    )
    .unwrap();
    assert_eq!(receipt.contract_status, ContractStatus::Sent);
    assert!(firm
        .store
        .find_contract(contract.id)
        .unwrap()
        .unwrap()
        .project_id
        .is_none());

    let code_b = firm.request_otp(&token_b);
    let receipt = contracts::complete_signing(
        &mut firm.store,
        &token_b,
        &code_b,
        &SignatureData {
            method: SignatureMethod::Click,
            payload: String::new(),
        },
        None,
        None,
    )
    .unwrap();
    assert_eq!(receipt.contract_status, ContractStatus::Signed);

    let signed = firm.store.find_contract(contract.id).unwrap().unwrap();
    assert_eq!(signed.status, ContractStatus::Signed);
    let project_id = signed.project_id.unwrap();
    assert_eq!(
        firm.store.list_tasks(project_id).unwrap().len(),
        tasks_for(ServicePackage::AuditServices).len()
    );
    assert_eq!(count(&mut firm, contract.id, EventKind::ProjectCreated), 1);
    assert_eq!(count(&mut firm, contract.id, EventKind::Signed), 2);

    let events = firm.store.list_events(contract.id).unwrap();
    let signed_event = events
        .iter()
        .find(|e| e.kind == EventKind::Signed)
        .unwrap();
    assert_eq!(signed_event.actor, Actor::Signer(a).to_string());
    assert_eq!(signed_event.meta["ip"], "196.25.1.1");
    assert_eq!(signed_event.meta["method"], "typed");
    let completed = events
        .iter()
        .find(|e| e.kind == EventKind::StatusChanged && e.meta["to"] == "signed")
        .unwrap();
    assert_eq!(completed.actor, "system");

    let reused = contracts::complete_signing(
        &mut firm.store,
        &token_a,
        &code_a,
        &typed("Thandi"),
        None,
        None,
    )
    .unwrap_err();
    assert!(matches!(reused, ContractError::InvalidCredential));
    assert!(matches!(
        contracts::open_session(&mut firm.store, &token_a),
        Err(ContractError::InvalidCredential)
    ));
}

#[test]
fn sequential_signing_waits_for_earlier_signers() {
    let mut firm = Firm::new(None);
    let contract = firm.create_contract(SigningPolicy::Sequential);
    let a = firm.add_signer(contract.id, "Thandi", 0);
    let b = firm.add_signer(contract.id, "Pieter", 1);
    let links = firm.send(contract.id);
    let token_a = links.iter().find(|(id, _)| *id == a).unwrap().1.clone();
    let token_b = links.iter().find(|(id, _)| *id == b).unwrap().1.clone();

    let code_b = firm.request_otp(&token_b);
    let err = contracts::complete_signing(
        &mut firm.store,
        &token_b,
        &code_b,
        &typed("Pieter"),
        None,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::OutOfOrder(id) if id == b));
    assert_eq!(count(&mut firm, contract.id, EventKind::Signed), 0);
    // The failed attempt rolled back, so the code and the link still work.
    assert!(validate_token(&mut firm.store, &token_b).unwrap().is_some());

    let code_a = firm.request_otp(&token_a);
    contracts::complete_signing(
        &mut firm.store,
        &token_a,
        &code_a,
        &typed("Thandi"),
        None,
        None,
    )
    .unwrap();

    let receipt = contracts::complete_signing(
        &mut firm.store,
        &token_b,
        &code_b,
        &typed("Pieter"),
        None,
        None,
    )
    .unwrap();
    assert_eq!(receipt.contract_status, ContractStatus::Signed);
}

#[test]
fn wrong_code_signs_nothing() {
    let mut firm = Firm::new(None);
    let contract = firm.create_contract(SigningPolicy::AnyOrder);
    let a = firm.add_signer(contract.id, "Thandi", 0);
    let token = firm.send(contract.id).remove(0).1;
    let code = firm.request_otp(&token);
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let err = contracts::complete_signing(
        &mut firm.store,
        &token,
        wrong,
        &typed("Thandi"),
        None,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, ContractError::InvalidCredential));
    assert_eq!(err.to_string(), ContractError::InvalidCredential.to_string());

    let signer = firm.store.find_signer(a).unwrap().unwrap();
    assert!(!signer.has_signed);
    assert_eq!(status(&mut firm, contract.id), ContractStatus::Sent);

    contracts::complete_signing(&mut firm.store, &token, &code, &typed("Thandi"), None, None)
        .unwrap();
    assert_eq!(status(&mut firm, contract.id), ContractStatus::Signed);
}

#[test]
fn void_contracts_cannot_be_signed() {
    let mut firm = Firm::new(None);
    let contract = firm.create_contract(SigningPolicy::AnyOrder);
    let a = firm.add_signer(contract.id, "Thandi", 0);
    let token = firm.send(contract.id).remove(0).1;
    contracts::update_status(
        &mut firm.store,
        firm.company_id,
        contract.id,
        ContractStatus::Void,
        Actor::User(firm.user_id),
    )
    .unwrap();

    assert!(matches!(
        contracts::request_otp(&mut firm.store, &token),
        Err(ContractError::NotSignable(ContractStatus::Void))
    ));
    assert!(matches!(
        contracts::sign_contract(&mut firm.store, contract.id, a, &typed("Thandi"), None, None),
        Err(ContractError::NotSignable(ContractStatus::Void))
    ));
    assert_eq!(count(&mut firm, contract.id, EventKind::Signed), 0);
}

#[test]
fn signing_twice_changes_nothing() {
    let mut firm = Firm::new(None);
    let contract = firm.create_contract(SigningPolicy::AnyOrder);
    let a = firm.add_signer(contract.id, "Thandi", 0);
    firm.add_signer(contract.id, "Pieter", 1);

    for _ in 0..2 {
        assert!(contracts::sign_contract(
            &mut firm.store,
            contract.id,
            a,
            &typed("Thandi"),
            None,
            None
        )
        .unwrap());
    }
    assert_eq!(count(&mut firm, contract.id, EventKind::Signed), 1);
    assert_eq!(status(&mut firm, contract.id), ContractStatus::Draft);
}

#[test]
fn signer_from_another_contract_is_rejected() {
    let mut firm = Firm::new(None);
    let first = firm.create_contract(SigningPolicy::AnyOrder);
    let second = firm.create_contract(SigningPolicy::AnyOrder);
    let outsider = firm.add_signer(second.id, "Pieter", 0);

    assert!(!contracts::sign_contract(
        &mut firm.store,
        first.id,
        outsider,
        &typed("Pieter"),
        None,
        None
    )
    .unwrap());
    assert!(!contracts::sign_contract(
        &mut firm.store,
        Uuid::new_v4(),
        outsider,
        &typed("Pieter"),
        None,
        None
    )
    .unwrap());
    assert!(!firm.store.find_signer(outsider).unwrap().unwrap().has_signed);
}

#[test]
fn resending_issues_a_fresh_link() {
    let mut firm = Firm::new(None);
    let contract = firm.create_contract(SigningPolicy::AnyOrder);
    firm.add_signer(contract.id, "Thandi", 0);
    let first = firm.send(contract.id).remove(0).1;
    let second = firm.send(contract.id).remove(0).1;
    assert_ne!(first, second);

    let code = firm.request_otp(&second);
    let receipt = contracts::complete_signing(
        &mut firm.store,
        &second,
        &code,
        &typed("Thandi"),
        None,
        None,
    )
    .unwrap();
    assert_eq!(receipt.contract_status, ContractStatus::Signed);
}

#[test]
fn signed_signer_gets_no_new_code() {
    let mut firm = Firm::new(None);
    let contract = firm.create_contract(SigningPolicy::AnyOrder);
    let a = firm.add_signer(contract.id, "Thandi", 0);
    firm.add_signer(contract.id, "Pieter", 1);
    let links = firm.send(contract.id);
    let (_, token_a) = links
        .into_iter()
        .find(|(signer_id, _)| *signer_id == a)
        .unwrap();

    assert!(contracts::sign_contract(
        &mut firm.store,
        contract.id,
        a,
        &typed("Thandi"),
        None,
        None
    )
    .unwrap());
    assert_eq!(status(&mut firm, contract.id), ContractStatus::Draft);

    let queued = firm.store.deliveries().len();
    contracts::request_otp(&mut firm.store, &token_a).unwrap();
    assert_eq!(firm.store.deliveries().len(), queued);
    assert_eq!(count(&mut firm, contract.id, EventKind::OtpSent), 0);
}
