//! The signer-facing side of a magic link: open the document, request an
//! OTP, sign.
//!
//! Every credential failure surfaces as [`ContractError::InvalidCredential`]
//! so a caller cannot tell an unknown token from a spent one or a wrong code
//! from an expired one. The distinct reasons only reach the tracing log.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::{ContractError, ContractResult};
use super::lifecycle::sign_contract;
use super::template::MergeData;
use super::tokens::{generate_otp, use_token, validate_token, verify_otp, TokenScope};
use super::types::{ContractStatus, SignatureData, SignatureMethod};
use super::versions;
use crate::jobs::Delivery;
use crate::models::{Contract, ContractSigner};
use crate::store::{ContractStore, ProjectStore};

#[derive(Debug, Clone, Serialize)]
pub struct SigningSession {
    pub contract_id: Uuid,
    pub contract_title: String,
    pub contract_status: ContractStatus,
    pub signer_id: Uuid,
    pub signer_name: String,
    pub has_signed: bool,
    pub version: Option<i32>,
    pub document: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SigningReceipt {
    pub contract_id: Uuid,
    pub signer_id: Uuid,
    pub contract_status: ContractStatus,
}

fn resolve<S: ContractStore>(
    store: &mut S,
    token: &str,
) -> ContractResult<(TokenScope, Contract, ContractSigner)> {
    let scope = validate_token(store, token)?.ok_or(ContractError::InvalidCredential)?;
    let contract = store
        .find_contract(scope.contract_id)?
        .ok_or(ContractError::InvalidCredential)?;
    let signer = store
        .find_signer(scope.signer_id)?
        .filter(|signer| signer.contract_id == contract.id)
        .ok_or(ContractError::InvalidCredential)?;
    Ok((scope, contract, signer))
}

/// Everything the signing page shows. The document is the current version
/// rendered with the merge values stored alongside it.
pub fn open_session<S: ContractStore>(store: &mut S, token: &str) -> ContractResult<SigningSession> {
    let (_, contract, signer) = resolve(store, token)?;
    let current = versions::current_version(store, contract.id)?;
    let document = match &current {
        Some(_) => Some(versions::render_current(store, contract.id, &MergeData::new())?),
        None => None,
    };

    Ok(SigningSession {
        contract_id: contract.id,
        contract_title: contract.title,
        contract_status: contract.status,
        signer_id: signer.id,
        signer_name: signer.name,
        has_signed: signer.has_signed,
        version: current.map(|version| version.version),
        document,
    })
}

/// Issues a fresh OTP for the token's signer and queues it for delivery.
/// Nothing is issued once the signer has signed.
pub fn request_otp<S: ContractStore>(store: &mut S, token: &str) -> ContractResult<()> {
    store.in_transaction::<_, ContractError, _>(|store| {
        let (scope, contract, signer) = resolve(store, token)?;
        if !contract.status.is_open() {
            return Err(ContractError::NotSignable(contract.status));
        }
        if signer.has_signed {
            info!(
                contract_id = %contract.id,
                signer_id = %signer.id,
                "signer already signed, no code issued"
            );
            return Ok(());
        }

        let code = generate_otp(store, scope.contract_id, scope.signer_id)?;
        store.enqueue_delivery(&Delivery::SigningOtp {
            contract_id: contract.id,
            signer_id: signer.id,
            recipient: signer.name,
            email: signer.email,
            phone: signer.phone,
            code,
        })?;
        Ok(())
    })
}

fn validate_signature(signature: &SignatureData) -> ContractResult<()> {
    match signature.method {
        SignatureMethod::Typed | SignatureMethod::Drawn if signature.payload.trim().is_empty() => {
            Err(ContractError::validation(format!(
                "a {} signature needs a payload",
                signature.method.as_str()
            )))
        }
        _ => Ok(()),
    }
}

/// Verifies the OTP, records the signature and spends the token. Nothing is
/// written unless all three succeed.
pub fn complete_signing<S>(
    store: &mut S,
    token: &str,
    code: &str,
    signature: &SignatureData,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> ContractResult<SigningReceipt>
where
    S: ContractStore + ProjectStore,
{
    validate_signature(signature)?;

    store.in_transaction::<_, ContractError, _>(|store| {
        let (scope, _, _) = resolve(store, token)?;
        if !verify_otp(store, scope.contract_id, scope.signer_id, code)? {
            return Err(ContractError::InvalidCredential);
        }
        if !sign_contract(store, scope.contract_id, scope.signer_id, signature, ip, user_agent)? {
            return Err(ContractError::InvalidCredential);
        }
        if !use_token(store, token)? {
            warn!(
                contract_id = %scope.contract_id,
                signer_id = %scope.signer_id,
                reason = "token_spent",
                "signing token rejected"
            );
            return Err(ContractError::InvalidCredential);
        }

        let contract = store
            .find_contract(scope.contract_id)?
            .ok_or(ContractError::NotFound)?;
        Ok(SigningReceipt {
            contract_id: contract.id,
            signer_id: scope.signer_id,
            contract_status: contract.status,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_signatures_need_a_name() {
        let empty = SignatureData {
            method: SignatureMethod::Typed,
            payload: "  ".into(),
        };
        assert!(matches!(
            validate_signature(&empty),
            Err(ContractError::Validation(_))
        ));

        let click = SignatureData {
            method: SignatureMethod::Click,
            payload: String::new(),
        };
        assert!(validate_signature(&click).is_ok());
    }
}
