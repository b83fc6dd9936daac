use thiserror::Error;
use uuid::Uuid;

use super::types::{ContractStatus, UnknownVariant};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ContractError {
    /// Missing, or owned by another company.
    #[error("not found")]
    NotFound,
    /// Bad, expired or spent token/OTP. The message never says which.
    #[error("verification failed, please request a new link")]
    InvalidCredential,
    #[error("cannot move contract from {from} to {to}")]
    InvalidTransition {
        from: ContractStatus,
        to: ContractStatus,
    },
    #[error(transparent)]
    UnknownValue(#[from] UnknownVariant),
    #[error("contract has no signers")]
    NoSigners,
    #[error("contract is {0} and no longer accepts signatures")]
    NotSignable(ContractStatus),
    #[error("contract is {0} and can no longer be changed")]
    Closed(ContractStatus),
    #[error("signer {0} must wait for earlier signers")]
    OutOfOrder(Uuid),
    #[error("signer {0} has no signing session")]
    NoSigningSession(Uuid),
    #[error("template is referenced by contracts")]
    TemplateInUse,
    #[error("{0}")]
    Validation(String),
    /// Another writer completed the same transition first.
    #[error("contract was modified concurrently")]
    Conflict,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ContractError {
    pub fn validation(message: impl Into<String>) -> Self {
        ContractError::Validation(message.into())
    }
}

pub type ContractResult<T> = Result<T, ContractError>;
