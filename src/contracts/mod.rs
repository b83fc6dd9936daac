//! Contract lifecycle and e-signature core.
//!
//! Everything here is generic over the row store traits in [`crate::store`],
//! so the same code runs against PostgreSQL and the in-memory store.

pub mod automation;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod signers;
pub mod signing;
pub mod template;
pub mod templates;
pub mod tokens;
pub mod types;
pub mod versions;

pub use automation::{on_contract_countersigned, AutomationOutcome, SkipReason};
pub use error::{ContractError, ContractResult};
pub use lifecycle::{
    add_contract_signer, create_contract, get_contract, insert_template_into_contract,
    list_contract_events, list_contract_signers, list_contract_versions, list_contracts,
    render_contract, send_contract, sign_contract, update_contract_body, update_status,
    ContractInput,
};
pub use signers::SignerInput;
pub use signing::{complete_signing, open_session, request_otp, SigningReceipt, SigningSession};
pub use template::MergeData;
pub use types::{
    Actor, ContractStatus, EventKind, ServicePackage, SignatureData, SignatureMethod,
    SigningPolicy,
};
