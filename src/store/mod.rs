//! Data-mapper seam between the contract core and the row store.
//!
//! Core operations are generic over [`ContractStore`] and [`ProjectStore`].
//! `PgConnection` implements both against PostgreSQL; [`MemoryStore`] keeps
//! everything in process and backs the test-suite.

use chrono::NaiveDateTime;
use thiserror::Error;
use uuid::Uuid;

use crate::contracts::types::ContractStatus;
use crate::jobs::{Delivery, JobQueueError};
use crate::models::{
    Contract, ContractEvent, ContractSigner, ContractTemplate, ContractToken, ContractVersion,
    Customer, NewContract, NewContractEvent, NewContractSigner, NewContractTemplate,
    NewContractToken, NewContractVersion, NewCustomer, NewProject, NewTask, Project, SignerChanges,
    Task, TemplateChanges,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("failed to encode payload: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Database(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ))
        )
    }
}

impl From<JobQueueError> for StoreError {
    fn from(value: JobQueueError) -> Self {
        match value {
            JobQueueError::Database(err) => StoreError::Database(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait ContractStore {
    /// Runs `f` atomically. Any error rolls back every write made inside it;
    /// nested calls behave like savepoints.
    fn in_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>;

    fn insert_template(&mut self, template: NewContractTemplate) -> StoreResult<ContractTemplate>;

    /// Inserts unless `(company_id, name)` already exists, in which case
    /// nothing is written and `None` is returned.
    fn insert_template_if_absent(
        &mut self,
        template: NewContractTemplate,
    ) -> StoreResult<Option<ContractTemplate>>;

    fn find_template(
        &mut self,
        company_id: Uuid,
        template_id: Uuid,
    ) -> StoreResult<Option<ContractTemplate>>;

    fn list_templates(&mut self, company_id: Uuid) -> StoreResult<Vec<ContractTemplate>>;

    fn update_template(
        &mut self,
        company_id: Uuid,
        template_id: Uuid,
        changes: TemplateChanges,
    ) -> StoreResult<Option<ContractTemplate>>;

    fn delete_template(&mut self, company_id: Uuid, template_id: Uuid) -> StoreResult<bool>;

    fn template_in_use(&mut self, template_id: Uuid) -> StoreResult<bool>;

    fn insert_contract(&mut self, contract: NewContract) -> StoreResult<Contract>;

    fn find_contract(&mut self, contract_id: Uuid) -> StoreResult<Option<Contract>>;

    /// Like [`find_contract`](Self::find_contract) but holds a row lock until
    /// the surrounding transaction ends.
    fn lock_contract(&mut self, contract_id: Uuid) -> StoreResult<Option<Contract>>;

    fn list_contracts(&mut self, company_id: Uuid) -> StoreResult<Vec<Contract>>;

    /// Moves the status only if it still equals `expected`.
    fn compare_and_set_status(
        &mut self,
        contract_id: Uuid,
        expected: ContractStatus,
        next: ContractStatus,
    ) -> StoreResult<bool>;

    /// Sets `project_id` only while it is still unset.
    fn link_project(&mut self, contract_id: Uuid, project_id: Uuid) -> StoreResult<bool>;

    fn insert_version(&mut self, version: NewContractVersion) -> StoreResult<ContractVersion>;

    fn latest_version(&mut self, contract_id: Uuid) -> StoreResult<Option<ContractVersion>>;

    fn list_versions(&mut self, contract_id: Uuid) -> StoreResult<Vec<ContractVersion>>;

    fn insert_signer(&mut self, signer: NewContractSigner) -> StoreResult<ContractSigner>;

    fn find_signer(&mut self, signer_id: Uuid) -> StoreResult<Option<ContractSigner>>;

    /// Signers of a contract ordered by `order_index`, then creation time.
    fn list_signers(&mut self, contract_id: Uuid) -> StoreResult<Vec<ContractSigner>>;

    fn update_signer(
        &mut self,
        signer_id: Uuid,
        changes: SignerChanges,
    ) -> StoreResult<Option<ContractSigner>>;

    fn insert_event(&mut self, event: NewContractEvent) -> StoreResult<ContractEvent>;

    /// Events in insertion order.
    fn list_events(&mut self, contract_id: Uuid) -> StoreResult<Vec<ContractEvent>>;

    fn insert_token(&mut self, token: NewContractToken) -> StoreResult<ContractToken>;

    fn find_unused_token(&mut self, token_hash: &str) -> StoreResult<Option<ContractToken>>;

    /// Flips `used` to true; false when the row is missing or already used.
    fn mark_token_used(&mut self, token_id: Uuid) -> StoreResult<bool>;

    fn latest_token_for_signer(
        &mut self,
        contract_id: Uuid,
        signer_id: Uuid,
    ) -> StoreResult<Option<ContractToken>>;

    fn set_token_otp(
        &mut self,
        token_id: Uuid,
        otp_hash: Option<String>,
        otp_expires_at: Option<NaiveDateTime>,
    ) -> StoreResult<bool>;

    /// Clears OTP hashes whose expiry lies before `now`. Returns rows touched.
    fn purge_expired_otps(&mut self, now: NaiveDateTime) -> StoreResult<usize>;

    /// Hands a message to the outbound delivery queue as part of the
    /// current transaction.
    fn enqueue_delivery(&mut self, delivery: &Delivery) -> StoreResult<()>;
}

/// The slice of the customer/project module the automation hook consumes.
pub trait ProjectStore {
    fn find_customer(&mut self, company_id: Uuid, customer_id: Uuid)
        -> StoreResult<Option<Customer>>;

    fn insert_customer(&mut self, customer: NewCustomer) -> StoreResult<Customer>;

    fn insert_project(&mut self, project: NewProject) -> StoreResult<Project>;

    fn find_project(&mut self, company_id: Uuid, project_id: Uuid) -> StoreResult<Option<Project>>;

    fn insert_task(&mut self, task: NewTask) -> StoreResult<Task>;

    fn list_tasks(&mut self, project_id: Uuid) -> StoreResult<Vec<Task>>;
}
