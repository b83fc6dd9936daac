use chrono::{NaiveDateTime, Utc};
use diesel::dsl::exists;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use super::{ContractStore, ProjectStore, StoreError, StoreResult};
use crate::contracts::types::ContractStatus;
use crate::jobs::{enqueue_job, Delivery};
use crate::models::{
    Contract, ContractEvent, ContractSigner, ContractTemplate, ContractToken, ContractVersion,
    Customer, NewContract, NewContractEvent, NewContractSigner, NewContractTemplate,
    NewContractToken, NewContractVersion, NewCustomer, NewProject, NewTask, Project, SignerChanges,
    Task, TemplateChanges,
};
use crate::schema::{
    contract_events, contract_signers, contract_templates, contract_tokens, contract_versions,
    contracts, customers, projects, tasks,
};

enum TxError<E> {
    Inner(E),
    Database(diesel::result::Error),
}

impl<E> From<diesel::result::Error> for TxError<E> {
    fn from(value: diesel::result::Error) -> Self {
        TxError::Database(value)
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

impl ContractStore for PgConnection {
    fn in_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        Connection::transaction::<T, TxError<E>, _>(self, |conn| f(conn).map_err(TxError::Inner))
            .map_err(|err| match err {
                TxError::Inner(inner) => inner,
                TxError::Database(err) => E::from(StoreError::from(err)),
            })
    }

    fn insert_template(&mut self, template: NewContractTemplate) -> StoreResult<ContractTemplate> {
        Ok(diesel::insert_into(contract_templates::table)
            .values(&template)
            .get_result(self)?)
    }

    fn insert_template_if_absent(
        &mut self,
        template: NewContractTemplate,
    ) -> StoreResult<Option<ContractTemplate>> {
        Ok(diesel::insert_into(contract_templates::table)
            .values(&template)
            .on_conflict((contract_templates::company_id, contract_templates::name))
            .do_nothing()
            .get_result(self)
            .optional()?)
    }

    fn find_template(
        &mut self,
        company_id: Uuid,
        template_id: Uuid,
    ) -> StoreResult<Option<ContractTemplate>> {
        Ok(contract_templates::table
            .filter(contract_templates::id.eq(template_id))
            .filter(contract_templates::company_id.eq(company_id))
            .first(self)
            .optional()?)
    }

    fn list_templates(&mut self, company_id: Uuid) -> StoreResult<Vec<ContractTemplate>> {
        Ok(contract_templates::table
            .filter(contract_templates::company_id.eq(company_id))
            .order(contract_templates::name.asc())
            .load(self)?)
    }

    fn update_template(
        &mut self,
        company_id: Uuid,
        template_id: Uuid,
        changes: TemplateChanges,
    ) -> StoreResult<Option<ContractTemplate>> {
        Ok(diesel::update(
            contract_templates::table
                .filter(contract_templates::id.eq(template_id))
                .filter(contract_templates::company_id.eq(company_id)),
        )
        .set((&changes, contract_templates::updated_at.eq(now())))
        .get_result(self)
        .optional()?)
    }

    fn delete_template(&mut self, company_id: Uuid, template_id: Uuid) -> StoreResult<bool> {
        let deleted = diesel::delete(
            contract_templates::table
                .filter(contract_templates::id.eq(template_id))
                .filter(contract_templates::company_id.eq(company_id)),
        )
        .execute(self)?;
        Ok(deleted > 0)
    }

    fn template_in_use(&mut self, template_id: Uuid) -> StoreResult<bool> {
        Ok(diesel::select(exists(
            contracts::table.filter(contracts::template_id.eq(Some(template_id))),
        ))
        .get_result(self)?)
    }

    fn insert_contract(&mut self, contract: NewContract) -> StoreResult<Contract> {
        Ok(diesel::insert_into(contracts::table)
            .values(&contract)
            .get_result(self)?)
    }

    fn find_contract(&mut self, contract_id: Uuid) -> StoreResult<Option<Contract>> {
        Ok(contracts::table.find(contract_id).first(self).optional()?)
    }

    fn lock_contract(&mut self, contract_id: Uuid) -> StoreResult<Option<Contract>> {
        Ok(contracts::table
            .find(contract_id)
            .for_update()
            .first(self)
            .optional()?)
    }

    fn list_contracts(&mut self, company_id: Uuid) -> StoreResult<Vec<Contract>> {
        Ok(contracts::table
            .filter(contracts::company_id.eq(company_id))
            .order(contracts::created_at.desc())
            .load(self)?)
    }

    fn compare_and_set_status(
        &mut self,
        contract_id: Uuid,
        expected: ContractStatus,
        next: ContractStatus,
    ) -> StoreResult<bool> {
        let updated = diesel::update(
            contracts::table
                .filter(contracts::id.eq(contract_id))
                .filter(contracts::status.eq(expected)),
        )
        .set((contracts::status.eq(next), contracts::updated_at.eq(now())))
        .execute(self)?;
        Ok(updated > 0)
    }

    fn link_project(&mut self, contract_id: Uuid, project_id: Uuid) -> StoreResult<bool> {
        let updated = diesel::update(
            contracts::table
                .filter(contracts::id.eq(contract_id))
                .filter(contracts::project_id.is_null()),
        )
        .set((
            contracts::project_id.eq(Some(project_id)),
            contracts::updated_at.eq(now()),
        ))
        .execute(self)?;
        Ok(updated > 0)
    }

    fn insert_version(&mut self, version: NewContractVersion) -> StoreResult<ContractVersion> {
        Ok(diesel::insert_into(contract_versions::table)
            .values(&version)
            .get_result(self)?)
    }

    fn latest_version(&mut self, contract_id: Uuid) -> StoreResult<Option<ContractVersion>> {
        Ok(contract_versions::table
            .filter(contract_versions::contract_id.eq(contract_id))
            .order(contract_versions::version.desc())
            .first(self)
            .optional()?)
    }

    fn list_versions(&mut self, contract_id: Uuid) -> StoreResult<Vec<ContractVersion>> {
        Ok(contract_versions::table
            .filter(contract_versions::contract_id.eq(contract_id))
            .order(contract_versions::version.asc())
            .load(self)?)
    }

    fn insert_signer(&mut self, signer: NewContractSigner) -> StoreResult<ContractSigner> {
        Ok(diesel::insert_into(contract_signers::table)
            .values(&signer)
            .get_result(self)?)
    }

    fn find_signer(&mut self, signer_id: Uuid) -> StoreResult<Option<ContractSigner>> {
        Ok(contract_signers::table
            .find(signer_id)
            .first(self)
            .optional()?)
    }

    fn list_signers(&mut self, contract_id: Uuid) -> StoreResult<Vec<ContractSigner>> {
        Ok(contract_signers::table
            .filter(contract_signers::contract_id.eq(contract_id))
            .order((
                contract_signers::order_index.asc(),
                contract_signers::created_at.asc(),
            ))
            .load(self)?)
    }

    fn update_signer(
        &mut self,
        signer_id: Uuid,
        changes: SignerChanges,
    ) -> StoreResult<Option<ContractSigner>> {
        Ok(diesel::update(contract_signers::table.find(signer_id))
            .set((&changes, contract_signers::updated_at.eq(now())))
            .get_result(self)
            .optional()?)
    }

    fn insert_event(&mut self, event: NewContractEvent) -> StoreResult<ContractEvent> {
        Ok(diesel::insert_into(contract_events::table)
            .values(&event)
            .get_result(self)?)
    }

    fn list_events(&mut self, contract_id: Uuid) -> StoreResult<Vec<ContractEvent>> {
        Ok(contract_events::table
            .filter(contract_events::contract_id.eq(contract_id))
            .order(contract_events::id.asc())
            .load(self)?)
    }

    fn insert_token(&mut self, token: NewContractToken) -> StoreResult<ContractToken> {
        Ok(diesel::insert_into(contract_tokens::table)
            .values(&token)
            .get_result(self)?)
    }

    fn find_unused_token(&mut self, token_hash: &str) -> StoreResult<Option<ContractToken>> {
        Ok(contract_tokens::table
            .filter(contract_tokens::token_hash.eq(token_hash))
            .filter(contract_tokens::used.eq(false))
            .first(self)
            .optional()?)
    }

    fn mark_token_used(&mut self, token_id: Uuid) -> StoreResult<bool> {
        let updated = diesel::update(
            contract_tokens::table
                .filter(contract_tokens::id.eq(token_id))
                .filter(contract_tokens::used.eq(false)),
        )
        .set(contract_tokens::used.eq(true))
        .execute(self)?;
        Ok(updated > 0)
    }

    fn latest_token_for_signer(
        &mut self,
        contract_id: Uuid,
        signer_id: Uuid,
    ) -> StoreResult<Option<ContractToken>> {
        Ok(contract_tokens::table
            .filter(contract_tokens::contract_id.eq(contract_id))
            .filter(contract_tokens::signer_id.eq(signer_id))
            .order(contract_tokens::created_at.desc())
            .first(self)
            .optional()?)
    }

    fn set_token_otp(
        &mut self,
        token_id: Uuid,
        otp_hash: Option<String>,
        otp_expires_at: Option<NaiveDateTime>,
    ) -> StoreResult<bool> {
        let updated = diesel::update(contract_tokens::table.find(token_id))
            .set((
                contract_tokens::otp_hash.eq(otp_hash),
                contract_tokens::otp_expires_at.eq(otp_expires_at),
            ))
            .execute(self)?;
        Ok(updated > 0)
    }

    fn purge_expired_otps(&mut self, now: NaiveDateTime) -> StoreResult<usize> {
        Ok(
            diesel::update(contract_tokens::table.filter(contract_tokens::otp_expires_at.lt(now)))
                .set((
                    contract_tokens::otp_hash.eq(None::<String>),
                    contract_tokens::otp_expires_at.eq(None::<NaiveDateTime>),
                ))
                .execute(self)?,
        )
    }

    fn enqueue_delivery(&mut self, delivery: &Delivery) -> StoreResult<()> {
        let payload = serde_json::to_value(delivery)?;
        enqueue_job(self, delivery.job_type(), payload, None)?;
        Ok(())
    }
}

impl ProjectStore for PgConnection {
    fn find_customer(
        &mut self,
        company_id: Uuid,
        customer_id: Uuid,
    ) -> StoreResult<Option<Customer>> {
        Ok(customers::table
            .filter(customers::id.eq(customer_id))
            .filter(customers::company_id.eq(company_id))
            .first(self)
            .optional()?)
    }

    fn insert_customer(&mut self, customer: NewCustomer) -> StoreResult<Customer> {
        Ok(diesel::insert_into(customers::table)
            .values(&customer)
            .get_result(self)?)
    }

    fn insert_project(&mut self, project: NewProject) -> StoreResult<Project> {
        Ok(diesel::insert_into(projects::table)
            .values(&project)
            .get_result(self)?)
    }

    fn find_project(&mut self, company_id: Uuid, project_id: Uuid) -> StoreResult<Option<Project>> {
        Ok(projects::table
            .filter(projects::id.eq(project_id))
            .filter(projects::company_id.eq(company_id))
            .first(self)
            .optional()?)
    }

    fn insert_task(&mut self, task: NewTask) -> StoreResult<Task> {
        Ok(diesel::insert_into(tasks::table)
            .values(&task)
            .get_result(self)?)
    }

    fn list_tasks(&mut self, project_id: Uuid) -> StoreResult<Vec<Task>> {
        Ok(tasks::table
            .filter(tasks::project_id.eq(project_id))
            .order(tasks::created_at.asc())
            .load(self)?)
    }
}
