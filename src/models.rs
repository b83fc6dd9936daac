use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::contracts::types::{ContractStatus, EventKind, ServicePackage, SigningPolicy};
use crate::schema::*;

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = contract_templates)]
pub struct ContractTemplate {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub version: i32,
    pub body: String,
    pub fields: serde_json::Value,
    pub service_package: Option<ServicePackage>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ContractTemplate {
    pub fn field_names(&self) -> Vec<String> {
        serde_json::from_value(self.fields.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = contract_templates)]
pub struct NewContractTemplate {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub version: i32,
    pub body: String,
    pub fields: serde_json::Value,
    pub service_package: Option<ServicePackage>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = contracts)]
pub struct Contract {
    pub id: Uuid,
    pub company_id: Uuid,
    pub template_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub status: ContractStatus,
    pub signing_policy: SigningPolicy,
    pub created_by: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = contracts)]
pub struct NewContract {
    pub id: Uuid,
    pub company_id: Uuid,
    pub template_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub title: String,
    pub status: ContractStatus,
    pub signing_policy: SigningPolicy,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, Associations)]
#[diesel(table_name = contract_versions)]
#[diesel(belongs_to(Contract))]
pub struct ContractVersion {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub version: i32,
    pub body: String,
    pub merge_data: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = contract_versions)]
pub struct NewContractVersion {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub version: i32,
    pub body: String,
    pub merge_data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, Associations)]
#[diesel(table_name = contract_signers)]
#[diesel(belongs_to(Contract))]
pub struct ContractSigner {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub order_index: i32,
    pub has_signed: bool,
    pub signed_at: Option<NaiveDateTime>,
    pub signature_data: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = contract_signers)]
pub struct NewContractSigner {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub order_index: i32,
}

/// Partial signer update. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = contract_signers)]
pub struct SignerChanges {
    pub name: Option<String>,
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub order_index: Option<i32>,
    pub has_signed: Option<bool>,
    pub signed_at: Option<Option<NaiveDateTime>>,
    pub signature_data: Option<Option<serde_json::Value>>,
    pub ip: Option<Option<String>>,
    pub user_agent: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, Associations)]
#[diesel(table_name = contract_events)]
#[diesel(belongs_to(Contract))]
pub struct ContractEvent {
    pub id: i64,
    pub contract_id: Uuid,
    pub kind: EventKind,
    pub actor: String,
    pub meta: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = contract_events)]
pub struct NewContractEvent {
    pub contract_id: Uuid,
    pub kind: EventKind,
    pub actor: String,
    pub meta: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = contract_tokens)]
#[diesel(belongs_to(Contract))]
#[diesel(belongs_to(ContractSigner, foreign_key = signer_id))]
pub struct ContractToken {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub signer_id: Uuid,
    pub token_hash: String,
    pub used: bool,
    pub otp_hash: Option<String>,
    pub otp_expires_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = contract_tokens)]
pub struct NewContractToken {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub signer_id: Uuid,
    pub token_hash: String,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = customers)]
pub struct Customer {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = customers)]
pub struct NewCustomer {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable)]
#[diesel(table_name = projects)]
pub struct Project {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub created_by: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = projects)]
pub struct NewProject {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, Associations)]
#[diesel(table_name = tasks)]
#[diesel(belongs_to(Project))]
pub struct Task {
    pub id: Uuid,
    pub company_id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub created_by: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask {
    pub id: Uuid,
    pub company_id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}

/// Partial template update. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = contract_templates)]
pub struct TemplateChanges {
    pub name: Option<String>,
    pub version: Option<i32>,
    pub body: Option<String>,
    pub fields: Option<serde_json::Value>,
    pub service_package: Option<Option<ServicePackage>>,
}
