use chrono::{NaiveDateTime, Utc};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use super::{ContractStore, ProjectStore, StoreError, StoreResult};
use crate::contracts::types::ContractStatus;
use crate::jobs::Delivery;
use crate::models::{
    Contract, ContractEvent, ContractSigner, ContractTemplate, ContractToken, ContractVersion,
    Customer, NewContract, NewContractEvent, NewContractSigner, NewContractTemplate,
    NewContractToken, NewContractVersion, NewCustomer, NewProject, NewTask, Project, SignerChanges,
    Task, TemplateChanges,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    templates: Vec<ContractTemplate>,
    contracts: Vec<Contract>,
    versions: Vec<ContractVersion>,
    signers: Vec<ContractSigner>,
    events: Vec<ContractEvent>,
    tokens: Vec<ContractToken>,
    customers: Vec<Customer>,
    projects: Vec<Project>,
    tasks: Vec<Task>,
    deliveries: Vec<Delivery>,
    next_event_id: i64,
}

/// In-process row store with the same constraints as the SQL schema
/// (unique template names per company, unique version numbers per contract,
/// unique token hashes). Transactions snapshot the tables and restore them
/// when the closure fails.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Tables,
}

fn unique_violation(constraint: &str) -> StoreError {
    StoreError::Database(DieselError::DatabaseError(
        DatabaseErrorKind::UniqueViolation,
        Box::new(format!("duplicate key value violates unique constraint \"{constraint}\"")),
    ))
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages handed to the delivery queue, oldest first.
    pub fn deliveries(&self) -> &[Delivery] {
        &self.tables.deliveries
    }

    /// Every token row, including used ones. Plaintext tokens are never
    /// stored, so this only exposes hashes.
    pub fn tokens(&self) -> &[ContractToken] {
        &self.tables.tokens
    }

    fn token_mut(&mut self, token_id: Uuid) -> Option<&mut ContractToken> {
        self.tables.tokens.iter_mut().find(|t| t.id == token_id)
    }
}

impl ContractStore for MemoryStore {
    fn in_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        let snapshot = self.tables.clone();
        let result = f(self);
        if result.is_err() {
            self.tables = snapshot;
        }
        result
    }

    fn insert_template(&mut self, template: NewContractTemplate) -> StoreResult<ContractTemplate> {
        if self
            .tables
            .templates
            .iter()
            .any(|t| t.company_id == template.company_id && t.name == template.name)
        {
            return Err(unique_violation("contract_templates_company_name_key"));
        }
        let timestamp = now();
        let row = ContractTemplate {
            id: template.id,
            company_id: template.company_id,
            name: template.name,
            version: template.version,
            body: template.body,
            fields: template.fields,
            service_package: template.service_package,
            created_at: timestamp,
            updated_at: timestamp,
        };
        self.tables.templates.push(row.clone());
        Ok(row)
    }

    fn insert_template_if_absent(
        &mut self,
        template: NewContractTemplate,
    ) -> StoreResult<Option<ContractTemplate>> {
        match self.insert_template(template) {
            Ok(row) => Ok(Some(row)),
            Err(err) if err.is_unique_violation() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn find_template(
        &mut self,
        company_id: Uuid,
        template_id: Uuid,
    ) -> StoreResult<Option<ContractTemplate>> {
        Ok(self
            .tables
            .templates
            .iter()
            .find(|t| t.id == template_id && t.company_id == company_id)
            .cloned())
    }

    fn list_templates(&mut self, company_id: Uuid) -> StoreResult<Vec<ContractTemplate>> {
        let mut rows: Vec<ContractTemplate> = self
            .tables
            .templates
            .iter()
            .filter(|t| t.company_id == company_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    fn update_template(
        &mut self,
        company_id: Uuid,
        template_id: Uuid,
        changes: TemplateChanges,
    ) -> StoreResult<Option<ContractTemplate>> {
        if let Some(name) = changes.name.as_deref() {
            if self.tables.templates.iter().any(|t| {
                t.company_id == company_id && t.name == name && t.id != template_id
            }) {
                return Err(unique_violation("contract_templates_company_name_key"));
            }
        }
        let Some(row) = self
            .tables
            .templates
            .iter_mut()
            .find(|t| t.id == template_id && t.company_id == company_id)
        else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            row.name = name;
        }
        if let Some(version) = changes.version {
            row.version = version;
        }
        if let Some(body) = changes.body {
            row.body = body;
        }
        if let Some(fields) = changes.fields {
            row.fields = fields;
        }
        if let Some(service_package) = changes.service_package {
            row.service_package = service_package;
        }
        row.updated_at = now();
        Ok(Some(row.clone()))
    }

    fn delete_template(&mut self, company_id: Uuid, template_id: Uuid) -> StoreResult<bool> {
        let before = self.tables.templates.len();
        self.tables
            .templates
            .retain(|t| !(t.id == template_id && t.company_id == company_id));
        Ok(self.tables.templates.len() < before)
    }

    fn template_in_use(&mut self, template_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .tables
            .contracts
            .iter()
            .any(|c| c.template_id == Some(template_id)))
    }

    fn insert_contract(&mut self, contract: NewContract) -> StoreResult<Contract> {
        let timestamp = now();
        let row = Contract {
            id: contract.id,
            company_id: contract.company_id,
            template_id: contract.template_id,
            customer_id: contract.customer_id,
            project_id: None,
            title: contract.title,
            status: contract.status,
            signing_policy: contract.signing_policy,
            created_by: contract.created_by,
            created_at: timestamp,
            updated_at: timestamp,
        };
        self.tables.contracts.push(row.clone());
        Ok(row)
    }

    fn find_contract(&mut self, contract_id: Uuid) -> StoreResult<Option<Contract>> {
        Ok(self
            .tables
            .contracts
            .iter()
            .find(|c| c.id == contract_id)
            .cloned())
    }

    fn lock_contract(&mut self, contract_id: Uuid) -> StoreResult<Option<Contract>> {
        // `&mut self` already serializes access.
        self.find_contract(contract_id)
    }

    fn list_contracts(&mut self, company_id: Uuid) -> StoreResult<Vec<Contract>> {
        Ok(self
            .tables
            .contracts
            .iter()
            .rev()
            .filter(|c| c.company_id == company_id)
            .cloned()
            .collect())
    }

    fn compare_and_set_status(
        &mut self,
        contract_id: Uuid,
        expected: ContractStatus,
        next: ContractStatus,
    ) -> StoreResult<bool> {
        match self
            .tables
            .contracts
            .iter_mut()
            .find(|c| c.id == contract_id && c.status == expected)
        {
            Some(row) => {
                row.status = next;
                row.updated_at = now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn link_project(&mut self, contract_id: Uuid, project_id: Uuid) -> StoreResult<bool> {
        match self
            .tables
            .contracts
            .iter_mut()
            .find(|c| c.id == contract_id && c.project_id.is_none())
        {
            Some(row) => {
                row.project_id = Some(project_id);
                row.updated_at = now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn insert_version(&mut self, version: NewContractVersion) -> StoreResult<ContractVersion> {
        if self
            .tables
            .versions
            .iter()
            .any(|v| v.contract_id == version.contract_id && v.version == version.version)
        {
            return Err(unique_violation("contract_versions_contract_version_key"));
        }
        let row = ContractVersion {
            id: version.id,
            contract_id: version.contract_id,
            version: version.version,
            body: version.body,
            merge_data: version.merge_data,
            created_at: now(),
        };
        self.tables.versions.push(row.clone());
        Ok(row)
    }

    fn latest_version(&mut self, contract_id: Uuid) -> StoreResult<Option<ContractVersion>> {
        Ok(self
            .tables
            .versions
            .iter()
            .filter(|v| v.contract_id == contract_id)
            .max_by_key(|v| v.version)
            .cloned())
    }

    fn list_versions(&mut self, contract_id: Uuid) -> StoreResult<Vec<ContractVersion>> {
        let mut rows: Vec<ContractVersion> = self
            .tables
            .versions
            .iter()
            .filter(|v| v.contract_id == contract_id)
            .cloned()
            .collect();
        rows.sort_by_key(|v| v.version);
        Ok(rows)
    }

    fn insert_signer(&mut self, signer: NewContractSigner) -> StoreResult<ContractSigner> {
        let timestamp = now();
        let row = ContractSigner {
            id: signer.id,
            contract_id: signer.contract_id,
            name: signer.name,
            email: signer.email,
            phone: signer.phone,
            order_index: signer.order_index,
            has_signed: false,
            signed_at: None,
            signature_data: None,
            ip: None,
            user_agent: None,
            created_at: timestamp,
            updated_at: timestamp,
        };
        self.tables.signers.push(row.clone());
        Ok(row)
    }

    fn find_signer(&mut self, signer_id: Uuid) -> StoreResult<Option<ContractSigner>> {
        Ok(self
            .tables
            .signers
            .iter()
            .find(|s| s.id == signer_id)
            .cloned())
    }

    fn list_signers(&mut self, contract_id: Uuid) -> StoreResult<Vec<ContractSigner>> {
        let mut rows: Vec<ContractSigner> = self
            .tables
            .signers
            .iter()
            .filter(|s| s.contract_id == contract_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order among equal indices.
        rows.sort_by_key(|s| s.order_index);
        Ok(rows)
    }

    fn update_signer(
        &mut self,
        signer_id: Uuid,
        changes: SignerChanges,
    ) -> StoreResult<Option<ContractSigner>> {
        let Some(row) = self.tables.signers.iter_mut().find(|s| s.id == signer_id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            row.name = name;
        }
        if let Some(email) = changes.email {
            row.email = email;
        }
        if let Some(phone) = changes.phone {
            row.phone = phone;
        }
        if let Some(order_index) = changes.order_index {
            row.order_index = order_index;
        }
        if let Some(has_signed) = changes.has_signed {
            row.has_signed = has_signed;
        }
        if let Some(signed_at) = changes.signed_at {
            row.signed_at = signed_at;
        }
        if let Some(signature_data) = changes.signature_data {
            row.signature_data = signature_data;
        }
        if let Some(ip) = changes.ip {
            row.ip = ip;
        }
        if let Some(user_agent) = changes.user_agent {
            row.user_agent = user_agent;
        }
        row.updated_at = now();
        Ok(Some(row.clone()))
    }

    fn insert_event(&mut self, event: NewContractEvent) -> StoreResult<ContractEvent> {
        self.tables.next_event_id += 1;
        let row = ContractEvent {
            id: self.tables.next_event_id,
            contract_id: event.contract_id,
            kind: event.kind,
            actor: event.actor,
            meta: event.meta,
            created_at: now(),
        };
        self.tables.events.push(row.clone());
        Ok(row)
    }

    fn list_events(&mut self, contract_id: Uuid) -> StoreResult<Vec<ContractEvent>> {
        Ok(self
            .tables
            .events
            .iter()
            .filter(|e| e.contract_id == contract_id)
            .cloned()
            .collect())
    }

    fn insert_token(&mut self, token: NewContractToken) -> StoreResult<ContractToken> {
        if self
            .tables
            .tokens
            .iter()
            .any(|t| t.token_hash == token.token_hash)
        {
            return Err(unique_violation("contract_tokens_token_hash_key"));
        }
        let row = ContractToken {
            id: token.id,
            contract_id: token.contract_id,
            signer_id: token.signer_id,
            token_hash: token.token_hash,
            used: false,
            otp_hash: None,
            otp_expires_at: None,
            created_at: now(),
        };
        self.tables.tokens.push(row.clone());
        Ok(row)
    }

    fn find_unused_token(&mut self, token_hash: &str) -> StoreResult<Option<ContractToken>> {
        Ok(self
            .tables
            .tokens
            .iter()
            .find(|t| t.token_hash == token_hash && !t.used)
            .cloned())
    }

    fn mark_token_used(&mut self, token_id: Uuid) -> StoreResult<bool> {
        match self.token_mut(token_id) {
            Some(row) if !row.used => {
                row.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn latest_token_for_signer(
        &mut self,
        contract_id: Uuid,
        signer_id: Uuid,
    ) -> StoreResult<Option<ContractToken>> {
        // Rows are appended in creation order, so the last match is newest.
        Ok(self
            .tables
            .tokens
            .iter()
            .rev()
            .find(|t| t.contract_id == contract_id && t.signer_id == signer_id)
            .cloned())
    }

    fn set_token_otp(
        &mut self,
        token_id: Uuid,
        otp_hash: Option<String>,
        otp_expires_at: Option<NaiveDateTime>,
    ) -> StoreResult<bool> {
        match self.token_mut(token_id) {
            Some(row) => {
                row.otp_hash = otp_hash;
                row.otp_expires_at = otp_expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn purge_expired_otps(&mut self, now: NaiveDateTime) -> StoreResult<usize> {
        let mut purged = 0;
        for row in self.tables.tokens.iter_mut() {
            if row.otp_expires_at.is_some_and(|expires| expires < now) {
                row.otp_hash = None;
                row.otp_expires_at = None;
                purged += 1;
            }
        }
        Ok(purged)
    }

    fn enqueue_delivery(&mut self, delivery: &Delivery) -> StoreResult<()> {
        self.tables.deliveries.push(delivery.clone());
        Ok(())
    }
}

impl ProjectStore for MemoryStore {
    fn find_customer(
        &mut self,
        company_id: Uuid,
        customer_id: Uuid,
    ) -> StoreResult<Option<Customer>> {
        Ok(self
            .tables
            .customers
            .iter()
            .find(|c| c.id == customer_id && c.company_id == company_id)
            .cloned())
    }

    fn insert_customer(&mut self, customer: NewCustomer) -> StoreResult<Customer> {
        let row = Customer {
            id: customer.id,
            company_id: customer.company_id,
            name: customer.name,
            email: customer.email,
            created_at: now(),
        };
        self.tables.customers.push(row.clone());
        Ok(row)
    }

    fn insert_project(&mut self, project: NewProject) -> StoreResult<Project> {
        let row = Project {
            id: project.id,
            company_id: project.company_id,
            customer_id: project.customer_id,
            name: project.name,
            description: project.description,
            status: project.status,
            created_by: project.created_by,
            created_at: now(),
        };
        self.tables.projects.push(row.clone());
        Ok(row)
    }

    fn find_project(&mut self, company_id: Uuid, project_id: Uuid) -> StoreResult<Option<Project>> {
        Ok(self
            .tables
            .projects
            .iter()
            .find(|p| p.id == project_id && p.company_id == company_id)
            .cloned())
    }

    fn insert_task(&mut self, task: NewTask) -> StoreResult<Task> {
        let row = Task {
            id: task.id,
            company_id: task.company_id,
            project_id: task.project_id,
            title: task.title,
            description: task.description,
            status: task.status,
            priority: task.priority,
            created_by: task.created_by,
            created_at: now(),
        };
        self.tables.tasks.push(row.clone());
        Ok(row)
    }

    fn list_tasks(&mut self, project_id: Uuid) -> StoreResult<Vec<Task>> {
        Ok(self
            .tables
            .tasks
            .iter()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect())
    }
}
