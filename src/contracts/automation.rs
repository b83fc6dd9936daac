//! Provisioning that runs once a contract is fully executed: one project
//! for the customer plus the task list of the template's service package.

use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::error::{ContractError, ContractResult};
use super::events::log_event;
use super::types::{Actor, EventKind, ServicePackage};
use crate::models::{NewProject, NewTask};
use crate::store::{ContractStore, ProjectStore};

pub const PROJECT_STATUS_ACTIVE: &str = "active";
pub const TASK_STATUS_TODO: &str = "todo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskTemplate {
    pub title: &'static str,
    pub description: &'static str,
    pub priority: TaskPriority,
}

const fn task(title: &'static str, description: &'static str, priority: TaskPriority) -> TaskTemplate {
    TaskTemplate {
        title,
        description,
        priority,
    }
}

use TaskPriority::{High, Low, Medium};

static AUDIT_SERVICES: &[TaskTemplate] = &[
    task("Audit planning meeting", "Agree scope, materiality and timeline with the client", High),
    task("Request trial balance and general ledger", "Obtain year-end trial balance, GL and prior-year signed financials", High),
    task("Risk assessment", "Document entity understanding, internal controls and significant risks", High),
    task("Substantive testing", "Perform tests of detail on revenue, expenses, assets and liabilities", Medium),
    task("Draft audit report", "Prepare the audit opinion and management letter points", Medium),
    task("Partner review and sign-off", "Engagement partner review, IRBA file completion and archiving", High),
];

static TAX_COMPLIANCE: &[TaskTemplate] = &[
    task("Collect tax documents", "Request IRP5s, medical certificates, RA and investment certificates", High),
    task("Confirm SARS registration details", "Check eFiling profile, tax reference number and banking details", Medium),
    task("Prepare income tax return", "Complete ITR12/ITR14 from supporting documents", High),
    task("Provisional tax calculation", "Calculate IRP6 first and second period estimates", Medium),
    task("Submit return on eFiling", "File the return and save the submission confirmation", High),
    task("Review assessment", "Compare the ITA34 to the filed return and lodge objections if needed", Low),
];

static VAT_COMPLIANCE: &[TaskTemplate] = &[
    task("Confirm VAT registration and period", "Verify VAT number, category and filing cycle", High),
    task("Reconcile input and output VAT", "Match invoices to the ledger for the period", High),
    task("Prepare VAT201 return", "Complete the VAT201 from reconciled figures", High),
    task("Submit VAT201 and arrange payment", "File on eFiling before the due date and confirm payment", High),
    task("File supporting documentation", "Store tax invoices and reconciliations for audit", Low),
];

static REVIEW_SERVICES: &[TaskTemplate] = &[
    task("Review engagement planning", "Agree scope under ISRE 2400 and set the timeline", High),
    task("Obtain financial information", "Request trial balance, bank statements and supporting schedules", High),
    task("Analytical procedures", "Perform ratio and trend analysis and follow up on variances", Medium),
    task("Inquiries with management", "Document responses to review inquiries", Medium),
    task("Issue review report", "Prepare the independent reviewer's report", High),
];

static BOOKKEEPING: &[TaskTemplate] = &[
    task("Set up chart of accounts", "Configure accounts to match the client's business", High),
    task("Connect bank feeds", "Link bank accounts and import opening transactions", High),
    task("Monthly transaction capture", "Allocate bank transactions and capture source documents", Medium),
    task("Bank reconciliation", "Reconcile every bank account at month end", Medium),
    task("Monthly management accounts", "Prepare income statement and balance sheet for the client", Medium),
];

static PAYROLL: &[TaskTemplate] = &[
    task("Collect employee information", "Obtain employment contracts, ID numbers, tax numbers and banking details", High),
    task("Register for PAYE, UIF and SDL", "Confirm employer registrations with SARS and the Department of Labour", High),
    task("Configure payroll", "Set up salaries, deductions and leave balances", Medium),
    task("Monthly payroll run", "Process payslips and submit the EMP201", High),
    task("Bi-annual EMP501 reconciliation", "Reconcile PAYE, UIF and SDL and issue IRP5 certificates", Medium),
];

static COMPLIANCE: &[TaskTemplate] = &[
    task("CIPC annual return", "File the company annual return and pay the CIPC fee", High),
    task("Beneficial ownership filing", "Update the beneficial ownership register with CIPC", High),
    task("Update statutory registers", "Maintain share register and directors' details", Medium),
    task("B-BBEE affidavit", "Prepare the B-BBEE sworn affidavit where applicable", Low),
];

static ADVISORY: &[TaskTemplate] = &[
    task("Discovery session", "Understand the client's goals and current position", High),
    task("Financial analysis", "Analyse historic results and cash flow", Medium),
    task("Prepare recommendations", "Draft the advisory report with options and projections", Medium),
    task("Present findings", "Walk the client through recommendations and next steps", Medium),
];

static BASIC: &[TaskTemplate] = &[
    task("Client onboarding", "Complete FICA documents and client acceptance", High),
    task("Annual financial statements", "Compile annual financial statements", Medium),
    task("Income tax return", "Prepare and submit the annual income tax return", Medium),
];

static STANDARD: &[TaskTemplate] = &[
    task("Client onboarding", "Complete FICA documents and client acceptance", High),
    task("Monthly bookkeeping", "Capture and reconcile monthly transactions", Medium),
    task("VAT returns", "Prepare and submit bi-monthly VAT201 returns", High),
    task("Annual financial statements", "Compile annual financial statements", Medium),
    task("Income tax return", "Prepare and submit the annual income tax return", Medium),
];

static PREMIUM: &[TaskTemplate] = &[
    task("Client onboarding", "Complete FICA documents and client acceptance", High),
    task("Monthly bookkeeping", "Capture and reconcile monthly transactions", Medium),
    task("Payroll processing", "Run monthly payroll and EMP201 submissions", High),
    task("VAT returns", "Prepare and submit bi-monthly VAT201 returns", High),
    task("Quarterly management review", "Meet quarterly to review management accounts", Medium),
    task("Annual financial statements", "Compile annual financial statements", Medium),
    task("Tax planning session", "Year-end tax planning with the client", Low),
];

pub fn tasks_for(package: ServicePackage) -> &'static [TaskTemplate] {
    match package {
        ServicePackage::AuditServices => AUDIT_SERVICES,
        ServicePackage::TaxCompliance => TAX_COMPLIANCE,
        ServicePackage::VatCompliance => VAT_COMPLIANCE,
        ServicePackage::ReviewServices => REVIEW_SERVICES,
        ServicePackage::Bookkeeping => BOOKKEEPING,
        ServicePackage::Payroll => PAYROLL,
        ServicePackage::Compliance => COMPLIANCE,
        ServicePackage::Advisory => ADVISORY,
        ServicePackage::Basic => BASIC,
        ServicePackage::Standard => STANDARD,
        ServicePackage::Premium => PREMIUM,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoCustomer,
    CustomerNotFound,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoCustomer => "no_customer",
            SkipReason::CustomerNotFound => "customer_not_found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationOutcome {
    Provisioned { project_id: Uuid, task_count: usize },
    AlreadyProvisioned { project_id: Uuid },
    Skipped(SkipReason),
}

/// Creates the project and tasks for a fully signed contract. Safe to call
/// more than once: a contract already linked to a project is left alone and
/// nothing is logged.
pub fn on_contract_countersigned<S>(
    store: &mut S,
    contract_id: Uuid,
    company_id: Uuid,
) -> ContractResult<AutomationOutcome>
where
    S: ContractStore + ProjectStore,
{
    store.in_transaction::<_, ContractError, _>(|store| {
        let contract = store
            .lock_contract(contract_id)?
            .filter(|contract| contract.company_id == company_id)
            .ok_or(ContractError::NotFound)?;

        if let Some(project_id) = contract.project_id {
            return Ok(AutomationOutcome::AlreadyProvisioned { project_id });
        }

        let customer = match contract.customer_id {
            Some(customer_id) => store.find_customer(company_id, customer_id)?,
            None => None,
        };
        let Some(customer) = customer else {
            let reason = if contract.customer_id.is_some() {
                SkipReason::CustomerNotFound
            } else {
                SkipReason::NoCustomer
            };
            log_event(
                store,
                contract_id,
                EventKind::ProjectSkipped,
                Actor::System,
                json!({ "reason": reason.as_str() }),
            )?;
            info!(%contract_id, reason = reason.as_str(), "skipped project provisioning");
            return Ok(AutomationOutcome::Skipped(reason));
        };

        let template = match contract.template_id {
            Some(template_id) => store.find_template(company_id, template_id)?,
            None => None,
        };
        let service_package = template.as_ref().and_then(|t| t.service_package);
        let engagement = template
            .as_ref()
            .map(|t| t.name.as_str())
            .unwrap_or(contract.title.as_str());

        let project = store.insert_project(NewProject {
            id: Uuid::new_v4(),
            company_id,
            customer_id: Some(customer.id),
            name: format!("{} - {}", customer.name, engagement),
            description: Some(format!(
                "Created from signed contract \"{}\"",
                contract.title
            )),
            status: PROJECT_STATUS_ACTIVE.to_string(),
            created_by: contract.created_by,
        })?;

        if !store.link_project(contract_id, project.id)? {
            return Err(ContractError::Conflict);
        }

        let templates = service_package.map(tasks_for).unwrap_or_default();
        for template in templates {
            store.insert_task(NewTask {
                id: Uuid::new_v4(),
                company_id,
                project_id: project.id,
                title: template.title.to_string(),
                description: Some(template.description.to_string()),
                status: TASK_STATUS_TODO.to_string(),
                priority: template.priority.as_str().to_string(),
                created_by: contract.created_by,
            })?;
        }

        log_event(
            store,
            contract_id,
            EventKind::ProjectCreated,
            Actor::System,
            json!({
                "project_id": project.id,
                "project_name": project.name,
                "service_package": service_package,
                "task_count": templates.len(),
            }),
        )?;
        info!(
            %contract_id,
            project_id = %project.id,
            task_count = templates.len(),
            "provisioned project for signed contract"
        );

        Ok(AutomationOutcome::Provisioned {
            project_id: project.id,
            task_count: templates.len(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_package_has_tasks() {
        for package in ServicePackage::ALL {
            let tasks = tasks_for(*package);
            assert!(!tasks.is_empty(), "{package} has no tasks");
            assert!(tasks.iter().all(|t| !t.title.is_empty()));
        }
    }

    #[test]
    fn packages_have_distinct_lists() {
        assert_ne!(
            tasks_for(ServicePackage::AuditServices),
            tasks_for(ServicePackage::TaxCompliance)
        );
        assert!(tasks_for(ServicePackage::Premium).len() > tasks_for(ServicePackage::Basic).len());
    }
}
