//! Template administration and the default engagement-letter set.

use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::error::{ContractError, ContractResult};
use super::template::extract_fields;
use super::types::ServicePackage;
use crate::models::{ContractTemplate, NewContractTemplate, TemplateChanges};
use crate::store::{ContractStore, StoreError, StoreResult};
use crate::utils::json::double_option;

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateInput {
    pub name: String,
    pub body: String,
    #[serde(default)]
    pub service_package: Option<ServicePackage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplatePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub service_package: Option<Option<ServicePackage>>,
}

impl TemplatePatch {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.body.is_none() && self.service_package.is_none()
    }
}

fn fields_value(body: &str) -> Value {
    Value::from(extract_fields(body))
}

fn validated_name(name: &str) -> ContractResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ContractError::validation("template name must not be empty"));
    }
    Ok(name.to_string())
}

fn duplicate_name(err: StoreError, name: &str) -> ContractError {
    if err.is_unique_violation() {
        ContractError::validation(format!("a template named \"{name}\" already exists"))
    } else {
        err.into()
    }
}

pub fn create_template<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
    input: TemplateInput,
) -> ContractResult<ContractTemplate> {
    let name = validated_name(&input.name)?;
    store
        .insert_template(NewContractTemplate {
            id: Uuid::new_v4(),
            company_id,
            name: name.clone(),
            version: 1,
            fields: fields_value(&input.body),
            body: input.body,
            service_package: input.service_package,
        })
        .map_err(|err| duplicate_name(err, &name))
}

pub fn get_template<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
    template_id: Uuid,
) -> StoreResult<Option<ContractTemplate>> {
    store.find_template(company_id, template_id)
}

pub fn list_templates<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
) -> StoreResult<Vec<ContractTemplate>> {
    store.list_templates(company_id)
}

/// Applies `patch` and bumps the template's own version. Contracts already
/// created from it keep the body they copied.
pub fn update_template<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
    template_id: Uuid,
    patch: TemplatePatch,
) -> ContractResult<ContractTemplate> {
    let name = patch.name.as_deref().map(validated_name).transpose()?;

    store.in_transaction::<_, ContractError, _>(|store| {
        let current = store
            .find_template(company_id, template_id)?
            .ok_or(ContractError::NotFound)?;
        if patch.is_empty() {
            return Ok(current);
        }

        let changes = TemplateChanges {
            version: Some(current.version + 1),
            fields: patch.body.as_deref().map(fields_value),
            body: patch.body,
            name: name.clone(),
            service_package: patch.service_package,
        };
        store
            .update_template(company_id, template_id, changes)
            .map_err(|err| duplicate_name(err, name.as_deref().unwrap_or(&current.name)))?
            .ok_or(ContractError::NotFound)
    })
}

/// Refused while any contract still points at the template.
pub fn delete_template<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
    template_id: Uuid,
) -> ContractResult<()> {
    store.in_transaction::<_, ContractError, _>(|store| {
        store
            .find_template(company_id, template_id)?
            .ok_or(ContractError::NotFound)?;
        if store.template_in_use(template_id)? {
            return Err(ContractError::TemplateInUse);
        }
        store.delete_template(company_id, template_id)?;
        Ok(())
    })
}

struct DefaultTemplate {
    name: &'static str,
    service_package: ServicePackage,
    body: &'static str,
}

static DEFAULT_TEMPLATES: &[DefaultTemplate] = &[
    DefaultTemplate {
        name: "Audit Engagement Letter",
        service_package: ServicePackage::AuditServices,
        body: "Dear {{client_name}},\n\n\
We are pleased to confirm our appointment as auditors of {{company_name}} \
for the financial year ending {{year_end}}. Our audit will be conducted in \
accordance with International Standards on Auditing.\n\n\
Our fee for this engagement is {{fee_amount}}, excluding VAT.\n\n\
Please sign below to confirm your acceptance of these terms.\n\n\
{{firm_name}}",
    },
    DefaultTemplate {
        name: "Tax Compliance Engagement Letter",
        service_package: ServicePackage::TaxCompliance,
        body: "Dear {{client_name}},\n\n\
This letter confirms that {{firm_name}} will prepare and submit the income \
tax returns of {{company_name}} (tax reference {{tax_number}}) to SARS for \
the {{tax_year}} year of assessment, including provisional tax.\n\n\
Our fee is {{fee_amount}} per annum, excluding VAT.\n\n\
Please sign below to confirm your acceptance.",
    },
    DefaultTemplate {
        name: "VAT Compliance Engagement Letter",
        service_package: ServicePackage::VatCompliance,
        body: "Dear {{client_name}},\n\n\
{{firm_name}} will prepare and submit the VAT201 returns of {{company_name}} \
(VAT number {{vat_number}}) for every {{vat_period}} period from \
{{start_date}}.\n\n\
Our fee is {{fee_amount}} per return, excluding VAT.\n\n\
Please sign below to confirm your acceptance.",
    },
    DefaultTemplate {
        name: "Independent Review Engagement Letter",
        service_package: ServicePackage::ReviewServices,
        body: "Dear {{client_name}},\n\n\
We confirm our engagement to review the annual financial statements of \
{{company_name}} for the year ending {{year_end}} in accordance with ISRE \
2400. A review is not an audit and provides limited assurance only.\n\n\
Our fee for this engagement is {{fee_amount}}, excluding VAT.\n\n\
Please sign below to confirm your acceptance.",
    },
    DefaultTemplate {
        name: "Bookkeeping Services Agreement",
        service_package: ServicePackage::Bookkeeping,
        body: "This agreement is between {{firm_name}} and {{company_name}}.\n\n\
From {{start_date}}, {{firm_name}} will capture transactions, reconcile bank \
accounts and prepare monthly management accounts for {{company_name}}.\n\n\
The monthly fee is {{fee_amount}}, excluding VAT, payable by the \
{{payment_day}} of each month.",
    },
    DefaultTemplate {
        name: "Payroll Services Agreement",
        service_package: ServicePackage::Payroll,
        body: "This agreement is between {{firm_name}} and {{company_name}}.\n\n\
From {{start_date}}, {{firm_name}} will process the monthly payroll for up \
to {{employee_count}} employees, submit EMP201 returns and complete the \
bi-annual EMP501 reconciliations.\n\n\
The monthly fee is {{fee_amount}}, excluding VAT.",
    },
];

/// Inserts every default template the company does not have yet, matching by
/// name. Safe to run repeatedly and from several processes at once. Returns
/// how many templates were added.
pub fn seed_default_templates<S: ContractStore>(
    store: &mut S,
    company_id: Uuid,
) -> StoreResult<usize> {
    let mut inserted = 0;
    for template in DEFAULT_TEMPLATES {
        let created = store.insert_template_if_absent(NewContractTemplate {
            id: Uuid::new_v4(),
            company_id,
            name: template.name.to_string(),
            version: 1,
            body: template.body.to_string(),
            fields: fields_value(template.body),
            service_package: Some(template.service_package),
        })?;
        if created.is_some() {
            inserted += 1;
        }
    }
    info!(%company_id, inserted, "seeded default contract templates");
    Ok(inserted)
}
