#![allow(dead_code)]

use std::env;

use anyhow::{anyhow, Context, Result};
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use contracts_backend::auth::jwt::JwtService;
use contracts_backend::config::AppConfig;
use contracts_backend::contracts::{
    self, ContractInput, MergeData, ServicePackage, SignerInput, SigningPolicy,
};
use contracts_backend::db::{self, PgPool, MIGRATIONS};
use contracts_backend::jobs::Delivery;
use contracts_backend::models::{Contract, ContractTemplate, Job, NewCustomer};
use contracts_backend::routes;
use contracts_backend::state::AppState;
use contracts_backend::store::{MemoryStore, ProjectStore};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const PUBLIC_BASE_URL: &str = "https://sign.example.co.za";

pub struct TestApp {
    pub state: AppState,
    router: Router,
}

impl TestApp {
    /// `None` when `TEST_DATABASE_URL` is unset; callers skip the test.
    pub async fn new() -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping database test");
            return Ok(None);
        };

        let config = AppConfig {
            database_url,
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            public_base_url: PUBLIC_BASE_URL.to_string(),
            delivery_webhook_url: None,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool, config, jwt);
        let router = routes::create_router(state.clone());

        Ok(Some(Self { state, router }))
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(|conn| truncate_all(conn)).await
    }

    pub fn token_for(&self, user_id: Uuid, company_id: Uuid) -> Result<String> {
        self.state.jwt.generate_token(user_id, company_id, "admin")
    }

    pub async fn insert_customer(&self, company_id: Uuid, name: &str) -> Result<Uuid> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let customer = conn.insert_customer(NewCustomer {
                id: Uuid::new_v4(),
                company_id,
                name,
                email: None,
            })?;
            Ok(customer.id)
        })
        .await
    }

    pub async fn deliveries(&self, job_type: &str) -> Result<Vec<Delivery>> {
        let job_type = job_type.to_string();
        self.with_conn(move |conn| {
            use contracts_backend::schema::jobs;
            let rows: Vec<Job> = jobs::table
                .filter(jobs::job_type.eq(&job_type))
                .order(jobs::created_at.asc())
                .load(conn)
                .context("failed to load jobs")?;
            rows.into_iter()
                .map(|job| {
                    serde_json::from_value::<Delivery>(job.payload)
                        .context("invalid delivery payload")
                })
                .collect()
        })
        .await
    }

    pub async fn request<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&T>,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match payload {
            Some(payload) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(payload)?)
            }
            None => Body::empty(),
        };
        let request = builder.body(body)?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.request(Method::POST, path, Some(payload), token).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.request::<()>(Method::GET, path, None, token).await
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE contract_tokens, contract_events, contract_signers, contract_versions, \
         contracts, contract_templates, tasks, projects, customers, jobs RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}

/// Plaintext token at the end of a delivered magic link.
pub fn token_from_link(delivery: &Delivery) -> Option<String> {
    match delivery {
        Delivery::SigningLink { link, .. } => link.rsplit('/').next().map(str::to_string),
        Delivery::SigningOtp { .. } => None,
    }
}

pub fn otp_from(delivery: &Delivery) -> Option<String> {
    match delivery {
        Delivery::SigningOtp { code, .. } => Some(code.clone()),
        Delivery::SigningLink { .. } => None,
    }
}

/// A company with one customer and one engagement template, held in memory.
pub struct Firm {
    pub store: MemoryStore,
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub customer_id: Uuid,
    pub template: ContractTemplate,
}

impl Firm {
    pub fn new(service_package: Option<ServicePackage>) -> Self {
        let mut store = MemoryStore::new();
        let company_id = Uuid::new_v4();
        let customer = store
            .insert_customer(NewCustomer {
                id: Uuid::new_v4(),
                company_id,
                name: "Acme Trading (Pty) Ltd".to_string(),
                email: Some("accounts@acme.co.za".to_string()),
            })
            .expect("insert customer");
        let template = contracts::templates::create_template(
            &mut store,
            company_id,
            contracts::templates::TemplateInput {
                name: "Audit Engagement".to_string(),
                body: "Dear {{client_name}}, fee is {{fee_amount}}".to_string(),
                service_package,
            },
        )
        .expect("create template");

        Self {
            store,
            company_id,
            user_id: Uuid::new_v4(),
            customer_id: customer.id,
            template,
        }
    }

    pub fn create_contract(&mut self, policy: SigningPolicy) -> Contract {
        contracts::create_contract(
            &mut self.store,
            self.company_id,
            ContractInput {
                title: "Audit FY2025".to_string(),
                template_id: Some(self.template.id),
                customer_id: Some(self.customer_id),
                signing_policy: policy,
            },
            self.user_id,
        )
        .expect("create contract")
    }

    pub fn add_signer(&mut self, contract_id: Uuid, name: &str, order_index: i32) -> Uuid {
        contracts::add_contract_signer(
            &mut self.store,
            self.company_id,
            contract_id,
            SignerInput {
                name: name.to_string(),
                email: Some(format!("{}@example.co.za", name.to_lowercase())),
                phone: None,
                order_index,
            },
            contracts::Actor::User(self.user_id),
        )
        .expect("add signer")
        .id
    }

    /// Sends the contract and returns the plaintext link token per signer.
    pub fn send(&mut self, contract_id: Uuid) -> Vec<(Uuid, String)> {
        let before = self.store.deliveries().len();
        contracts::send_contract(
            &mut self.store,
            self.company_id,
            contract_id,
            contracts::Actor::User(self.user_id),
            PUBLIC_BASE_URL,
        )
        .expect("send contract");
        self.store.deliveries()[before..]
            .iter()
            .filter_map(|delivery| Some((delivery.signer_id(), token_from_link(delivery)?)))
            .collect()
    }

    /// Requests an OTP through the signing session and returns the code
    /// that was handed to delivery.
    pub fn request_otp(&mut self, token: &str) -> String {
        contracts::request_otp(&mut self.store, token).expect("request otp");
        self.store
            .deliveries()
            .last()
            .and_then(otp_from)
            .expect("otp delivery queued")
    }

    pub fn merge_data(&self) -> MergeData {
        let mut data = MergeData::new();
        data.insert("client_name".into(), "Acme".into());
        data.insert("fee_amount".into(), "R500".into());
        data
    }
}
