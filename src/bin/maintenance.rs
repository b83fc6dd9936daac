use std::env;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use uuid::Uuid;

use contracts_backend::{
    auth::jwt::JwtService,
    config::AppConfig,
    contracts::templates::seed_default_templates,
    db::{self, PgPool},
    init_tracing,
    store::ContractStore,
};

const USAGE: &str = "Usage:\n  \
maintenance purge-expired-otps\n  \
maintenance seed-templates <company-id>\n  \
maintenance issue-token <user-id> <company-id> [role]";

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["purge-expired-otps"] => purge_expired_otps(&connect()?),
        ["seed-templates", company] => seed_templates(&connect()?, parse_id(company)?),
        ["issue-token", user, company] => issue_token(parse_id(user)?, parse_id(company)?, "admin"),
        ["issue-token", user, company, role] => {
            issue_token(parse_id(user)?, parse_id(company)?, role)
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("{raw} is not a valid UUID"))
}

fn connect() -> Result<PgPool> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    db::run_migrations(&pool)?;
    Ok(pool)
}

fn purge_expired_otps(pool: &PgPool) -> Result<()> {
    let mut conn = pool.get().context("failed to get database connection")?;
    let cleared = conn
        .purge_expired_otps(Utc::now().naive_utc())
        .context("failed to purge expired OTPs")?;
    println!("Cleared {cleared} expired OTP codes.");
    Ok(())
}

fn seed_templates(pool: &PgPool, company_id: Uuid) -> Result<()> {
    let mut conn = pool.get().context("failed to get database connection")?;
    let inserted = seed_default_templates(&mut *conn, company_id)
        .context("failed to seed contract templates")?;
    println!("Inserted {inserted} templates for company {company_id}.");
    Ok(())
}

fn issue_token(user_id: Uuid, company_id: Uuid, role: &str) -> Result<()> {
    if role.trim().is_empty() {
        bail!("role must not be empty");
    }
    let config = AppConfig::from_env()?;
    let jwt = JwtService::from_config(&config)?;
    println!("{}", jwt.generate_token(user_id, company_id, role)?);
    Ok(())
}
