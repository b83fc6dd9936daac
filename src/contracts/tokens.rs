//! Magic-link tokens and signer OTPs.
//!
//! Plaintext credentials leave this module exactly once, as return values.
//! Only SHA-256 digests are written to the store.

use chrono::{Duration, NaiveDateTime, Utc};
use rand::{rngs::OsRng, Rng, RngCore};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use super::error::{ContractError, ContractResult};
use super::events::log_event;
use super::types::{Actor, EventKind};
use crate::models::NewContractToken;
use crate::store::{ContractStore, StoreResult};

pub const OTP_TTL_MINUTES: i64 = 10;
const TOKEN_BYTES: usize = 32;
const OTP_MIN: u32 = 100_000;
const OTP_MAX: u32 = 999_999;

/// What a valid, unused token grants access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenScope {
    pub token_id: Uuid,
    pub contract_id: Uuid,
    pub signer_id: Uuid,
}

/// Internal verification result. Callers outside this module only ever see
/// a boolean, so the reasons stay hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OtpCheck {
    Verified(Uuid),
    NoSession,
    Missing,
    Expired,
    Mismatch,
}

impl OtpCheck {
    fn reason(self) -> &'static str {
        match self {
            OtpCheck::Verified(_) => "verified",
            OtpCheck::NoSession => "no_session",
            OtpCheck::Missing => "otp_missing",
            OtpCheck::Expired => "otp_expired",
            OtpCheck::Mismatch => "otp_mismatch",
        }
    }
}

pub fn hash_secret(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_token_value() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn generate_otp_code() -> String {
    OsRng.gen_range(OTP_MIN..=OTP_MAX).to_string()
}

/// Issues a new bearer token for `(contract_id, signer_id)` and returns its
/// plaintext. Earlier tokens for the same signer stay valid until used.
pub fn generate_token<S: ContractStore>(
    store: &mut S,
    contract_id: Uuid,
    signer_id: Uuid,
) -> StoreResult<String> {
    let plaintext = generate_token_value();
    store.insert_token(NewContractToken {
        id: Uuid::new_v4(),
        contract_id,
        signer_id,
        token_hash: hash_secret(&plaintext),
    })?;
    Ok(plaintext)
}

pub fn validate_token<S: ContractStore>(
    store: &mut S,
    plaintext: &str,
) -> StoreResult<Option<TokenScope>> {
    let token = store.find_unused_token(&hash_secret(plaintext))?;
    if token.is_none() {
        warn!(reason = "token_unknown", "signing token rejected");
    }
    Ok(token.map(|token| TokenScope {
        token_id: token.id,
        contract_id: token.contract_id,
        signer_id: token.signer_id,
    }))
}

/// Spends the token. Returns false when it is unknown or already spent.
pub fn use_token<S: ContractStore>(store: &mut S, plaintext: &str) -> StoreResult<bool> {
    match store.find_unused_token(&hash_secret(plaintext))? {
        Some(token) => store.mark_token_used(token.id),
        None => Ok(false),
    }
}

pub fn generate_otp<S: ContractStore>(
    store: &mut S,
    contract_id: Uuid,
    signer_id: Uuid,
) -> ContractResult<String> {
    generate_otp_at(store, contract_id, signer_id, Utc::now().naive_utc())
}

/// Attaches a fresh OTP to the signer's newest unused token row, replacing
/// any earlier code. A signer without such a row has no session to attach
/// it to and is rejected.
pub fn generate_otp_at<S: ContractStore>(
    store: &mut S,
    contract_id: Uuid,
    signer_id: Uuid,
    now: NaiveDateTime,
) -> ContractResult<String> {
    let token = store
        .latest_token_for_signer(contract_id, signer_id)?
        .filter(|token| !token.used)
        .ok_or(ContractError::NoSigningSession(signer_id))?;

    let code = generate_otp_code();
    let expires_at = now + Duration::minutes(OTP_TTL_MINUTES);
    store.set_token_otp(token.id, Some(hash_secret(&code)), Some(expires_at))?;
    log_event(
        store,
        contract_id,
        EventKind::OtpSent,
        Actor::Signer(signer_id),
        json!({ "expires_at": expires_at }),
    )?;
    info!(%contract_id, %signer_id, "issued signing otp");
    Ok(code)
}

pub fn verify_otp<S: ContractStore>(
    store: &mut S,
    contract_id: Uuid,
    signer_id: Uuid,
    code: &str,
) -> StoreResult<bool> {
    verify_otp_at(store, contract_id, signer_id, code, Utc::now().naive_utc())
}

/// Checks `code` against the signer's newest token row. A match strictly
/// before the expiry consumes the code and logs `otp_verified`.
pub fn verify_otp_at<S: ContractStore>(
    store: &mut S,
    contract_id: Uuid,
    signer_id: Uuid,
    code: &str,
    now: NaiveDateTime,
) -> StoreResult<bool> {
    let check = match store.latest_token_for_signer(contract_id, signer_id)? {
        None => OtpCheck::NoSession,
        Some(token) => match (token.otp_hash.as_deref(), token.otp_expires_at) {
            (Some(stored), Some(expires_at)) => {
                if now >= expires_at {
                    OtpCheck::Expired
                } else if hash_secret(code) != stored {
                    OtpCheck::Mismatch
                } else {
                    OtpCheck::Verified(token.id)
                }
            }
            _ => OtpCheck::Missing,
        },
    };

    let OtpCheck::Verified(token_id) = check else {
        warn!(%contract_id, %signer_id, reason = check.reason(), "signing otp rejected");
        return Ok(false);
    };

    store.set_token_otp(token_id, None, None)?;
    log_event(
        store,
        contract_id,
        EventKind::OtpVerified,
        Actor::Signer(signer_id),
        json!({}),
    )?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_values_are_64_hex_chars() {
        let value = generate_token_value();
        assert_eq!(value.len(), TOKEN_BYTES * 2);
        assert!(value.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(value, generate_token_value());
    }

    #[test]
    fn otp_codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 6);
            let parsed: u32 = code.parse().unwrap();
            assert!((OTP_MIN..=OTP_MAX).contains(&parsed));
        }
    }

    #[test]
    fn hash_is_stable_sha256_hex() {
        assert_eq!(
            hash_secret("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
