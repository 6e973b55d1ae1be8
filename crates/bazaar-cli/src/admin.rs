//! Account and token administration, run against the configured database.

use std::sync::Arc;

use anyhow::Context;
use bazaar_core::accounts::User;
use bazaar_core::otp::Otp;
use bazaar_core::{AppConfig, Services, TokenService};
use bazaar_db::PgStore;
use sqlx::PgPool;

pub(crate) fn services(pool: PgPool, config: &AppConfig) -> Services {
    Services::from_store(
        Arc::new(PgStore::new(pool)),
        TokenService::from_config(config),
        config.otp_ttl(),
    )
}

/// Create a staff/superuser account, promoting the user if the phone number
/// is already registered.
///
/// # Errors
///
/// Returns an error for an invalid phone number or a database failure.
pub(crate) async fn create_staff(services: &Services, phone: &str) -> anyhow::Result<User> {
    services
        .auth
        .create_staff(phone)
        .await
        .with_context(|| format!("creating staff user {phone}"))
}

/// Issue an OTP the same way the sign-in endpoint does.
///
/// # Errors
///
/// Returns an error for a blank phone number or a database failure.
pub(crate) async fn issue_otp(services: &Services, phone: &str) -> anyhow::Result<Otp> {
    services
        .auth
        .send_otp(phone)
        .await
        .with_context(|| format!("issuing OTP for {phone}"))
}

/// # Errors
///
/// Returns an error for a blank jti or a database failure.
pub(crate) async fn revoke(services: &Services, jti: &str) -> anyhow::Result<()> {
    let jti = jti.trim();
    anyhow::ensure!(!jti.is_empty(), "jti must not be empty");
    services
        .auth
        .revoke(jti)
        .await
        .with_context(|| format!("revoking {jti}"))?;
    Ok(())
}
