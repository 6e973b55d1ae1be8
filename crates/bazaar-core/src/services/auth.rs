//! Phone-number sign-in, token refresh, and access-token revocation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::accounts::{normalize_phone_number, validate_phone_number, User};
use crate::otp::{validate_code, NewOtp, Otp};
use crate::store::{OtpRepo, TokenBlacklistRepo, UserRepo};
use crate::tokens::{TokenKind, TokenService};
use crate::{AuthError, ServiceError};

/// Result of a successful OTP verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub refresh: String,
    pub access: String,
    pub is_admin: bool,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepo>,
    otps: Arc<dyn OtpRepo>,
    blacklist: Arc<dyn TokenBlacklistRepo>,
    tokens: TokenService,
    otp_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepo>,
        otps: Arc<dyn OtpRepo>,
        blacklist: Arc<dyn TokenBlacklistRepo>,
        tokens: TokenService,
        otp_ttl: Duration,
    ) -> Self {
        Self {
            users,
            otps,
            blacklist,
            tokens,
            otp_ttl,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Issue a new code for `phone_number`. Earlier codes stay valid.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed phone number, or a store
    /// error if the code cannot be saved.
    pub async fn send_otp(&self, phone_number: &str) -> Result<Otp, ServiceError> {
        self.send_otp_at(phone_number, Utc::now()).await
    }

    /// [`Self::send_otp`] with an explicit issue time.
    ///
    /// # Errors
    ///
    /// See [`Self::send_otp`].
    pub async fn send_otp_at(
        &self,
        phone_number: &str,
        now: DateTime<Utc>,
    ) -> Result<Otp, ServiceError> {
        let phone_number = validate_phone_number(phone_number)?;
        let otp = self
            .otps
            .insert_otp(&NewOtp::generate(&phone_number, now, self.otp_ttl))
            .await?;
        // No SMS gateway: the log line is the delivery channel.
        tracing::info!(phone_number = %otp.phone_number, code = %otp.code, "OTP issued");
        Ok(otp)
    }

    /// Verify a code and sign the phone number in, creating the user on first
    /// sight.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NoSuchOtp`] when no code matches,
    /// [`AuthError::OtpExpired`] when the newest match has expired.
    pub async fn verify_otp(&self, phone_number: &str, code: &str) -> Result<Session, ServiceError> {
        self.verify_otp_at(phone_number, code, Utc::now()).await
    }

    /// [`Self::verify_otp`] evaluated at `now`.
    ///
    /// # Errors
    ///
    /// See [`Self::verify_otp`].
    pub async fn verify_otp_at(
        &self,
        phone_number: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, ServiceError> {
        let phone_number = validate_phone_number(phone_number)?;
        let code = validate_code(code)?;

        let otp = self
            .otps
            .latest_matching_otp(&phone_number, &code)
            .await?
            .ok_or(AuthError::NoSuchOtp)?;
        if !otp.is_valid_at(now) {
            return Err(AuthError::OtpExpired.into());
        }

        let (user, created) = self.users.get_or_create_user(&phone_number).await?;
        if created {
            tracing::info!(user_id = user.id, "user created on first sign-in");
        }
        if !user.is_active {
            return Err(AuthError::InactiveUser.into());
        }

        let pair = self.tokens.issue_pair(&user)?;
        tracing::info!(user_id = user.id, "OTP verified");
        Ok(Session {
            refresh: pair.refresh,
            access: pair.access,
            is_admin: user.is_staff,
        })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] for a bad refresh token and
    /// [`AuthError::InactiveUser`] if its user is gone or deactivated.
    pub async fn refresh_access(&self, refresh_token: &str) -> Result<String, ServiceError> {
        let claims = self.tokens.verify(refresh_token, TokenKind::Refresh)?;
        self.active_user(claims.user_id).await?;
        Ok(self.tokens.issue(claims.user_id, TokenKind::Access)?)
    }

    /// Resolve a bearer access token to its user.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`], [`AuthError::TokenRevoked`], or
    /// [`AuthError::InactiveUser`].
    pub async fn authenticate(&self, access_token: &str) -> Result<User, ServiceError> {
        let claims = self.tokens.verify(access_token, TokenKind::Access)?;
        if self.is_revoked(&claims.jti).await? {
            return Err(AuthError::TokenRevoked.into());
        }
        self.active_user(claims.user_id).await
    }

    /// Revoke the presented access token. Refresh tokens are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] if the token does not verify.
    pub async fn logout(&self, access_token: &str) -> Result<(), ServiceError> {
        let claims = self.tokens.verify(access_token, TokenKind::Access)?;
        self.revoke(&claims.jti).await?;
        tracing::info!(user_id = claims.user_id, "access token revoked");
        Ok(())
    }

    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a store error if the registry cannot be written.
    pub async fn revoke(&self, jti: &str) -> Result<(), ServiceError> {
        Ok(self.blacklist.blacklist_jti(jti, Utc::now()).await?)
    }

    /// # Errors
    ///
    /// Returns a store error if the registry cannot be read.
    pub async fn is_revoked(&self, jti: &str) -> Result<bool, ServiceError> {
        Ok(self.blacklist.is_jti_blacklisted(jti).await?)
    }

    /// Create or promote a staff account. Punctuation in the phone number is
    /// stripped first.
    ///
    /// # Errors
    ///
    /// Returns a validation error if no digits remain.
    pub async fn create_staff(&self, phone_number: &str) -> Result<User, ServiceError> {
        let phone_number = validate_phone_number(&normalize_phone_number(phone_number))?;
        let user = self.users.upsert_staff_user(&phone_number).await?;
        tracing::info!(user_id = user.id, "staff user ready");
        Ok(user)
    }

    async fn active_user(&self, user_id: i64) -> Result<User, ServiceError> {
        match self.users.get_user(user_id).await? {
            Some(user) if user.is_active => Ok(user),
            _ => Err(AuthError::InactiveUser.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    const PHONE: &str = "09121234567";

    fn service() -> (AuthService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenService::new(
            "test_secret_key",
            "bazaar",
            Duration::minutes(5),
            Duration::days(1),
        );
        let svc = AuthService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            tokens,
            Duration::minutes(2),
        );
        (svc, store)
    }

    #[tokio::test]
    async fn verify_within_ttl_creates_user_and_tokens() {
        let (svc, store) = service();
        let now = Utc::now();
        let otp = svc.send_otp_at(PHONE, now).await.expect("send");

        let session = svc
            .verify_otp_at(PHONE, &otp.code, now + Duration::seconds(30))
            .await
            .expect("verify");
        assert!(!session.is_admin);

        let user = store
            .find_user_by_phone(PHONE)
            .await
            .expect("lookup")
            .expect("user created");
        let claims = svc
            .tokens()
            .verify(&session.access, TokenKind::Access)
            .expect("access token");
        assert_eq!(claims.user_id, user.id);
    }

    #[tokio::test]
    async fn verify_after_ttl_is_expired() {
        let (svc, _) = service();
        let now = Utc::now();
        let otp = svc.send_otp_at(PHONE, now).await.expect("send");

        let err = svc
            .verify_otp_at(PHONE, &otp.code, now + Duration::minutes(3))
            .await
            .expect_err("expired");
        assert!(matches!(err, ServiceError::Auth(AuthError::OtpExpired)));
    }

    #[tokio::test]
    async fn verify_exactly_at_expiry_succeeds() {
        let (svc, _) = service();
        let now = Utc::now();
        let otp = svc.send_otp_at(PHONE, now).await.expect("send");
        assert!(svc
            .verify_otp_at(PHONE, &otp.code, otp.expires_at)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_code_is_rejected() {
        let (svc, _) = service();
        let otp = svc.send_otp(PHONE).await.expect("send");
        let wrong = if otp.code == "000000" { "111111" } else { "000000" };

        let err = svc.verify_otp(PHONE, wrong).await.expect_err("no match");
        assert!(matches!(err, ServiceError::Auth(AuthError::NoSuchOtp)));

        let err = svc
            .verify_otp("09120000000", &otp.code)
            .await
            .expect_err("other phone");
        assert!(matches!(err, ServiceError::Auth(AuthError::NoSuchOtp)));
    }

    #[tokio::test]
    async fn code_can_be_replayed_until_expiry() {
        let (svc, _) = service();
        let otp = svc.send_otp(PHONE).await.expect("send");
        svc.verify_otp(PHONE, &otp.code).await.expect("first");
        svc.verify_otp(PHONE, &otp.code).await.expect("second");
    }

    #[tokio::test]
    async fn staff_sign_in_reports_admin() {
        let (svc, _) = service();
        svc.create_staff(PHONE).await.expect("staff");
        let otp = svc.send_otp(PHONE).await.expect("send");
        let session = svc.verify_otp(PHONE, &otp.code).await.expect("verify");
        assert!(session.is_admin);
    }

    #[tokio::test]
    async fn blank_phone_number_is_a_validation_error() {
        let (svc, _) = service();
        let err = svc.send_otp("   ").await.expect_err("blank");
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn logout_revokes_access_token() {
        let (svc, _) = service();
        let otp = svc.send_otp(PHONE).await.expect("send");
        let session = svc.verify_otp(PHONE, &otp.code).await.expect("verify");

        svc.authenticate(&session.access).await.expect("valid before");
        svc.logout(&session.access).await.expect("logout");

        let err = svc.authenticate(&session.access).await.expect_err("revoked");
        assert!(matches!(err, ServiceError::Auth(AuthError::TokenRevoked)));

        // Refresh tokens survive logout.
        let access = svc.refresh_access(&session.refresh).await.expect("refresh");
        svc.authenticate(&access).await.expect("new access token");
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let (svc, _) = service();
        svc.revoke("abc").await.expect("first");
        svc.revoke("abc").await.expect("second");
        assert!(svc.is_revoked("abc").await.expect("lookup"));
        assert!(!svc.is_revoked("other").await.expect("lookup"));
    }

    #[tokio::test]
    async fn refresh_token_cannot_authenticate() {
        let (svc, _) = service();
        let otp = svc.send_otp(PHONE).await.expect("send");
        let session = svc.verify_otp(PHONE, &otp.code).await.expect("verify");
        let err = svc.authenticate(&session.refresh).await.expect_err("wrong kind");
        assert!(matches!(err, ServiceError::Auth(AuthError::InvalidToken(_))));
    }
}
