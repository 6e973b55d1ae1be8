//! One-time passcodes for phone-number sign-in.
//!
//! A code is valid from creation until `expires_at` inclusive. Codes are
//! never consumed or deleted; a code can be verified repeatedly until it
//! expires.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ValidationError;

pub const OTP_CODE_LEN: usize = 6;
pub const DEFAULT_OTP_TTL_SECS: i64 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Otp {
    pub id: i64,
    pub phone_number: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Otp {
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

/// A code about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOtp {
    pub phone_number: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewOtp {
    /// Generate a fresh code for `phone_number` issued at `now`.
    #[must_use]
    pub fn generate(phone_number: &str, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            phone_number: phone_number.to_string(),
            code: generate_code(&mut rand::rng()),
            created_at: now,
            expires_at: now + ttl,
        }
    }
}

/// Six independent uniform decimal digits. Codes are not unique.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..OTP_CODE_LEN)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Validate a submitted code's shape before looking it up.
///
/// # Errors
///
/// Returns a validation error for a blank code or one longer than six chars.
pub fn validate_code(raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim();
    if code.is_empty() {
        return Err(ValidationError::field("code", "this field may not be blank"));
    }
    if code.chars().count() > OTP_CODE_LEN {
        return Err(ValidationError::field(
            "code",
            format!("ensure this field has no more than {OTP_CODE_LEN} characters"),
        ));
    }
    Ok(code.to_string())
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn generated_code_is_six_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), OTP_CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_digit()), "{code}");
        }
    }

    #[test]
    fn new_otp_expires_after_ttl() {
        let now = Utc::now();
        let otp = NewOtp::generate("09121234567", now, Duration::seconds(DEFAULT_OTP_TTL_SECS));
        assert_eq!(otp.expires_at - otp.created_at, Duration::minutes(2));
    }

    #[test]
    fn otp_is_valid_through_expiry_instant() {
        let now = Utc::now();
        let otp = Otp {
            id: 1,
            phone_number: "09121234567".to_string(),
            code: "123456".to_string(),
            created_at: now,
            expires_at: now + Duration::minutes(2),
        };
        assert!(otp.is_valid_at(now));
        assert!(otp.is_valid_at(otp.expires_at));
        assert!(!otp.is_valid_at(otp.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn code_validation_rejects_blank_and_long() {
        assert!(validate_code("").is_err());
        assert!(validate_code("1234567").is_err());
        assert_eq!(validate_code(" 042042 ").expect("valid"), "042042");
    }
}
