//! Users, one-time passwords, revoked tokens, and score events.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ValidationError;

pub const MAX_PHONE_NUMBER_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub phone_number: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
}

/// Validate a phone number as submitted to the OTP endpoints.
///
/// The value is trimmed but otherwise kept verbatim: lookups match the
/// exact string the client sent.
///
/// # Errors
///
/// Returns a validation error for a blank value or one longer than 15 chars.
pub fn validate_phone_number(raw: &str) -> Result<String, ValidationError> {
    let phone = raw.trim();
    if phone.is_empty() {
        return Err(ValidationError::field(
            "phone_number",
            "this field may not be blank",
        ));
    }
    if phone.chars().count() > MAX_PHONE_NUMBER_LEN {
        return Err(ValidationError::field(
            "phone_number",
            format!("ensure this field has no more than {MAX_PHONE_NUMBER_LEN} characters"),
        ));
    }
    Ok(phone.to_string())
}

/// Strip every non-digit character. Used when operators create accounts
/// directly rather than through OTP sign-in.
#[must_use]
pub fn normalize_phone_number(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// A token identifier that may no longer authenticate requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistedAccessToken {
    pub jti: String,
    pub blacklisted_at: DateTime<Utc>,
}

pub const DAILY_LOGIN: &str = "daily_login";
pub const ORDER_COMPLETED: &str = "order_completed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEvent {
    pub id: i64,
    pub user_id: i64,
    pub score_title: String,
    pub points: i32,
    pub event_date: NaiveDate,
    pub order_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScoreEvent {
    pub user_id: i64,
    pub score_title: String,
    pub points: i32,
    pub event_date: NaiveDate,
    pub order_id: Option<i64>,
}

impl NewScoreEvent {
    /// Whether this event collides with `existing` under the store's
    /// uniqueness rules: one `daily_login` per user per day, and one event
    /// per order id.
    #[must_use]
    pub fn collides_with(&self, existing: &ScoreEvent) -> bool {
        let same_daily_login = self.score_title == DAILY_LOGIN
            && existing.score_title == DAILY_LOGIN
            && existing.user_id == self.user_id
            && existing.event_date == self.event_date;
        let same_order = self.order_id.is_some() && existing.order_id == self.order_id;
        same_daily_login || same_order
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreSummary {
    pub total_points: i64,
    pub events: Vec<ScoreEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_number_is_trimmed() {
        assert_eq!(
            validate_phone_number(" 09121234567 ").expect("valid"),
            "09121234567"
        );
    }

    #[test]
    fn blank_phone_number_is_rejected() {
        let err = validate_phone_number("  ").expect_err("blank");
        assert_eq!(err.field_name(), "phone_number");
    }

    #[test]
    fn long_phone_number_is_rejected() {
        assert!(validate_phone_number("0912123456789012").is_err());
        assert!(validate_phone_number("091212345678901").is_ok());
    }

    #[test]
    fn normalize_keeps_digits_only() {
        assert_eq!(normalize_phone_number("+98 (912) 123-4567"), "989121234567");
    }

    fn event(user_id: i64, title: &str, day: u32, order_id: Option<i64>) -> ScoreEvent {
        ScoreEvent {
            id: 1,
            user_id,
            score_title: title.to_string(),
            points: 1,
            event_date: NaiveDate::from_ymd_opt(2026, 3, day).expect("date"),
            order_id,
            created_at: Utc::now(),
        }
    }

    fn new_event(user_id: i64, title: &str, day: u32, order_id: Option<i64>) -> NewScoreEvent {
        NewScoreEvent {
            user_id,
            score_title: title.to_string(),
            points: 1,
            event_date: NaiveDate::from_ymd_opt(2026, 3, day).expect("date"),
            order_id,
        }
    }

    #[test]
    fn daily_login_collides_on_same_user_and_day() {
        let existing = event(1, DAILY_LOGIN, 4, None);
        assert!(new_event(1, DAILY_LOGIN, 4, None).collides_with(&existing));
        assert!(!new_event(1, DAILY_LOGIN, 5, None).collides_with(&existing));
        assert!(!new_event(2, DAILY_LOGIN, 4, None).collides_with(&existing));
    }

    #[test]
    fn order_events_collide_on_order_id() {
        let existing = event(1, ORDER_COMPLETED, 4, Some(9));
        assert!(new_event(1, ORDER_COMPLETED, 6, Some(9)).collides_with(&existing));
        assert!(!new_event(1, ORDER_COMPLETED, 4, Some(10)).collides_with(&existing));
    }
}
