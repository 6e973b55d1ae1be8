//! `users`, `otps`, `blacklisted_access_tokens`, and `score_events`.

use async_trait::async_trait;
use bazaar_core::accounts::{NewScoreEvent, ScoreEvent, User};
use bazaar_core::otp::{NewOtp, Otp};
use bazaar_core::store::{OtpRepo, ScoreRepo, TokenBlacklistRepo, UserRepo};
use bazaar_core::StoreError;
use chrono::{DateTime, NaiveDate, Utc};

use crate::{store_err, PgStore};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub phone_number: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            phone_number: row.phone_number,
            is_active: row.is_active,
            is_staff: row.is_staff,
            is_superuser: row.is_superuser,
            date_joined: row.date_joined,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OtpRow {
    pub id: i64,
    pub phone_number: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<OtpRow> for Otp {
    fn from(row: OtpRow) -> Self {
        Self {
            id: row.id,
            phone_number: row.phone_number,
            code: row.code,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScoreEventRow {
    pub id: i64,
    pub user_id: i64,
    pub score_title: String,
    pub points: i32,
    pub event_date: NaiveDate,
    pub order_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<ScoreEventRow> for ScoreEvent {
    fn from(row: ScoreEventRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            score_title: row.score_title,
            points: row.points,
            event_date: row.event_date,
            order_id: row.order_id,
            created_at: row.created_at,
        }
    }
}

const USER_COLUMNS: &str = "id, phone_number, is_active, is_staff, is_superuser, date_joined";

// ---------------------------------------------------------------------------
// users
// ---------------------------------------------------------------------------

#[async_trait]
impl UserRepo for PgStore {
    async fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_phone(&self, phone_number: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE phone_number = $1"
        ))
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(User::from))
    }

    async fn get_or_create_user(&self, phone_number: &str) -> Result<(User, bool), StoreError> {
        let inserted = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (phone_number) VALUES ($1) \
             ON CONFLICT (phone_number) DO NOTHING \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        if let Some(row) = inserted {
            return Ok((row.into(), true));
        }

        let existing = self
            .find_user_by_phone(phone_number)
            .await?
            .ok_or_else(|| {
                StoreError::Backend(format!("user {phone_number} vanished during get-or-create"))
            })?;
        Ok((existing, false))
    }

    async fn upsert_staff_user(&self, phone_number: &str) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (phone_number, is_staff, is_superuser) VALUES ($1, TRUE, TRUE) \
             ON CONFLICT (phone_number) \
             DO UPDATE SET is_staff = TRUE, is_superuser = TRUE \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(phone_number)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.into())
    }
}

// ---------------------------------------------------------------------------
// otps
// ---------------------------------------------------------------------------

#[async_trait]
impl OtpRepo for PgStore {
    async fn insert_otp(&self, otp: &NewOtp) -> Result<Otp, StoreError> {
        let row = sqlx::query_as::<_, OtpRow>(
            "INSERT INTO otps (phone_number, code, created_at, expires_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, phone_number, code, created_at, expires_at",
        )
        .bind(&otp.phone_number)
        .bind(&otp.code)
        .bind(otp.created_at)
        .bind(otp.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.into())
    }

    async fn latest_matching_otp(
        &self,
        phone_number: &str,
        code: &str,
    ) -> Result<Option<Otp>, StoreError> {
        let row = sqlx::query_as::<_, OtpRow>(
            "SELECT id, phone_number, code, created_at, expires_at \
             FROM otps \
             WHERE phone_number = $1 AND code = $2 \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1",
        )
        .bind(phone_number)
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(Otp::from))
    }
}

// ---------------------------------------------------------------------------
// blacklisted_access_tokens
// ---------------------------------------------------------------------------

#[async_trait]
impl TokenBlacklistRepo for PgStore {
    async fn blacklist_jti(&self, jti: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO blacklisted_access_tokens (jti, blacklisted_at) VALUES ($1, $2) \
             ON CONFLICT (jti) DO NOTHING",
        )
        .bind(jti)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn is_jti_blacklisted(&self, jti: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM blacklisted_access_tokens WHERE jti = $1)",
        )
        .bind(jti)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)
    }
}

// ---------------------------------------------------------------------------
// score_events
// ---------------------------------------------------------------------------

/// Insert a score event on any executor, so status changes can record one
/// inside their own transaction.
pub(crate) async fn insert_score_event<'e, E>(
    executor: E,
    event: &NewScoreEvent,
) -> Result<ScoreEvent, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, ScoreEventRow>(
        "INSERT INTO score_events (user_id, score_title, points, event_date, order_id) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING id, user_id, score_title, points, event_date, order_id, created_at",
    )
    .bind(event.user_id)
    .bind(&event.score_title)
    .bind(event.points)
    .bind(event.event_date)
    .bind(event.order_id)
    .fetch_one(executor)
    .await
    .map_err(store_err)?;
    Ok(row.into())
}

#[async_trait]
impl ScoreRepo for PgStore {
    async fn insert_score_event(&self, event: &NewScoreEvent) -> Result<ScoreEvent, StoreError> {
        insert_score_event(&self.pool, event).await
    }

    async fn list_score_events(&self, user_id: i64) -> Result<Vec<ScoreEvent>, StoreError> {
        let rows = sqlx::query_as::<_, ScoreEventRow>(
            "SELECT id, user_id, score_title, points, event_date, order_id, created_at \
             FROM score_events WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(ScoreEvent::from).collect())
    }
}
