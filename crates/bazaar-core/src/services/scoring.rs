use std::sync::Arc;

use chrono::NaiveDate;

use crate::accounts::{NewScoreEvent, ScoreEvent, ScoreSummary, DAILY_LOGIN, ORDER_COMPLETED};
use crate::store::ScoreRepo;
use crate::ServiceError;

pub const DAILY_LOGIN_POINTS: i32 = 1;
pub const ORDER_COMPLETED_POINTS: i32 = 10;

/// The event recorded when an order moves into `completed`. Stored together
/// with the status change, see [`crate::store::OrderRepo::update_order_status`].
#[must_use]
pub fn order_completed_event(user_id: i64, order_id: i64, date: NaiveDate) -> NewScoreEvent {
    NewScoreEvent {
        user_id,
        score_title: ORDER_COMPLETED.to_string(),
        points: ORDER_COMPLETED_POINTS,
        event_date: date,
        order_id: Some(order_id),
    }
}

/// Loyalty score bookkeeping.
///
/// Uniqueness (one daily login per user per day, one event per order) is left
/// to the store; a duplicate surfaces as `StoreError::Conflict`.
#[derive(Clone)]
pub struct ScoreService {
    scores: Arc<dyn ScoreRepo>,
}

impl ScoreService {
    pub fn new(scores: Arc<dyn ScoreRepo>) -> Self {
        Self { scores }
    }

    /// # Errors
    ///
    /// Returns a store conflict if the user already logged a login on `date`.
    pub async fn record_daily_login(
        &self,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<ScoreEvent, ServiceError> {
        let event = NewScoreEvent {
            user_id,
            score_title: DAILY_LOGIN.to_string(),
            points: DAILY_LOGIN_POINTS,
            event_date: date,
            order_id: None,
        };
        let saved = self.scores.insert_score_event(&event).await?;
        tracing::info!(user_id, %date, "daily login recorded");
        Ok(saved)
    }

    /// # Errors
    ///
    /// Returns a store error if the events cannot be read.
    pub async fn summary(&self, user_id: i64) -> Result<ScoreSummary, ServiceError> {
        let events = self.scores.list_score_events(user_id).await?;
        let total_points = events.iter().map(|e| i64::from(e.points)).sum();
        Ok(ScoreSummary {
            total_points,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::StoreError;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).expect("date")
    }

    #[tokio::test]
    async fn second_daily_login_on_same_day_conflicts() {
        let svc = ScoreService::new(Arc::new(MemoryStore::new()));
        svc.record_daily_login(1, day(3)).await.expect("first");

        let err = svc
            .record_daily_login(1, day(3))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, ServiceError::Store(StoreError::Conflict(_))));

        svc.record_daily_login(1, day(4)).await.expect("next day");
        svc.record_daily_login(2, day(3)).await.expect("other user");
    }

    #[tokio::test]
    async fn summary_totals_points() {
        let store = Arc::new(MemoryStore::new());
        let svc = ScoreService::new(store.clone());
        svc.record_daily_login(5, day(1)).await.expect("login");
        store
            .insert_score_event(&order_completed_event(5, 9, day(1)))
            .await
            .expect("order");
        svc.record_daily_login(6, day(1)).await.expect("other user");

        let summary = svc.summary(5).await.expect("summary");
        assert_eq!(summary.events.len(), 2);
        assert_eq!(
            summary.total_points,
            i64::from(DAILY_LOGIN_POINTS + ORDER_COMPLETED_POINTS)
        );
    }
}
