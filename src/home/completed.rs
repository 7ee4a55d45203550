use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    cache::{QueryKey, Scope},
    db::{self, columns, Offer, OFFER_COLUMNS},
    realtime::Hub,
    session::CurrentUser,
    AppError, AppResult,
};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CompletedOffer {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub offer: Offer,
    /// The user requested the work and pays for it.
    pub is_for_you: bool,
    pub provider_id: Option<Uuid>,
    pub provider_username: Option<String>,
    pub claimed: bool,
    #[sqlx(skip)]
    pub time_ago: String,
}

/// Completed offers the user paid for or worked on, most recent first.
pub async fn completed_offers(db_pool: &SqlitePool, user_id: Uuid) -> sqlx::Result<Vec<CompletedOffer>> {
    let mut offers: Vec<CompletedOffer> = sqlx::query_as(&format!(
        "SELECT {}, o.profile_id = ? AS is_for_you,
                a.applicant_id AS provider_id, p.username AS provider_username,
                COALESCE(t.claimed, FALSE) AS claimed
         FROM offers o
         LEFT JOIN offer_applications a ON a.offer_id = o.id AND a.status = 'accepted'
         LEFT JOIN profiles p ON p.id = a.applicant_id
         LEFT JOIN transactions t ON t.offer_id = o.id
         WHERE o.status = 'completed' AND (o.profile_id = ? OR a.applicant_id = ?)
         ORDER BY o.updated_at DESC",
        columns(OFFER_COLUMNS, "o")
    ))
    .bind(user_id)
    .bind(user_id)
    .bind(user_id)
    .fetch_all(db_pool)
    .await?;

    let now = db::now();
    for completed in &mut offers {
        completed.time_ago = time_ago(completed.offer.updated_at, now);
    }
    Ok(offers)
}

pub fn time_ago(then: OffsetDateTime, now: OffsetDateTime) -> String {
    let elapsed = now - then;
    let (n, unit) = match elapsed.whole_minutes() {
        m if m < 1 => return "just now".to_owned(),
        m if m < 60 => (m, "minute"),
        m if m < 60 * 24 => (elapsed.whole_hours(), "hour"),
        m if m < 60 * 24 * 30 => (elapsed.whole_days(), "day"),
        _ => (elapsed.whole_days() / 30, "month"),
    };
    match n {
        1 => format!("1 {unit} ago"),
        n => format!("{n} {unit}s ago"),
    }
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn get_completed(
    CurrentUser(user_id): CurrentUser,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<Value>> {
    let value = hub
        .cache()
        .get_or_load(QueryKey::new("completed-offers", Scope::User(user_id)), || async {
            Ok::<_, AppError>(serde_json::to_value(completed_offers(&db_pool, user_id).await?)?)
        })
        .await?;
    Ok(Json((*value).clone()))
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    #[test]
    fn relative_times() {
        let now = OffsetDateTime::UNIX_EPOCH + Duration::days(400);
        assert_eq!(time_ago(now - Duration::seconds(20), now), "just now");
        assert_eq!(time_ago(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(time_ago(now - Duration::minutes(45), now), "45 minutes ago");
        assert_eq!(time_ago(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(time_ago(now - Duration::days(2), now), "2 days ago");
        assert_eq!(time_ago(now - Duration::days(65), now), "2 months ago");
    }
}
