use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    cache::{QueryKey, Scope},
    db::{columns, ApplicationStatus, Offer, OFFER_COLUMNS},
    realtime::Hub,
    session::CurrentUser,
    AppError, AppResult,
};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PendingOffer {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub offer: Offer,
    /// False for the user's own offers, true for offers they applied to.
    pub is_applied: bool,
    pub application_status: Option<ApplicationStatus>,
}

/// The user's own open offers first, then the offers they applied to.
pub async fn pending_offers(db_pool: &SqlitePool, user_id: Uuid) -> sqlx::Result<Vec<PendingOffer>> {
    let mut own: Vec<PendingOffer> = sqlx::query_as(&format!(
        "SELECT {OFFER_COLUMNS}, FALSE AS is_applied, NULL AS application_status
         FROM offers
         WHERE profile_id=? AND status NOT IN ('completed', 'cancelled')
         ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(db_pool)
    .await?;

    let applied: Vec<PendingOffer> = sqlx::query_as(&format!(
        "SELECT {}, TRUE AS is_applied, a.status AS application_status
         FROM offer_applications a JOIN offers o ON o.id = a.offer_id
         WHERE a.applicant_id=? AND o.status != 'cancelled'
         ORDER BY a.created_at DESC",
        columns(OFFER_COLUMNS, "o")
    ))
    .bind(user_id)
    .fetch_all(db_pool)
    .await?;

    own.extend(applied);
    Ok(own)
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn get_pending(
    CurrentUser(user_id): CurrentUser,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<Value>> {
    let value = hub
        .cache()
        .get_or_load(QueryKey::new("pending-offers", Scope::User(user_id)), || async {
            Ok::<_, AppError>(serde_json::to_value(pending_offers(&db_pool, user_id).await?)?)
        })
        .await?;
    Ok(Json((*value).clone()))
}
