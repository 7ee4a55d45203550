use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    appresult::is_unique_violation,
    db::{self, OfferApplication, OfferStatus, APPLICATION_COLUMNS},
    realtime::{Change, ChangeKind, Hub, Table},
    session::CurrentUser,
    AppError, AppResult, ResultExt,
};

/// Files a pending application for someone else's available offer.
pub async fn apply_to_offer(
    db_pool: &SqlitePool,
    hub: &Hub,
    user_id: Uuid,
    offer_id: Uuid,
) -> AppResult<OfferApplication> {
    let offer = db::get_offer(db_pool, offer_id)
        .await?
        .ok_or_else(|| AppError::not_found("Offer not found"))?;

    if offer.profile_id == user_id {
        return Err(AppError::forbidden("You cannot apply to your own offer"));
    }
    if offer.status != OfferStatus::Available {
        return Err(AppError::conflict("Offer is no longer available"));
    }

    let now = db::now();
    // the status check is repeated in the insert, the offer may have been booked meanwhile
    let inserted: Option<OfferApplication> = sqlx::query_as(&format!(
        "INSERT INTO offer_applications (id,offer_id,applicant_id,status,created_at,updated_at)
         SELECT ?,?,?,'pending',?,? WHERE EXISTS (SELECT 1 FROM offers WHERE id=? AND status='available')
         RETURNING {APPLICATION_COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(offer_id)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .bind(offer_id)
    .fetch_optional(db_pool)
    .await
    .map_err(|e| match is_unique_violation(&e) {
        true => AppError::conflict("You have already applied to this offer"),
        false => e.into(),
    })?;

    let Some(application) = inserted else {
        return Err(AppError::conflict("Offer is no longer available"));
    };

    tracing::info!(%offer_id, applicant_id = %user_id, "application submitted");
    hub.publish(
        Change::new(Table::OfferApplications, ChangeKind::Insert, application.id)
            .offer(offer_id)
            .users([user_id, offer.profile_id]),
    )
    .await;

    Ok(application)
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn post_apply(
    CurrentUser(user_id): CurrentUser,
    Path(offer_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<(StatusCode, Json<OfferApplication>)> {
    let application = apply_to_offer(&db_pool, &hub, user_id, offer_id)
        .await
        .context("Failed to submit application")?;
    Ok((StatusCode::CREATED, Json(application)))
}
