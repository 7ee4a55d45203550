use std::cmp::Ordering;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    balances,
    db::{self, Offer, OfferStatus, OFFER_COLUMNS},
    realtime::{Change, ChangeKind, Hub, Table},
    session::CurrentUser,
    AppError, AppResult, ResultExt,
};

use super::OfferInput;

/// Loads an offer the user owns. Someone else's offer looks like a missing one.
pub(super) async fn owned_offer(conn: &mut sqlx::SqliteConnection, user_id: Uuid, offer_id: Uuid) -> AppResult<Offer> {
    match db::get_offer(&mut *conn, offer_id).await? {
        Some(offer) if offer.profile_id == user_id => Ok(offer),
        _ => Err(AppError::not_found("Offer not found")),
    }
}

pub async fn update_offer(
    db_pool: &SqlitePool,
    hub: &Hub,
    user_id: Uuid,
    offer_id: Uuid,
    input: OfferInput,
) -> AppResult<Offer> {
    let new = input.validate()?;

    let mut tx = db::begin_write(db_pool).await?;
    let offer = owned_offer(&mut tx, user_id, offer_id).await?;

    if offer.status != OfferStatus::Available {
        return Err(AppError::conflict(format!(
            "Only available offers can be edited (this one is {})",
            offer.status
        )));
    }

    let delta = new.time_credits - offer.time_credits;
    match delta.cmp(&0) {
        Ordering::Greater => balances::debit(&mut tx, user_id, delta).await?,
        Ordering::Less => balances::credit(&mut tx, user_id, -delta).await?,
        Ordering::Equal => {}
    }

    let updated: Offer = sqlx::query_as(&format!(
        "UPDATE offers SET title=?, description=?, service_type=?, hours=?, duration=?, time_credits=?, date=?, updated_at=?
         WHERE id=?
         RETURNING {OFFER_COLUMNS}"
    ))
    .bind(&new.title)
    .bind(&new.description)
    .bind(&new.service_type)
    .bind(new.duration)
    .bind(new.duration)
    .bind(new.time_credits)
    .bind(&new.date)
    .bind(db::now())
    .bind(offer_id)
    .fetch_one(&mut *tx)
    .await?;

    let audience = db::offer_audience(&mut *tx, offer_id).await?;
    tx.commit().await?;

    tracing::info!(%offer_id, %user_id, delta, "offer updated");
    hub.publish(
        Change::new(Table::Offers, ChangeKind::Update, offer_id)
            .offer(offer_id)
            .users(audience),
    )
    .await;
    if delta != 0 {
        hub.publish(Change::balance(user_id)).await;
    }

    Ok(updated)
}

/// Removes the offer with its applications and refunds the escrowed credits.
pub async fn delete_offer(db_pool: &SqlitePool, hub: &Hub, user_id: Uuid, offer_id: Uuid) -> AppResult<()> {
    let mut tx = db::begin_write(db_pool).await?;
    let offer = owned_offer(&mut tx, user_id, offer_id).await?;

    // collected up front, the applications are gone afterwards
    let audience = db::offer_audience(&mut *tx, offer_id).await?;

    if offer.status == OfferStatus::Completed {
        return Err(AppError::conflict("Completed offers cannot be deleted"));
    }

    sqlx::query("DELETE FROM offer_applications WHERE offer_id=?")
        .bind(offer_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM offers WHERE id=?")
        .bind(offer_id)
        .execute(&mut *tx)
        .await?;

    let refund = match offer.status {
        OfferStatus::Cancelled => 0,
        _ => offer.time_credits,
    };
    if refund > 0 {
        balances::credit(&mut tx, user_id, refund).await?;
    }

    tx.commit().await?;

    tracing::info!(%offer_id, %user_id, refund, "offer deleted");
    hub.publish_all([
        Change::new(Table::OfferApplications, ChangeKind::Delete, offer_id)
            .offer(offer_id)
            .users(audience.iter().copied()),
        Change::new(Table::Offers, ChangeKind::Delete, offer_id)
            .offer(offer_id)
            .users(audience),
        Change::balance(user_id),
    ])
    .await;

    Ok(())
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn put_offer(
    CurrentUser(user_id): CurrentUser,
    Path(offer_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    Json(input): Json<OfferInput>,
) -> AppResult<Json<Offer>> {
    let offer = update_offer(&db_pool, &hub, user_id, offer_id, input)
        .await
        .context("Failed to update offer")?;
    Ok(Json(offer))
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn delete_offer_handler(
    CurrentUser(user_id): CurrentUser,
    Path(offer_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<StatusCode> {
    delete_offer(&db_pool, &hub, user_id, offer_id)
        .await
        .context("Failed to delete offer")?;
    Ok(StatusCode::NO_CONTENT)
}
