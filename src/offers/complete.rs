use axum::{
    extract::{Path, State},
    Json,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::{self, Transaction, TRANSACTION_COLUMNS},
    realtime::{Change, ChangeKind, Hub, Table},
    session::CurrentUser,
    AppError, AppResult, ResultExt,
};

use super::edit::owned_offer;

/// Service name stored on the transaction when the offer has none.
const DEFAULT_SERVICE: &str = "Time Exchange";

/// Owner marks a booked offer done. Writes the unclaimed transaction the
/// provider later claims.
pub async fn complete_offer(db_pool: &SqlitePool, hub: &Hub, user_id: Uuid, offer_id: Uuid) -> AppResult<Transaction> {
    let mut tx = db::begin_write(db_pool).await?;
    let offer = owned_offer(&mut tx, user_id, offer_id).await?;

    if !offer.status.is_in_progress() {
        return Err(AppError::conflict(format!(
            "Only booked offers can be completed (this one is {})",
            offer.status
        )));
    }

    let Some((provider_id,)): Option<(Uuid,)> = sqlx::query_as(
        "SELECT applicant_id FROM offer_applications WHERE offer_id=? AND status='accepted'",
    )
    .bind(offer_id)
    .fetch_optional(&mut *tx)
    .await?
    else {
        return Err(AppError::conflict("Offer has no accepted application"));
    };

    let now = db::now();
    sqlx::query("UPDATE offers SET status='completed', updated_at=? WHERE id=?")
        .bind(now)
        .bind(offer_id)
        .execute(&mut *tx)
        .await?;

    let service = match offer.service_type.trim() {
        "" => DEFAULT_SERVICE,
        service => service,
    };
    sqlx::query(
        "INSERT INTO transactions (id,offer_id,user_id,provider_id,hours,service,claimed,created_at)
         VALUES (?,?,?,?,?,?,FALSE,?)
         ON CONFLICT(offer_id) DO NOTHING",
    )
    .bind(Uuid::now_v7())
    .bind(offer_id)
    .bind(user_id)
    .bind(provider_id)
    .bind(offer.time_credits)
    .bind(service)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let transaction: Transaction = sqlx::query_as(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE offer_id=?"
    ))
    .bind(offer_id)
    .fetch_one(&mut *tx)
    .await?;

    let audience = db::offer_audience(&mut *tx, offer_id).await?;
    tx.commit().await?;

    tracing::info!(%offer_id, %user_id, %provider_id, "offer completed");
    hub.publish_all([
        Change::new(Table::Offers, ChangeKind::Update, offer_id)
            .offer(offer_id)
            .users(audience),
        Change::new(Table::Transactions, ChangeKind::Insert, transaction.id)
            .offer(offer_id)
            .users([user_id, provider_id]),
    ])
    .await;

    Ok(transaction)
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn post_complete(
    CurrentUser(user_id): CurrentUser,
    Path(offer_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<Transaction>> {
    let transaction = complete_offer(&db_pool, &hub, user_id, offer_id)
        .await
        .context("Failed to complete offer")?;
    Ok(Json(transaction))
}
