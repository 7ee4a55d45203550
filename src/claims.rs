//! Moving a completed offer's credits to the person who did the work.
//!
//! There is one claim path, keyed by offer id. The transaction row is created
//! on demand, and only the claim that flips `claimed` from false to true pays
//! out, so claiming twice (or from two tabs at once) credits exactly once.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    balances,
    db::{self, OfferStatus, Transaction, TRANSACTION_COLUMNS},
    realtime::{Change, ChangeKind, Hub, Table},
    session::CurrentUser,
    AppError, AppResult, ResultExt,
};

#[derive(Debug, Clone, Serialize)]
pub struct ClaimOutcome {
    pub transaction: Transaction,
    /// False when the credits had already been claimed.
    pub credited: bool,
    pub message: &'static str,
}

pub async fn claim_credits(db_pool: &SqlitePool, hub: &Hub, user_id: Uuid, offer_id: Uuid) -> AppResult<ClaimOutcome> {
    let mut tx = db::begin_write(db_pool).await?;
    let now = db::now();

    // Starts with a write so this transaction holds the lock before it reads.
    // Inserts nothing unless the caller is the accepted applicant of a
    // completed offer and no transaction exists yet.
    sqlx::query(
        "INSERT INTO transactions (id,offer_id,user_id,provider_id,hours,service,claimed,created_at)
         SELECT ?, o.id, o.profile_id, a.applicant_id, o.time_credits,
                CASE WHEN trim(o.service_type) = '' THEN 'Time Exchange' ELSE o.service_type END,
                FALSE, ?
         FROM offers o
         JOIN offer_applications a ON a.offer_id = o.id AND a.status = 'accepted'
         WHERE o.id=? AND o.status='completed' AND a.applicant_id=?
         ON CONFLICT(offer_id) DO NOTHING",
    )
    .bind(Uuid::now_v7())
    .bind(now)
    .bind(offer_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    let offer = db::get_offer(&mut *tx, offer_id)
        .await?
        .ok_or_else(|| AppError::not_found("Offer not found"))?;

    if offer.status != OfferStatus::Completed {
        return Err(AppError::conflict("Offer is not completed yet"));
    }

    let accepted: Option<(Uuid,)> = sqlx::query_as(
        "SELECT applicant_id FROM offer_applications WHERE offer_id=? AND status='accepted'",
    )
    .bind(offer_id)
    .fetch_optional(&mut *tx)
    .await?;

    if accepted != Some((user_id,)) {
        return Err(AppError::forbidden("Only the accepted applicant can claim these credits"));
    }

    let transaction: Transaction = sqlx::query_as(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE offer_id=?"
    ))
    .bind(offer_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::conflict("No transaction recorded for this offer"))?;

    if transaction.provider_id != user_id {
        return Err(AppError::forbidden("These credits belong to someone else"));
    }

    let flipped = sqlx::query("UPDATE transactions SET claimed=TRUE, claimed_at=? WHERE id=? AND claimed=FALSE")
        .bind(now)
        .bind(transaction.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let credited = flipped == 1;
    if credited {
        balances::credit(&mut tx, user_id, transaction.hours).await?;
    }

    let transaction: Transaction = sqlx::query_as(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id=?"
    ))
    .bind(transaction.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    if credited {
        tracing::info!(%offer_id, provider_id = %user_id, hours = transaction.hours, "credits claimed");
        hub.publish_all([
            Change::new(Table::Transactions, ChangeKind::Update, transaction.id)
                .offer(offer_id)
                .users([transaction.user_id, user_id]),
            Change::balance(user_id),
        ])
        .await;
    } else {
        tracing::debug!(%offer_id, provider_id = %user_id, "credits already claimed");
    }

    Ok(ClaimOutcome {
        transaction,
        credited,
        message: if credited { "Credits claimed" } else { "Credits already claimed" },
    })
}

/// Offers whose credits the user already claimed as provider.
pub async fn claimed_offer_ids(db_pool: &SqlitePool, user_id: Uuid) -> sqlx::Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT offer_id FROM transactions WHERE provider_id=? AND claimed")
        .bind(user_id)
        .fetch_all(db_pool)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn post_claim(
    CurrentUser(user_id): CurrentUser,
    Path(offer_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<ClaimOutcome>> {
    let outcome = claim_credits(&db_pool, &hub, user_id, offer_id)
        .await
        .context("Failed to claim credits")?;
    Ok(Json(outcome))
}
