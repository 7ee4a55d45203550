use axum::{extract::State, Json};
use serde_json::{json, Value};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{
    cache::{QueryKey, Scope},
    realtime::Hub,
    session::CurrentUser,
    AppError, AppResult,
};

pub async fn time_balance(db_pool: &SqlitePool, user_id: Uuid) -> sqlx::Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT balance FROM time_balances WHERE user_id=?")
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(row.map(|(b,)| b).unwrap_or(0))
}

pub(crate) async fn open_account(conn: &mut SqliteConnection, user_id: Uuid, initial: i64) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO time_balances (user_id,balance) VALUES (?,?) ON CONFLICT(user_id) DO NOTHING")
        .bind(user_id)
        .bind(initial)
        .execute(conn)
        .await?;
    Ok(())
}

/// Takes `amount` off the balance, or fails with the insufficient credits
/// error leaving the balance untouched.
pub(crate) async fn debit(conn: &mut SqliteConnection, user_id: Uuid, amount: i64) -> AppResult<()> {
    let (balance,): (i64,) = sqlx::query_as("SELECT COALESCE((SELECT balance FROM time_balances WHERE user_id=?), 0)")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

    if balance < amount {
        return Err(insufficient(balance, amount));
    }

    let updated = sqlx::query("UPDATE time_balances SET balance = balance - ? WHERE user_id=? AND balance >= ?")
        .bind(amount)
        .bind(user_id)
        .bind(amount)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if updated != 1 {
        return Err(insufficient(balance, amount));
    }
    Ok(())
}

pub(crate) async fn credit(conn: &mut SqliteConnection, user_id: Uuid, amount: i64) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO time_balances (user_id,balance) VALUES (?,?)
         ON CONFLICT(user_id) DO UPDATE SET balance = balance + excluded.balance",
    )
    .bind(user_id)
    .bind(amount)
    .execute(conn)
    .await?;
    Ok(())
}

pub fn insufficient(available: i64, required: i64) -> AppError {
    AppError::unprocessable(format!(
        "Insufficient time credits. Available: {available}, Required: {required}"
    ))
}

#[tracing::instrument(skip(db_pool, hub))]
pub async fn get_balance(
    CurrentUser(user_id): CurrentUser,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<Value>> {
    let value = hub
        .cache()
        .get_or_load(QueryKey::new("time-balance", Scope::User(user_id)), || async {
            let balance = time_balance(&db_pool, user_id).await?;
            Ok::<_, AppError>(json!({ "balance": balance }))
        })
        .await?;
    Ok(Json((*value).clone()))
}
