use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    cache::{QueryKey, Scope},
    db::UserStats,
    realtime::Hub,
    session::CurrentUser,
    AppError, AppResult, Config,
};

/// The user's stats row, or a fresh account's numbers when there is none.
pub async fn quick_stats(db_pool: &SqlitePool, user_id: Uuid, initial_balance: i64) -> sqlx::Result<UserStats> {
    let stats: Option<UserStats> = sqlx::query_as(
        "SELECT user_id, time_balance, active_offers, hours_exchanged FROM user_stats WHERE user_id=?",
    )
    .bind(user_id)
    .fetch_optional(db_pool)
    .await?;

    Ok(stats.unwrap_or(UserStats {
        user_id,
        time_balance: initial_balance,
        active_offers: 0,
        hours_exchanged: 0,
    }))
}

#[tracing::instrument(skip(db_pool, hub, config))]
pub(crate) async fn get_stats(
    CurrentUser(user_id): CurrentUser,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    State(config): State<Arc<Config>>,
) -> AppResult<Json<Value>> {
    let value = hub
        .cache()
        .get_or_load(QueryKey::new("user-stats", Scope::User(user_id)), || async {
            let stats = quick_stats(&db_pool, user_id, config.initial_balance).await?;
            Ok::<_, AppError>(serde_json::to_value(stats)?)
        })
        .await?;
    Ok(Json((*value).clone()))
}
