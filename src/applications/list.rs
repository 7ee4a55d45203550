use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    cache::{QueryKey, Scope},
    db::{self, columns, OfferApplication, APPLICATION_COLUMNS},
    realtime::Hub,
    session::CurrentUser,
    AppError, AppResult,
};

/// Application with who applied.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ApplicationView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub application: OfferApplication,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

pub async fn applications_for_offer(db_pool: &SqlitePool, offer_id: Uuid) -> sqlx::Result<Vec<ApplicationView>> {
    sqlx::query_as(&format!(
        "SELECT {}, p.username, p.avatar_url
         FROM offer_applications a LEFT JOIN profiles p ON p.id = a.applicant_id
         WHERE a.offer_id=?
         ORDER BY a.created_at",
        columns(APPLICATION_COLUMNS, "a")
    ))
    .bind(offer_id)
    .fetch_all(db_pool)
    .await
}

pub async fn user_application(
    db_pool: &SqlitePool,
    user_id: Uuid,
    offer_id: Uuid,
) -> sqlx::Result<Option<OfferApplication>> {
    sqlx::query_as(&format!(
        "SELECT {APPLICATION_COLUMNS} FROM offer_applications WHERE applicant_id=? AND offer_id=?"
    ))
    .bind(user_id)
    .bind(offer_id)
    .fetch_optional(db_pool)
    .await
}

pub async fn user_applications(db_pool: &SqlitePool, user_id: Uuid) -> sqlx::Result<Vec<OfferApplication>> {
    sqlx::query_as(&format!(
        "SELECT {APPLICATION_COLUMNS} FROM offer_applications WHERE applicant_id=? ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(db_pool)
    .await
}

/// Only the owner gets to see who applied.
#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn get_offer_applications(
    CurrentUser(user_id): CurrentUser,
    Path(offer_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<Value>> {
    match db::get_offer(&db_pool, offer_id).await? {
        Some(offer) if offer.profile_id == user_id => {}
        _ => return Err(AppError::not_found("Offer not found")),
    }

    let value = hub
        .cache()
        .get_or_load(QueryKey::new("offer-applications", Scope::Offer(offer_id)), || async {
            Ok::<_, AppError>(serde_json::to_value(applications_for_offer(&db_pool, offer_id).await?)?)
        })
        .await?;
    Ok(Json((*value).clone()))
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn get_user_application(
    CurrentUser(user_id): CurrentUser,
    Path(offer_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<Value>> {
    let key = QueryKey::new("user-application", Scope::UserOffer(user_id, offer_id));
    let value = hub
        .cache()
        .get_or_load(key, || async {
            Ok::<_, AppError>(serde_json::to_value(user_application(&db_pool, user_id, offer_id).await?)?)
        })
        .await?;
    Ok(Json((*value).clone()))
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn get_user_applications(
    CurrentUser(user_id): CurrentUser,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<Value>> {
    let value = hub
        .cache()
        .get_or_load(QueryKey::new("user-applications", Scope::User(user_id)), || async {
            Ok::<_, AppError>(serde_json::to_value(user_applications(&db_pool, user_id).await?)?)
        })
        .await?;
    Ok(Json((*value).clone()))
}
