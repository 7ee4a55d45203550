use std::collections::HashMap;

use axum::{
    debug_handler,
    extract::{Path, State},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    applications,
    button::{ApplyButton, ButtonInput},
    claims,
    cache::{QueryKey, Scope},
    db::{self, columns, Offer, OFFER_COLUMNS},
    include_res,
    realtime::Hub,
    res::to_login,
    session::{self, CurrentUser},
    AppError, AppResult,
};

use super::Card;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OfferListing {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub offer: Offer,
    pub owner_username: Option<String>,
}

/// Everything not cancelled, newest first, with the owner's name.
pub async fn list_offers(db_pool: &SqlitePool) -> sqlx::Result<Vec<OfferListing>> {
    sqlx::query_as(&format!(
        "SELECT {}, p.username AS owner_username
         FROM offers o LEFT JOIN profiles p ON p.id = o.profile_id
         WHERE o.status != 'cancelled'
         ORDER BY o.created_at DESC",
        columns(OFFER_COLUMNS, "o")
    ))
    .fetch_all(db_pool)
    .await
}

pub async fn get_offer(db_pool: &SqlitePool, offer_id: Uuid) -> AppResult<Offer> {
    db::get_offer(db_pool, offer_id)
        .await?
        .ok_or_else(|| AppError::not_found("Offer not found"))
}

pub async fn user_offers(db_pool: &SqlitePool, user_id: Uuid) -> sqlx::Result<Vec<Offer>> {
    sqlx::query_as(&format!(
        "SELECT {OFFER_COLUMNS} FROM offers WHERE profile_id=? ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(db_pool)
    .await
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn get_offers(
    CurrentUser(user_id): CurrentUser,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<Value>> {
    let value = hub
        .cache()
        .get_or_load(QueryKey::new("offers", Scope::All), || async {
            Ok::<_, AppError>(serde_json::to_value(list_offers(&db_pool).await?)?)
        })
        .await?;
    Ok(Json((*value).clone()))
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn get_one(
    CurrentUser(user_id): CurrentUser,
    Path(offer_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<Value>> {
    let value = hub
        .cache()
        .get_or_load(QueryKey::new("offer", Scope::Offer(offer_id)), || async {
            Ok::<_, AppError>(serde_json::to_value(get_offer(&db_pool, offer_id).await?)?)
        })
        .await?;
    Ok(Json((*value).clone()))
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn get_user_offers(
    CurrentUser(user_id): CurrentUser,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<Value>> {
    let value = hub
        .cache()
        .get_or_load(QueryKey::new("user-offers", Scope::User(user_id)), || async {
            Ok::<_, AppError>(serde_json::to_value(user_offers(&db_pool, user_id).await?)?)
        })
        .await?;
    Ok(Json((*value).clone()))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn explore_page(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let Some(user_id) = session::user_id(&session).await? else {
        return Ok(to_login("/offers"));
    };

    let listings = list_offers(&db_pool).await?;
    let mine: HashMap<Uuid, _> = applications::user_applications(&db_pool, user_id)
        .await?
        .into_iter()
        .map(|a| (a.offer_id, a.status))
        .collect();
    let claimed = claims::claimed_offer_ids(&db_pool, user_id).await?;

    let mut cards = String::new();
    for listing in &listings {
        let offer = &listing.offer;
        let user_application = mine.get(&offer.id).copied();
        let button = ApplyButton::resolve(ButtonInput {
            is_applied: user_application.is_some(),
            status: Some(offer.status),
            application_status: user_application,
            user_application,
            claimed: claimed.contains(&offer.id),
            is_owner: offer.profile_id == user_id,
        });

        cards += &Card {
            offer,
            owner_name: listing.owner_username.as_deref(),
            button,
            ..Card::default_for(offer)
        }
        .render();
    }

    if listings.is_empty() {
        cards = "<p class=\"muted\">No offers found</p>".to_owned();
    }

    Ok(Html(
        include_res!(str, "/pages/explore.html").replace("{cards}", &cards)
    ).into_response())
}
