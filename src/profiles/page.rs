use axum::{
    debug_handler,
    extract::State,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde_json::Value;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    applications,
    button::ApplyButton,
    cache::{QueryKey, Scope},
    db::Profile,
    home, include_res,
    offers::{self, Card},
    realtime::Hub,
    res::{self, escape, to_login},
    session::{self, CurrentUser},
    AppError, AppResult, AppState, ResultExt,
};

use super::{find_profile, update_profile, ProfileInput};

#[debug_handler(state = AppState)]
pub(crate) async fn profile_page(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let Some(user_id) = session::user_id(&session).await? else {
        return Ok(to_login("/profile"));
    };
    let Some(profile) = find_profile(&db_pool, user_id).await? else {
        return res::sorry("profile");
    };

    let mut services = String::new();
    for service in profile.services.iter() {
        services += &format!("<span class=\"badge\">{}</span>", escape(service));
    }

    let mut my_offers = String::new();
    for offer in offers::user_offers(&db_pool, user_id).await? {
        let views = applications::applications_for_offer(&db_pool, offer.id).await?;
        my_offers += &Card {
            owner_name: Some(profile.username.as_str()),
            applications: Some(views.as_slice()),
            ..Card::default_for(&offer)
        }
        .render();
    }
    if my_offers.is_empty() {
        my_offers = "<p class=\"muted\">You haven't posted any offers yet</p>".to_owned();
    }

    let mut completed = String::new();
    for item in home::completed_offers(&db_pool, user_id).await? {
        let note = match (item.is_for_you, item.provider_username.as_deref()) {
            (true, Some(provider)) => format!("Completed by: {provider}, {}", item.time_ago),
            _ => format!("Completed {}", item.time_ago),
        };
        // the provider claims, the requester just sees the record
        let button = (!item.is_for_you).then_some(ApplyButton::Claim { claimed: item.claimed });
        completed += &Card {
            button,
            note: Some(note.as_str()),
            ..Card::default_for(&item.offer)
        }
        .render();
    }
    if completed.is_empty() {
        completed = "<p class=\"muted\">No completed offers yet</p>".to_owned();
    }

    Ok(Html(
        include_res!(str, "/pages/profile.html")
            .replace("{username}", &escape(&profile.username))
            .replace("{avatar_url}", &escape(profile.avatar_url.as_deref().unwrap_or("")))
            .replace("{services_csv}", &escape(&profile.services.join(", ")))
            .replace("{services}", &services)
            .replace("{my_offers}", &my_offers)
            .replace("{completed_offers}", &completed)
    ).into_response())
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn get_profile(
    CurrentUser(user_id): CurrentUser,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
) -> AppResult<Json<Value>> {
    let value = hub
        .cache()
        .get_or_load(QueryKey::new("profile", Scope::User(user_id)), || async {
            let profile = find_profile(&db_pool, user_id)
                .await?
                .ok_or_else(|| AppError::not_found("Profile not found"))?;
            Ok::<_, AppError>(serde_json::to_value(profile)?)
        })
        .await?;
    Ok(Json((*value).clone()))
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn put_profile(
    CurrentUser(user_id): CurrentUser,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    Json(input): Json<ProfileInput>,
) -> AppResult<Json<Profile>> {
    let profile = update_profile(&db_pool, &hub, user_id, input)
        .await
        .context("Failed to update profile")?;
    Ok(Json(profile))
}
