mod completed;
mod pending;
mod stats;

use std::sync::Arc;

use axum::{
    debug_handler,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    applications,
    button::{ApplyButton, ButtonInput},
    claims, include_res,
    offers::Card,
    profiles,
    res::escape,
    session, AppResult, AppState, Config,
};

pub use completed::{completed_offers, time_ago, CompletedOffer};
pub use pending::{pending_offers, PendingOffer};
pub use stats::quick_stats;

pub(crate) use completed::get_completed;
pub(crate) use pending::get_pending;
pub(crate) use stats::get_stats;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

#[debug_handler(state = AppState)]
async fn index(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    session: Session,
) -> AppResult<Response> {
    let Some(user_id) = session::user_id(&session).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    let Some(profile) = profiles::find_profile(&db_pool, user_id).await? else {
        // account vanished under a live session
        session.flush().await?;
        return Ok(Redirect::to("/login").into_response());
    };
    if !profile.onboarded {
        return Ok(Redirect::to("/onboarding").into_response());
    }

    let stats = quick_stats(&db_pool, user_id, config.initial_balance).await?;
    let pending = pending_offers(&db_pool, user_id).await?;
    let claimed = claims::claimed_offer_ids(&db_pool, user_id).await?;

    let mut my_offers = String::new();
    let mut my_applications = String::new();
    for item in &pending {
        let offer = &item.offer;
        if item.is_applied {
            let button = ApplyButton::resolve(ButtonInput {
                is_applied: true,
                status: Some(offer.status),
                application_status: item.application_status,
                user_application: item.application_status,
                claimed: claimed.contains(&offer.id),
                is_owner: false,
            });
            my_applications += &Card { button, ..Card::default_for(offer) }.render();
        } else {
            let views = applications::applications_for_offer(&db_pool, offer.id).await?;
            my_offers += &Card {
                owner_name: Some(profile.username.as_str()),
                applications: Some(views.as_slice()),
                ..Card::default_for(offer)
            }
            .render();
        }
    }

    if my_offers.is_empty() {
        my_offers = "<p class=\"muted\">No pending offers</p>".to_owned();
    }
    if my_applications.is_empty() {
        my_applications = "<p class=\"muted\">No applications yet</p>".to_owned();
    }

    Ok(Html(
        include_res!(str, "/pages/index.html")
            .replace("{username}", &escape(&profile.username))
            .replace("{balance}", &stats.time_balance.to_string())
            .replace("{active_offers}", &stats.active_offers.to_string())
            .replace("{hours_exchanged}", &stats.hours_exchanged.to_string())
            .replace("{my_offers}", &my_offers)
            .replace("{my_applications}", &my_applications)
    ).into_response())
}
