use axum::{
    debug_handler,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    include_res,
    realtime::Hub,
    res::{escape, to_login},
    session, AppResult, AppState,
};

use super::{find_profile, update_profile, ProfileInput, ServicesInput};

#[derive(Debug, Deserialize)]
pub(crate) struct OnboardingForm {
    username: String,
    #[serde(default)]
    services: String,
}

fn render(username: &str, services: &str, error: Option<&str>) -> Response {
    let error = error
        .map(|e| format!("<p class=\"alert\">{}</p>", escape(e)))
        .unwrap_or_default();
    Html(
        include_res!(str, "/pages/onboarding.html")
            .replace("{username}", &escape(username))
            .replace("{services}", &escape(services))
            .replace("{error}", &error)
    ).into_response()
}

#[debug_handler(state = AppState)]
pub(crate) async fn onboarding_page(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let Some(user_id) = session::user_id(&session).await? else {
        return Ok(to_login("/onboarding"));
    };
    let Some(profile) = find_profile(&db_pool, user_id).await? else {
        return Ok(to_login("/onboarding"));
    };

    Ok(render(&profile.username, &profile.services.join(", "), None))
}

#[debug_handler(state = AppState)]
pub(crate) async fn post_onboarding(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    session: Session,
    Form(OnboardingForm { username, services }): Form<OnboardingForm>,
) -> AppResult<Response> {
    let Some(user_id) = session::user_id(&session).await? else {
        return Ok(to_login("/onboarding"));
    };

    let input = ProfileInput {
        username: username.clone(),
        services: ServicesInput::Text(services.clone()),
    };
    match update_profile(&db_pool, &hub, user_id, input).await {
        Ok(_) => Ok(Redirect::to("/").into_response()),
        Err(err) if err.status.is_client_error() => {
            Ok(render(&username, &services, Some(&err.message())))
        }
        Err(err) => Err(err),
    }
}
