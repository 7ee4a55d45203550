use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL, USER_ID},
    AppError, AppResult, AppState, Config, GetField,
};

use super::{find_or_create_profile, ClientProvider, Clients};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FirebaseRequest {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

/// Only same-site paths are followed after login.
pub(crate) fn local_path<'a>(url: Option<&'a str>, fallback: &'a str) -> &'a str {
    match url {
        Some(url) if url.starts_with('/') && !url.starts_with("//") => url,
        _ => fallback,
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(db_pool): State<SqlitePool>,
    State(clients): State<Clients>,
    State(config): State<Arc<Config>>,
    session: Session,
) -> AppResult<Response> {
    let state = CsrfToken::new(state.ok_or_else(|| AppError::bad_request("OAuth: without state"))?);
    let code = AuthorizationCode::new(code.ok_or_else(|| AppError::bad_request("OAuth: without code"))?);

    let Some(stored_state) = session.remove::<String>(CSRF_STATE).await? else {
        return Err(AppError::bad_request("no csrf_state"));
    };

    if state.secret().as_str() != stored_state.as_str() {
        return Err(AppError::bad_request("csrf tokens don't match"));
    }

    let Some(pkce_verifier) = session.remove::<String>(PKCE_VERIFIER).await? else {
        return Err(AppError::bad_request("no pkce_verifier"));
    };

    let client = clients.get_client(provider)?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await
        .map_err(|e| AppError::new(StatusCode::UNAUTHORIZED, format!("OAuth token exchange failed: {e}")))?;

    let access_token = token_result.access_token().secret();
    let body: serde_json::Value = http_client.post(clients.idp_url()?)
        .json(&FirebaseRequest {
            post_body: format!("access_token={access_token}&providerId={}", provider.id()),
            request_uri: config.public_url.clone(),
            return_idp_credential: true,
            return_secure_token: true,
        })
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let auth_subject = body.get_str_field("localId")?;
    let avatar_url = body.get("photoUrl").and_then(|v| v.as_str());
    let (profile, created) =
        find_or_create_profile(&db_pool, &auth_subject, avatar_url, config.initial_balance).await?;

    session.cycle_id().await?;
    session.insert(USER_ID, profile.id).await?;
    let return_url = session.remove::<String>(RETURN_URL).await?;

    tracing::info!(user_id = %profile.id, %provider, created, "logged in");

    if created || !profile.onboarded {
        return Ok(Redirect::to("/onboarding").into_response());
    }
    Ok(Redirect::to(local_path(return_url.as_deref(), "/")).into_response())
}
