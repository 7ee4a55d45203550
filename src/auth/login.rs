use axum::{
    debug_handler,
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use oauth2::{CsrfToken, PkceCodeChallenge, Scope};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{
    include_res,
    res::escape,
    session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL},
    AppResult, AppState,
};

use super::{ClientProvider, Clients};

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    pub(crate) return_url: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn login_page(
    Query(LoginQuery { return_url }): Query<LoginQuery>,
    State(clients): State<Clients>,
) -> impl IntoResponse {
    let query = return_url
        .map(|url| format!("?return_url={}", escape(&url)))
        .unwrap_or_default();

    let mut providers = String::new();
    for provider in clients.providers() {
        providers += &format!(
            "<a class=\"btn\" href=\"/login/{}{query}\">Continue with {provider}</a>",
            provider.path(),
        );
    }
    if providers.is_empty() {
        providers = "<p class=\"muted\">No login providers are configured</p>".to_owned();
    }

    Html(include_res!(str, "/pages/login.html").replace("{providers}", &providers))
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    Path(provider): Path<ClientProvider>,
    Query(LoginQuery { return_url }): Query<LoginQuery>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Response> {
    let client = clients.get_client(provider)?;

    let (pkce_code_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (authorize_url, csrf_state) = client.authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new("openid".to_string()))
        .set_pkce_challenge(pkce_code_challenge)
        .url();

    session.insert(CSRF_STATE, csrf_state.secret()).await?;
    session.insert(PKCE_VERIFIER, pkce_verifier.secret()).await?;
    if let Some(return_url) = return_url {
        session.insert(RETURN_URL, return_url).await?;
    }

    tracing::debug!(%provider, "redirecting to provider");
    Ok(Redirect::to(authorize_url.as_str()).into_response())
}
