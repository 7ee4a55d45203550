use axum::{debug_handler, extract::Query, response::Redirect};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{session::USER_ID, AppResult};

use super::lockin::local_path;

#[derive(Deserialize)]
pub(crate) struct LogoutQuery {
    pub(crate) return_url: Option<String>,
}

#[debug_handler]
pub(crate) async fn logout(
    Query(LogoutQuery { return_url }): Query<LogoutQuery>,
    session: Session
) -> AppResult<Redirect> {
    if let Some(user_id) = session.get::<uuid::Uuid>(USER_ID).await? {
        tracing::info!(%user_id, "logged out");
    }
    session.flush().await?;
    Ok(Redirect::to(local_path(return_url.as_deref(), "/login")))
}
