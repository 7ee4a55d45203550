pub mod applications;
pub mod appresult;
pub mod auth;
pub mod balances;
pub mod button;
pub mod cache;
pub mod claims;
pub mod config;
pub mod db;
pub mod home;
pub mod offers;
pub mod profiles;
pub mod realtime;
pub mod res;
pub mod session;

use std::sync::Arc;

use axum::{extract::FromRef, routing::get, Router};
use serde_json::Value;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppResult, ResultExt};
pub use config::Config;
pub use realtime::Hub;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub clients: auth::Clients,
    pub hub: Hub,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, clients: auth::Clients, config: Config) -> Self {
        Self {
            db_pool,
            clients,
            hub: Hub::new(),
            config: Arc::new(config),
        }
    }
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or_else(|| anyhow::anyhow!("expected {field} in {self}"))?
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        Ok(
            self.get(field)
            .ok_or_else(|| anyhow::anyhow!("expected {field} in {self}"))?
        )
    }
}

/// Markdown source rendered for display. Raw HTML in the source is shown as
/// text, never passed through.
pub struct Markdown<T>(pub T);

impl<T> Markdown<T>
where
    T: AsRef<str>,
{
    pub fn to_html(&self) -> String {
        use pulldown_cmark::{Event, Options, Parser};

        let parser = Parser::new_ext(self.0.as_ref(), Options::ENABLE_STRIKETHROUGH)
            .map(|event| match event {
                Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
                _ => event,
            });

        let mut html_output = String::new();
        pulldown_cmark::html::push_html(&mut html_output, parser);
        html_output
    }
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/balance", get(balances::get_balance))
        .route("/stats", get(home::get_stats))
        .route("/pending", get(home::get_pending))
        .route("/completed", get(home::get_completed))
        .route("/profile", get(profiles::get_profile).put(profiles::put_profile))
        .route("/realtime", get(realtime::realtime_ws))
        .merge(offers::api_router())
        .merge(applications::api_router())
}

pub fn app(state: AppState) -> Router {
    app_with_sessions(state, MemoryStore::default())
}

/// Same as [`app`] over a session store the caller keeps a handle to.
pub fn app_with_sessions(state: AppState, store: MemoryStore) -> Router {
    let session_layer = SessionManagerLayer::new(store)
        .with_secure(state.config.public_url.starts_with("https://"))
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            state.config.session_inactivity_minutes,
        )));

    Router::new()
        .route("/app.js", get(res::app_js))
        .route("/style.css", get(res::style_css))
        .merge(home::router())
        .merge(offers::router())
        .merge(profiles::router())
        .merge(auth::router())
        .nest("/api", api_router())
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
}
