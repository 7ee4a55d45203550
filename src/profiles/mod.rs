mod onboarding;
mod page;

use axum::{routing::get, Router};
use serde::Deserialize;
use sqlx::{types::Json, SqlitePool};
use uuid::Uuid;

use crate::{
    db::{self, Profile, PROFILE_COLUMNS},
    realtime::{Change, ChangeKind, Hub, Table},
    AppError, AppResult, AppState,
};

pub(crate) use page::{get_profile, put_profile};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(page::profile_page))
        .route("/onboarding", get(onboarding::onboarding_page).post(onboarding::post_onboarding))
}

/// Services either as a list or as the comma separated text the form sends.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ServicesInput {
    List(Vec<String>),
    Text(String),
}

impl Default for ServicesInput {
    fn default() -> Self {
        ServicesInput::List(Vec::new())
    }
}

impl ServicesInput {
    /// Trimmed, empties dropped, duplicates removed keeping the first.
    pub fn normalize(self) -> Vec<String> {
        let raw: Vec<String> = match self {
            ServicesInput::List(list) => list,
            ServicesInput::Text(text) => text.split(',').map(str::to_owned).collect(),
        };
        let mut services: Vec<String> = Vec::new();
        for service in raw {
            let service = service.trim();
            if !service.is_empty() && !services.iter().any(|s| s == service) {
                services.push(service.to_owned());
            }
        }
        services
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileInput {
    pub username: String,
    #[serde(default)]
    pub services: ServicesInput,
}

pub async fn find_profile(db_pool: &SqlitePool, user_id: Uuid) -> sqlx::Result<Option<Profile>> {
    sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id=?"))
        .bind(user_id)
        .fetch_optional(db_pool)
        .await
}

/// Saves username and services and marks the profile onboarded.
pub async fn update_profile(db_pool: &SqlitePool, hub: &Hub, user_id: Uuid, input: ProfileInput) -> AppResult<Profile> {
    let username = input.username.trim();
    if username.is_empty() {
        return Err(AppError::bad_request("Username is required"));
    }
    let services = input.services.normalize();

    let profile: Profile = sqlx::query_as(&format!(
        "UPDATE profiles SET username=?, services=?, onboarded=TRUE, updated_at=? WHERE id=?
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(username)
    .bind(Json(&services))
    .bind(db::now())
    .bind(user_id)
    .fetch_optional(db_pool)
    .await?
    .ok_or_else(|| AppError::not_found("Profile not found"))?;

    tracing::info!(%user_id, services = services.len(), "profile updated");
    hub.publish(Change::new(Table::Profiles, ChangeKind::Update, user_id).users([user_id])).await;

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn services_from_text() {
        let services = ServicesInput::Text(" Cooking, ,Music,Cooking ".to_owned()).normalize();
        assert_eq!(services, vec!["Cooking", "Music"]);
    }

    #[test]
    fn services_from_list_or_text_json() {
        let list: ProfileInput = serde_json::from_str(r#"{"username":"a","services":["x"," y "]}"#).unwrap();
        assert_eq!(list.services.normalize(), vec!["x", "y"]);
        let text: ProfileInput = serde_json::from_str(r#"{"username":"a","services":"x, y"}"#).unwrap();
        assert_eq!(text.services.normalize(), vec!["x", "y"]);
        let none: ProfileInput = serde_json::from_str(r#"{"username":"a"}"#).unwrap();
        assert!(none.services.normalize().is_empty());
    }
}
