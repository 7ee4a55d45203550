use axum::{routing::get, Router};
use rand::seq::IndexedRandom;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    balances,
    db::{self, Profile, PROFILE_COLUMNS},
    AppResult, AppState,
};

mod clients;
mod lockin;
mod login;
mod logout;

pub use clients::{ClientProvider, Clients};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login::login_page))
        .route("/login/{provider}", get(login::login))
        .route("/lockin/{provider}", get(lockin::lockin))
        .route("/logout", get(logout::logout))
}

const ADJECTIVES: [&str; 25] = [
    "Quick", "Lazy", "Mysterious", "Jolly", "Brave", "Silent", "Witty", "Fierce",
    "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Happy", "Sad",
    "Eager", "Fancy", "Rusty", "Golden", "Silver", "Bright", "Dark", "Lucky",
];

const NOUNS: [&str; 24] = [
    "Fox", "Bear", "Eagle", "Wolf", "Dragon", "Tiger", "Lion", "Owl", "Rabbit",
    "Falcon", "Hawk", "Shark", "Panda", "Kitten", "Puppy", "Phoenix", "Griffin",
    "Unicorn", "Turtle", "Dolphin", "Whale", "Elephant", "Giraffe", "Zebra",
];

pub fn random_username() -> String {
    let mut rng = rand::rng();
    format!(
        "{} {}",
        ADJECTIVES.choose(&mut rng).unwrap_or(&"Friendly"),
        NOUNS.choose(&mut rng).unwrap_or(&"Neighbour"),
    )
}

/// Profile for a signed in identity, created with a generated name and the
/// starting balance the first time it shows up. The flag says whether it is new.
pub async fn find_or_create_profile(
    db_pool: &SqlitePool,
    auth_subject: &str,
    avatar_url: Option<&str>,
    initial_balance: i64,
) -> AppResult<(Profile, bool)> {
    let mut tx = db::begin_write(db_pool).await?;
    let now = db::now();

    let created = sqlx::query(
        "INSERT INTO profiles (id,auth_subject,username,services,avatar_url,onboarded,created_at,updated_at)
         VALUES (?,?,?,'[]',?,FALSE,?,?)
         ON CONFLICT(auth_subject) DO NOTHING",
    )
    .bind(Uuid::now_v7())
    .bind(auth_subject)
    .bind(random_username())
    .bind(avatar_url)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        == 1;

    let profile: Profile = sqlx::query_as(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles WHERE auth_subject=?"
    ))
    .bind(auth_subject)
    .fetch_one(&mut *tx)
    .await?;

    if created {
        balances::open_account(&mut tx, profile.id, initial_balance).await?;
        tracing::info!(user_id = %profile.id, username = %profile.username, "profile created");
    }

    tx.commit().await?;
    Ok((profile, created))
}
