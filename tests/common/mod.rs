#![allow(dead_code)]

use std::collections::HashMap;

use anyhow::Result;
use sqlx::SqlitePool;
use timebank::{
    applications, auth, balances,
    db::{self, ApplicationStatus, Offer},
    offers::{self, OfferInput},
    session, Hub,
};
use tower_sessions::{
    session::{Id, Record},
    MemoryStore, SessionStore,
};
use uuid::Uuid;

pub const INITIAL_BALANCE: i64 = 30;

/// Fresh in-memory database. One connection, so every query sees the same db.
pub async fn test_pool() -> Result<SqlitePool> {
    let pool = db::create_pool("sqlite::memory:", 1).await?;
    db::run_migrations(&pool).await?;
    Ok(pool)
}

pub async fn user(pool: &SqlitePool, name: &str) -> Result<Uuid> {
    let (profile, created) = auth::find_or_create_profile(pool, &format!("subject-{name}"), None, INITIAL_BALANCE)
        .await
        .map_err(|e| e.error)?;
    assert!(created);
    Ok(profile.id)
}

pub async fn set_balance(pool: &SqlitePool, user_id: Uuid, balance: i64) -> Result<()> {
    sqlx::query("UPDATE time_balances SET balance=? WHERE user_id=?")
        .bind(balance)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn balance(pool: &SqlitePool, user_id: Uuid) -> Result<i64> {
    Ok(balances::time_balance(pool, user_id).await?)
}

pub fn offer_input(credits: i64) -> OfferInput {
    OfferInput {
        title: "Fix my bike".to_owned(),
        description: "Rear brake needs adjusting".to_owned(),
        service_type: "Consulting".to_owned(),
        duration: 1.0,
        time_credits: credits,
        ..Default::default()
    }
}

pub async fn offer(pool: &SqlitePool, hub: &Hub, owner: Uuid, credits: i64) -> Result<Offer> {
    offers::create_offer(pool, hub, owner, offer_input(credits))
        .await
        .map_err(|e| e.error)
}

/// Owner posts an offer, provider applies and gets accepted, owner completes.
pub async fn completed_offer(pool: &SqlitePool, hub: &Hub, credits: i64) -> Result<(Uuid, Uuid, Uuid)> {
    let owner = user(pool, "owner").await?;
    let provider = user(pool, "provider").await?;
    let offer = offer(pool, hub, owner, credits).await?;

    let application = applications::apply_to_offer(pool, hub, provider, offer.id)
        .await
        .map_err(|e| e.error)?;
    applications::update_application_status(pool, hub, owner, application.id, ApplicationStatus::Accepted)
        .await
        .map_err(|e| e.error)?;
    offers::complete_offer(pool, hub, owner, offer.id)
        .await
        .map_err(|e| e.error)?;

    Ok((owner, provider, offer.id))
}

/// Stores a signed-in session for `user_id` and returns its cookie header.
pub async fn login(store: &MemoryStore, user_id: Uuid) -> Result<String> {
    let record = Record {
        id: Id::default(),
        data: HashMap::from([(session::USER_ID.to_owned(), serde_json::to_value(user_id)?)]),
        expiry_date: time::OffsetDateTime::now_utc() + time::Duration::hours(1),
    };
    store.save(&record).await?;
    Ok(format!("id={}", record.id))
}
