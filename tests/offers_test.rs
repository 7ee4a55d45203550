mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::*;
use timebank::{
    db::{self, OfferStatus},
    offers, Hub,
};

#[tokio::test]
async fn create_debits_the_owner() -> Result<()> {
    let pool = test_pool().await?;
    let hub = Hub::new();
    let alice = user(&pool, "alice").await?;

    let offer = offer(&pool, &hub, alice, 3).await?;

    assert_eq!(offer.status, OfferStatus::Available);
    assert_eq!(offer.time_credits, 3);
    assert_eq!(balance(&pool, alice).await?, INITIAL_BALANCE - 3);
    Ok(())
}

#[tokio::test]
async fn insufficient_credits_writes_nothing() -> Result<()> {
    let pool = test_pool().await?;
    let hub = Hub::new();
    let alice = user(&pool, "alice").await?;
    set_balance(&pool, alice, 2).await?;

    let err = offers::create_offer(&pool, &hub, alice, offer_input(3)).await.unwrap_err();

    assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(err.message().contains("Available: 2, Required: 3"), "{}", err.message());
    assert!(offers::user_offers(&pool, alice).await?.is_empty());
    assert_eq!(balance(&pool, alice).await?, 2);
    Ok(())
}

#[tokio::test]
async fn owner_delete_refunds() -> Result<()> {
    let pool = test_pool().await?;
    let hub = Hub::new();
    let alice = user(&pool, "alice").await?;
    let offer = offer(&pool, &hub, alice, 4).await?;

    offers::delete_offer(&pool, &hub, alice, offer.id).await.map_err(|e| e.error)?;

    assert!(db::get_offer(&pool, offer.id).await?.is_none());
    assert_eq!(balance(&pool, alice).await?, INITIAL_BALANCE);
    Ok(())
}

#[tokio::test]
async fn non_owner_delete_keeps_the_offer() -> Result<()> {
    let pool = test_pool().await?;
    let hub = Hub::new();
    let alice = user(&pool, "alice").await?;
    let mallory = user(&pool, "mallory").await?;
    let offer = offer(&pool, &hub, alice, 2).await?;

    let err = offers::delete_offer(&pool, &hub, mallory, offer.id).await.unwrap_err();

    assert_eq!(err.status, StatusCode::NOT_FOUND);
    assert!(db::get_offer(&pool, offer.id).await?.is_some());
    assert_eq!(balance(&pool, alice).await?, INITIAL_BALANCE - 2);
    assert_eq!(balance(&pool, mallory).await?, INITIAL_BALANCE);
    Ok(())
}

#[tokio::test]
async fn completed_offers_cannot_be_deleted() -> Result<()> {
    let pool = test_pool().await?;
    let hub = Hub::new();
    let (owner, _, offer_id) = completed_offer(&pool, &hub, 2).await?;

    let err = offers::delete_offer(&pool, &hub, owner, offer_id).await.unwrap_err();

    assert_eq!(err.status, StatusCode::CONFLICT);
    assert!(db::get_offer(&pool, offer_id).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn editing_credits_adjusts_the_balance() -> Result<()> {
    let pool = test_pool().await?;
    let hub = Hub::new();
    let alice = user(&pool, "alice").await?;
    let offer = offer(&pool, &hub, alice, 2).await?;

    let updated = offers::update_offer(&pool, &hub, alice, offer.id, offer_input(5))
        .await
        .map_err(|e| e.error)?;
    assert_eq!(updated.time_credits, 5);
    assert_eq!(balance(&pool, alice).await?, INITIAL_BALANCE - 5);

    offers::update_offer(&pool, &hub, alice, offer.id, offer_input(1))
        .await
        .map_err(|e| e.error)?;
    assert_eq!(balance(&pool, alice).await?, INITIAL_BALANCE - 1);
    Ok(())
}

#[tokio::test]
async fn edit_beyond_balance_is_rejected() -> Result<()> {
    let pool = test_pool().await?;
    let hub = Hub::new();
    let alice = user(&pool, "alice").await?;
    let offer = offer(&pool, &hub, alice, 1).await?;
    set_balance(&pool, alice, 1).await?;

    let err = offers::update_offer(&pool, &hub, alice, offer.id, offer_input(3)).await.unwrap_err();

    assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(db::get_offer(&pool, offer.id).await?.unwrap().time_credits, 1);
    assert_eq!(balance(&pool, alice).await?, 1);
    Ok(())
}

#[tokio::test]
async fn listing_hides_nothing_open_and_names_the_owner() -> Result<()> {
    let pool = test_pool().await?;
    let hub = Hub::new();
    let alice = user(&pool, "alice").await?;
    let first = offer(&pool, &hub, alice, 1).await?;
    let second = offer(&pool, &hub, alice, 1).await?;

    let listed = offers::list_offers(&pool).await?;

    assert_eq!(listed.len(), 2);
    // newest first
    assert_eq!(listed[0].offer.id, second.id);
    assert_eq!(listed[1].offer.id, first.id);
    assert!(listed[0].owner_username.is_some());
    Ok(())
}

#[tokio::test]
async fn only_available_offers_can_be_edited() -> Result<()> {
    let pool = test_pool().await?;
    let hub = Hub::new();
    let (owner, _, offer_id) = completed_offer(&pool, &hub, 2).await?;
    let before = balance(&pool, owner).await?;

    let err = offers::update_offer(&pool, &hub, owner, offer_id, offer_input(4)).await.unwrap_err();

    assert_eq!(err.status, StatusCode::CONFLICT);
    assert_eq!(db::get_offer(&pool, offer_id).await?.unwrap().time_credits, 2);
    assert_eq!(balance(&pool, owner).await?, before);
    Ok(())
}

#[tokio::test]
async fn completing_needs_the_owner_and_a_booked_offer() -> Result<()> {
    let pool = test_pool().await?;
    let hub = Hub::new();
    let alice = user(&pool, "alice").await?;
    let bob = user(&pool, "bob").await?;
    let offer = offer(&pool, &hub, alice, 2).await?;

    // someone else's offer looks missing
    let err = offers::complete_offer(&pool, &hub, bob, offer.id).await.unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);

    // nobody accepted yet
    let err = offers::complete_offer(&pool, &hub, alice, offer.id).await.unwrap_err();
    assert_eq!(err.status, StatusCode::CONFLICT);
    assert_eq!(db::get_offer(&pool, offer.id).await?.unwrap().status, OfferStatus::Available);
    Ok(())
}

#[tokio::test]
async fn completing_a_booked_offer_without_an_accepted_applicant() -> Result<()> {
    let pool = test_pool().await?;
    let hub = Hub::new();
    let alice = user(&pool, "alice").await?;
    let offer = offer(&pool, &hub, alice, 2).await?;
    sqlx::query("UPDATE offers SET status='booked' WHERE id=?")
        .bind(offer.id)
        .execute(&pool)
        .await?;

    let err = offers::complete_offer(&pool, &hub, alice, offer.id).await.unwrap_err();

    assert_eq!(err.status, StatusCode::CONFLICT);
    assert!(err.message().contains("no accepted application"), "{}", err.message());
    assert_eq!(db::get_offer(&pool, offer.id).await?.unwrap().status, OfferStatus::Booked);
    Ok(())
}

#[tokio::test]
async fn concurrent_creates_all_succeed() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("offers.db").display());
    let pool = db::create_pool(&url, 8).await?;
    db::run_migrations(&pool).await?;
    let hub = Hub::new();

    let mut users = Vec::new();
    for i in 0..8 {
        users.push(user(&pool, &format!("user{i}")).await?);
    }

    let mut tasks = Vec::new();
    for &owner in &users {
        for _ in 0..4 {
            let pool = pool.clone();
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move {
                offers::create_offer(&pool, &hub, owner, offer_input(1)).await
            }));
        }
    }

    for task in tasks {
        task.await?.map_err(|e| e.error)?;
    }

    for &owner in &users {
        assert_eq!(balance(&pool, owner).await?, INITIAL_BALANCE - 4);
        assert_eq!(offers::user_offers(&pool, owner).await?.len(), 4);
    }
    Ok(())
}
