mod common;

use std::time::Duration;

use anyhow::Result;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use common::*;
use futures_util::StreamExt;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use timebank::{auth::Clients, home, offers, realtime::Change, AppState, Config, Hub};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

async fn get_json(app: &Router, uri: &str, cookie: &str) -> Result<(StatusCode, Value)> {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header::COOKIE, cookie)
                .body(Body::empty())?,
        )
        .await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    Ok((status, serde_json::from_slice(&body)?))
}

#[tokio::test]
async fn api_requires_a_session() -> Result<()> {
    let pool = test_pool().await?;
    let app = timebank::app(AppState::new(pool, Clients::empty(), Config::default()));

    for (method, uri) in [("GET", "/api/balance"), ("POST", "/api/offers/0190f3c6-0000-7000-8000-000000000000/apply")] {
        let response = app
            .clone()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = response.into_body().collect().await?.to_bytes();
        let json: Value = serde_json::from_slice(&body)?;
        assert_eq!(json["error"], "User not authenticated");
    }
    Ok(())
}

#[tokio::test]
async fn home_redirects_to_login() -> Result<()> {
    let pool = test_pool().await?;
    let app = timebank::app(AppState::new(pool, Clients::empty(), Config::default()));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty())?)
        .await?;

    assert!(response.status().is_redirection());
    assert_eq!(response.headers()[header::LOCATION], "/login");
    Ok(())
}

#[tokio::test]
async fn login_page_without_providers() -> Result<()> {
    let pool = test_pool().await?;
    let app = timebank::app(AppState::new(pool, Clients::empty(), Config::default()));

    let response = app
        .oneshot(Request::builder().uri("/login").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await?.to_bytes();
    assert!(String::from_utf8_lossy(&body).contains("No login providers are configured"));
    Ok(())
}

#[tokio::test]
async fn pending_splits_own_and_applied() -> Result<()> {
    let pool = test_pool().await?;
    let hub = Hub::new();
    let alice = user(&pool, "alice").await?;
    let bob = user(&pool, "bob").await?;
    let alices = offer(&pool, &hub, alice, 1).await?;
    let bobs = offer(&pool, &hub, bob, 1).await?;
    timebank::applications::apply_to_offer(&pool, &hub, alice, bobs.id)
        .await
        .map_err(|e| e.error)?;

    let pending = home::pending_offers(&pool, alice).await?;

    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].offer.id, alices.id);
    assert!(!pending[0].is_applied);
    assert_eq!(pending[0].application_status, None);
    assert_eq!(pending[1].offer.id, bobs.id);
    assert!(pending[1].is_applied);
    assert_eq!(pending[1].application_status, Some(timebank::db::ApplicationStatus::Pending));
    Ok(())
}

#[tokio::test]
async fn stats_fall_back_for_unknown_users() -> Result<()> {
    let pool = test_pool().await?;
    let nobody = uuid::Uuid::now_v7();

    let stats = home::quick_stats(&pool, nobody, INITIAL_BALANCE).await?;

    assert_eq!(stats.time_balance, INITIAL_BALANCE);
    assert_eq!(stats.active_offers, 0);
    assert_eq!(stats.hours_exchanged, 0);
    Ok(())
}

#[tokio::test]
async fn cached_views_refresh_after_a_write() -> Result<()> {
    let pool = test_pool().await?;
    let state = AppState::new(pool.clone(), Clients::empty(), Config::default());
    let hub = state.hub.clone();
    let store = MemoryStore::default();
    let app = timebank::app_with_sessions(state, store.clone());
    let alice = user(&pool, "alice").await?;
    let cookie = login(&store, alice).await?;

    let (status, before) = get_json(&app, "/api/balance", &cookie).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(before, json!({ "balance": INITIAL_BALANCE }));
    let (_, listed) = get_json(&app, "/api/offers", &cookie).await?;
    assert_eq!(listed, json!([]));

    let created = offer(&pool, &hub, alice, 3).await?;

    let (_, after) = get_json(&app, "/api/balance", &cookie).await?;
    assert_eq!(after, json!({ "balance": INITIAL_BALANCE - 3 }));
    let (_, listed) = get_json(&app, "/api/offers", &cookie).await?;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["id"], json!(created.id));

    offers::delete_offer(&pool, &hub, alice, created.id).await.map_err(|e| e.error)?;

    let (_, refunded) = get_json(&app, "/api/balance", &cookie).await?;
    assert_eq!(refunded, json!({ "balance": INITIAL_BALANCE }));
    let (status, _) = get_json(&app, &format!("/api/offers/{}", created.id), &cookie).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn decision_with_unknown_status_is_a_json_error() -> Result<()> {
    let pool = test_pool().await?;
    let store = MemoryStore::default();
    let app = timebank::app_with_sessions(
        AppState::new(pool.clone(), Clients::empty(), Config::default()),
        store.clone(),
    );
    let alice = user(&pool, "alice").await?;
    let cookie = login(&store, alice).await?;

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/applications/{}", uuid::Uuid::now_v7()))
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"status":"booked"}"#))?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.into_body().collect().await?.to_bytes();
    let json: Value = serde_json::from_slice(&body)?;
    assert!(json["error"].as_str().is_some_and(|e| e.contains("booked")), "{json}");
    Ok(())
}

async fn next_change<S>(socket: &mut S) -> Result<Option<Change>>
where
    S: futures_util::Stream<Item = Result<tokio_tungstenite::tungstenite::Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match tokio::time::timeout(Duration::from_millis(500), socket.next()).await {
            Err(_) | Ok(None) => return Ok(None),
            Ok(Some(msg)) => {
                let msg = msg?;
                if msg.is_text() {
                    return Ok(Some(serde_json::from_str(msg.to_text()?)?));
                }
            }
        }
    }
}

#[tokio::test]
async fn realtime_subscribers_get_only_matching_changes() -> Result<()> {
    let pool = test_pool().await?;
    let state = AppState::new(pool.clone(), Clients::empty(), Config::default());
    let hub = state.hub.clone();
    let store = MemoryStore::default();
    let app = timebank::app_with_sessions(state, store.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, app).await });

    let alice = user(&pool, "alice").await?;
    let bob = user(&pool, "bob").await?;
    let bobs = offer(&pool, &hub, bob, 1).await?;

    let connect = |query: String, cookie: String| async move {
        let mut request = format!("ws://{addr}/api/realtime?{query}").into_client_request()?;
        request.headers_mut().insert(header::COOKIE, cookie.parse()?);
        let (socket, _) = tokio_tungstenite::connect_async(request).await?;
        anyhow::Ok(socket)
    };
    let mut alice_feed = connect("tables=time_balances&mine=true".to_owned(), login(&store, alice).await?).await?;
    let mut bob_feed = connect(format!("tables=offers&offer_id={}", bobs.id), login(&store, bob).await?).await?;

    // the socket subscribes once the upgrade completes
    for _ in 0..50 {
        if hub.subscriber_count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(hub.subscriber_count(), 2);

    offer(&pool, &hub, alice, 2).await?;
    offers::update_offer(&pool, &hub, bob, bobs.id, offer_input(1))
        .await
        .map_err(|e| e.error)?;

    let seen = next_change(&mut alice_feed).await?.expect("alice's balance change");
    assert_eq!(seen, Change::balance(alice));
    // bob's edit touches neither her balance nor her
    assert_eq!(next_change(&mut alice_feed).await?, None);

    let seen = next_change(&mut bob_feed).await?.expect("bob's offer change");
    assert_eq!(seen.id, bobs.id);
    assert_eq!(seen.offer_id, Some(bobs.id));
    // alice's new offer and her balance are filtered out
    assert_eq!(next_change(&mut bob_feed).await?, None);
    Ok(())
}
