use axum::{
    debug_handler,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    balances,
    db::{self, Offer, OFFER_COLUMNS},
    include_res,
    realtime::{Change, ChangeKind, Hub, Table},
    res::{escape, to_login},
    session::{self, CurrentUser},
    AppError, AppResult, ResultExt,
};

pub const MAX_TIME_CREDITS: i64 = 5;

pub const SERVICE_CATEGORIES: [&str; 12] = [
    "Programming", "Teaching", "Gardening", "Design", "Writing", "Marketing",
    "Translation", "Consulting", "Photography", "Music", "Cooking", "Fitness",
];

/// Offer form / JSON body. Accepts the camelCase names the old client sent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfferInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "serviceType")]
    pub service_type: String,
    /// Free text used when `service_type` is "Others".
    #[serde(default, alias = "otherServiceType")]
    pub other_service_type: Option<String>,
    #[serde(default)]
    pub duration: f64,
    #[serde(default = "one_credit", alias = "timeCredits")]
    pub time_credits: i64,
    #[serde(default)]
    pub date: Option<String>,
}

fn one_credit() -> i64 {
    1
}

/// Checked offer fields, ready to store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOffer {
    pub title: String,
    pub description: String,
    pub service_type: String,
    pub duration: f64,
    pub time_credits: i64,
    pub date: Option<String>,
}

impl OfferInput {
    pub fn validate(self) -> AppResult<NewOffer> {
        let service_type = match self.service_type.trim() {
            "Others" => self.other_service_type.as_deref().unwrap_or("").trim().to_owned(),
            other => other.to_owned(),
        };
        if service_type.is_empty() {
            return Err(AppError::bad_request("Service type is required"));
        }

        let description = self.description.trim().to_owned();
        if description.is_empty() {
            return Err(AppError::bad_request("Description is required"));
        }

        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(AppError::bad_request("Duration must be a positive number of hours"));
        }

        if !(1..=MAX_TIME_CREDITS).contains(&self.time_credits) {
            return Err(AppError::bad_request(format!(
                "Time credits must be between 1 and {MAX_TIME_CREDITS}"
            )));
        }

        let date = match self.date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(check_date(raw)?),
        };

        // the service type doubles as the title when none is given
        let title = match self.title.trim() {
            "" => service_type.clone(),
            title => title.to_owned(),
        };

        Ok(NewOffer {
            title,
            description,
            service_type,
            duration: self.duration,
            time_credits: self.time_credits,
            date,
        })
    }
}

fn check_date(raw: &str) -> AppResult<String> {
    let day = format_description!("[year]-[month]-[day]");
    if Date::parse(raw, &day).is_ok() || OffsetDateTime::parse(raw, &Rfc3339).is_ok() {
        Ok(raw.to_owned())
    } else {
        Err(AppError::bad_request(format!("Invalid date {raw:?}")))
    }
}

/// Debits the offer's credits and inserts it as `available`, atomically.
pub async fn create_offer(
    db_pool: &SqlitePool,
    hub: &Hub,
    user_id: Uuid,
    input: OfferInput,
) -> AppResult<Offer> {
    let new = input.validate()?;
    let now = db::now();

    let mut tx = db::begin_write(db_pool).await?;
    balances::debit(&mut tx, user_id, new.time_credits).await?;

    let offer: Offer = sqlx::query_as(&format!(
        "INSERT INTO offers (id,profile_id,title,description,service_type,hours,duration,time_credits,date,status,created_at,updated_at)
         VALUES (?,?,?,?,?,?,?,?,?,'available',?,?)
         RETURNING {OFFER_COLUMNS}"
    ))
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(&new.title)
    .bind(&new.description)
    .bind(&new.service_type)
    .bind(new.duration)
    .bind(new.duration)
    .bind(new.time_credits)
    .bind(&new.date)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(offer_id = %offer.id, %user_id, credits = offer.time_credits, "offer created");
    hub.publish_all([
        Change::new(Table::Offers, ChangeKind::Insert, offer.id)
            .offer(offer.id)
            .users([user_id]),
        Change::balance(user_id),
    ])
    .await;

    Ok(offer)
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn post_offer(
    CurrentUser(user_id): CurrentUser,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    Json(input): Json<OfferInput>,
) -> AppResult<(StatusCode, Json<Offer>)> {
    let offer = create_offer(&db_pool, &hub, user_id, input)
        .await
        .context("Failed to create offer")?;
    Ok((StatusCode::CREATED, Json(offer)))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_offer_page(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let Some(user_id) = session::user_id(&session).await? else {
        return Ok(to_login("/offer"));
    };

    let balance = balances::time_balance(&db_pool, user_id).await?;

    let mut categories = String::new();
    for category in SERVICE_CATEGORIES.iter().chain(["Others"].iter()) {
        categories += &format!("<option value=\"{0}\">{0}</option>", escape(category));
    }

    Ok(Html(
        include_res!(str, "/pages/new_offer.html")
            .replace("{balance}", &balance.to_string())
            .replace("{max_credits}", &MAX_TIME_CREDITS.to_string())
            .replace("{categories}", &categories)
    ).into_response())
}
