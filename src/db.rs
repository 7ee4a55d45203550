use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, types::Json, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Starts a transaction that holds the write lock from its first statement,
/// so a later write can't fail with SQLITE_BUSY after the reads.
pub async fn begin_write(pool: &SqlitePool) -> sqlx::Result<sqlx::Transaction<'static, sqlx::Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum OfferStatus {
    Available,
    Pending,
    Accepted,
    Booked,
    Completed,
    Cancelled,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        use OfferStatus::*;
        match self {
            Available => "available",
            Pending => "pending",
            Accepted => "accepted",
            Booked => "booked",
            Completed => "completed",
            Cancelled => "cancelled",
        }
    }

    /// Someone was accepted and the work is underway.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, OfferStatus::Booked | OfferStatus::Accepted)
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        use ApplicationStatus::*;
        match self {
            Pending => "pending",
            Accepted => "accepted",
            Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ApplicationStatus::*;
        match s {
            "pending" => Ok(Pending),
            "accepted" => Ok(Accepted),
            "rejected" => Ok(Rejected),
            _ => Err(format!("unknown application status {s:?}")),
        }
    }
}

// unique: id
// unique: auth_subject
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    #[serde(skip)]
    pub auth_subject: String,
    pub username: String,
    pub services: Json<Vec<String>>,
    pub avatar_url: Option<String>,
    pub onboarded: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

pub const PROFILE_COLUMNS: &str =
    "id, auth_subject, username, services, avatar_url, onboarded, created_at, updated_at";

// unique: id
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Offer {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub title: String,
    pub description: String,
    pub service_type: String,
    pub hours: f64,
    pub duration: f64,
    pub time_credits: i64,
    pub date: Option<String>,
    pub status: OfferStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

pub const OFFER_COLUMNS: &str = "id, profile_id, title, description, service_type, hours, duration, time_credits, date, status, created_at, updated_at";

// unique: id
// unique: offer_id, applicant_id
// unique: offer_id where status = accepted
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OfferApplication {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub applicant_id: Uuid,
    pub status: ApplicationStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

pub const APPLICATION_COLUMNS: &str =
    "id, offer_id, applicant_id, status, created_at, updated_at";

// unique: id
// unique: offer_id
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub offer_id: Uuid,
    /// Pays: the offer owner.
    pub user_id: Uuid,
    /// Gets paid: the accepted applicant.
    pub provider_id: Uuid,
    pub hours: i64,
    pub service: String,
    pub claimed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub claimed_at: Option<OffsetDateTime>,
}

pub const TRANSACTION_COLUMNS: &str =
    "id, offer_id, user_id, provider_id, hours, service, claimed, created_at, claimed_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UserStats {
    pub user_id: Uuid,
    pub time_balance: i64,
    pub active_offers: i64,
    pub hours_exchanged: i64,
}

/// `a, b` -> `o.a, o.b` for joins.
pub fn columns(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub async fn get_offer<'e, E>(executor: E, offer_id: Uuid) -> sqlx::Result<Option<Offer>>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query_as(&format!("SELECT {OFFER_COLUMNS} FROM offers WHERE id=?"))
        .bind(offer_id)
        .fetch_optional(executor)
        .await
}

/// Owner plus everyone who applied: the people a change to the offer concerns.
pub async fn offer_audience<'e, E>(executor: E, offer_id: Uuid) -> sqlx::Result<Vec<Uuid>>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT profile_id FROM offers WHERE id=?
         UNION
         SELECT applicant_id FROM offer_applications WHERE offer_id=?",
    )
    .bind(offer_id)
    .bind(offer_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
