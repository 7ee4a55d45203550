use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    appresult::is_unique_violation,
    db::{self, columns, ApplicationStatus, OfferApplication, APPLICATION_COLUMNS},
    realtime::{Change, ChangeKind, Hub, Table},
    session::CurrentUser,
    AppError, AppResult, ResultExt,
};

/// Request body of `PUT /api/applications/{id}`. The status is parsed by hand
/// so an unknown value gets the usual JSON error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationDecision {
    #[serde(default)]
    pub status: String,
}

impl ApplicationDecision {
    pub fn status(&self) -> AppResult<ApplicationStatus> {
        self.status
            .trim()
            .parse()
            .map_err(AppError::bad_request)
    }
}

#[derive(sqlx::FromRow)]
struct DecisionTarget {
    #[sqlx(flatten)]
    application: OfferApplication,
    owner_id: Uuid,
}

/// Owner accepts or rejects a pending application. Accepting books the offer
/// in the same database transaction; if that fails nothing is kept.
pub async fn update_application_status(
    db_pool: &SqlitePool,
    hub: &Hub,
    user_id: Uuid,
    application_id: Uuid,
    status: ApplicationStatus,
) -> AppResult<OfferApplication> {
    if status == ApplicationStatus::Pending {
        return Err(AppError::bad_request("Status must be accepted or rejected"));
    }

    let mut tx = db::begin_write(db_pool).await?;

    let target: Option<DecisionTarget> = sqlx::query_as(&format!(
        "SELECT {}, o.profile_id AS owner_id
         FROM offer_applications a JOIN offers o ON o.id = a.offer_id
         WHERE a.id=?",
        columns(APPLICATION_COLUMNS, "a")
    ))
    .bind(application_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(DecisionTarget { application, owner_id }) = target else {
        return Err(AppError::not_found("Application not found"));
    };
    if owner_id != user_id {
        return Err(AppError::forbidden("Only the offer owner can decide on applications"));
    }
    if application.status != ApplicationStatus::Pending {
        return Err(AppError::conflict(format!("Application is already {}", application.status)));
    }

    let now = db::now();
    let updated: Option<OfferApplication> = sqlx::query_as(&format!(
        "UPDATE offer_applications SET status=?, updated_at=? WHERE id=? AND status='pending'
         RETURNING {APPLICATION_COLUMNS}"
    ))
    .bind(status)
    .bind(now)
    .bind(application_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| match is_unique_violation(&e) {
        true => AppError::conflict("Offer already has an accepted application"),
        false => e.into(),
    })?;

    let Some(updated) = updated else {
        return Err(AppError::conflict("Application was decided meanwhile"));
    };

    let offer_id = updated.offer_id;
    if status == ApplicationStatus::Accepted {
        book_offer(&mut tx, offer_id, now)
            .await
            .context("Failed to update offer status")?;
    }

    let audience = match status {
        ApplicationStatus::Accepted => db::offer_audience(&mut *tx, offer_id).await?,
        _ => Vec::new(),
    };
    tx.commit().await?;

    tracing::info!(%application_id, %offer_id, %status, "application decided");
    hub.publish(
        Change::new(Table::OfferApplications, ChangeKind::Update, application_id)
            .offer(offer_id)
            .users([updated.applicant_id, owner_id]),
    )
    .await;
    if status == ApplicationStatus::Accepted {
        hub.publish(
            Change::new(Table::Offers, ChangeKind::Update, offer_id)
                .offer(offer_id)
                .users(audience),
        )
        .await;
    }

    Ok(updated)
}

async fn book_offer(conn: &mut sqlx::SqliteConnection, offer_id: Uuid, now: time::OffsetDateTime) -> AppResult<()> {
    let booked = sqlx::query("UPDATE offers SET status='booked', updated_at=? WHERE id=? AND status='available'")
        .bind(now)
        .bind(offer_id)
        .execute(conn)
        .await?
        .rows_affected();

    if booked != 1 {
        return Err(AppError::conflict("Offer is no longer available"));
    }
    Ok(())
}

#[tracing::instrument(skip(db_pool, hub))]
pub(crate) async fn put_status(
    CurrentUser(user_id): CurrentUser,
    Path(application_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    Json(decision): Json<ApplicationDecision>,
) -> AppResult<Json<OfferApplication>> {
    let application = update_application_status(&db_pool, &hub, user_id, application_id, decision.status()?)
        .await
        .context("Failed to update application status")?;
    Ok(Json(application))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;

    fn decision(body: &str) -> ApplicationDecision {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn known_statuses_parse() {
        assert_eq!(decision(r#"{"status":"accepted"}"#).status().unwrap(), ApplicationStatus::Accepted);
        assert_eq!(decision(r#"{"status":" rejected "}"#).status().unwrap(), ApplicationStatus::Rejected);
    }

    #[test]
    fn unknown_status_is_a_bad_request() {
        let err = decision(r#"{"status":"booked"}"#).status().unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message().contains("booked"));

        let missing = decision("{}").status().unwrap_err();
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    }
}
