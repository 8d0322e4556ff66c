use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::payments::{lesson_cost, Payment};
use crate::store::operations::users::Role;
use crate::tutoring::subjects::canonicalize_subject;
use crate::validation::validate_hourly_rate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_payments).post(create_payment))
        .route("/reviewable", get(reviewable_payments))
        .route("/:id/complete", post(complete_payment))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentRequest {
    tutor_id: String,
    subject: String,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    cost_per_hour: f64,
}

/// A tutee books a lesson with a tutor. The payment starts unpaid.
async fn create_payment(
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreatePaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tutee = state
        .store()
        .get_user_by_id(&auth.user_id)?
        .ok_or_else(|| AppError::bad_request("PROFILE_REQUIRED", "Create a profile first"))?;
    if tutee.role != Role::Tutee {
        return Err(AppError::forbidden("Only tutees can book lessons"));
    }
    let tutor = state
        .store()
        .get_user_by_id(&req.tutor_id)?
        .filter(|u| u.role == Role::Tutor)
        .ok_or_else(|| AppError::not_found("Tutor not found"))?;

    let subject = canonicalize_subject(&req.subject);
    if subject.is_empty() {
        return Err(AppError::bad_request("VALIDATION_ERROR", "subject is required"));
    }
    validate_hourly_rate(req.cost_per_hour)
        .map_err(|msg| AppError::bad_request("VALIDATION_ERROR", msg))?;
    let total_cost = lesson_cost(req.start_time, req.end_time, req.cost_per_hour).ok_or_else(
        || AppError::bad_request("PAYMENT_INVALID_SLOT", "endTime must be after startTime"),
    )?;

    let now = Utc::now();
    let payment = Payment {
        id: uuid::Uuid::new_v4().to_string(),
        paid_to: tutor.name.clone(),
        paid_by: tutee.name.clone(),
        tutor_id: tutor.id.clone(),
        tutee_id: tutee.id.clone(),
        subject,
        date: req.date,
        start_time: req.start_time,
        end_time: req.end_time,
        cost_per_hour: req.cost_per_hour,
        total_cost,
        is_paid: false,
        created_at: now,
        updated_at: now,
    };
    state.store().create_payment(&payment)?;

    for user_id in [&tutee.id, &tutor.id] {
        state
            .store()
            .modify_user(user_id, |u| u.payment_ids.push(payment.id.clone()))?;
    }

    tracing::info!(
        payment_id = %payment.id,
        tutor_id = %payment.tutor_id,
        tutee_id = %payment.tutee_id,
        total_cost,
        "Lesson booked"
    );
    Ok(created(payment))
}

async fn list_payments(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store()
        .get_user_by_id(&auth.user_id)?
        .ok_or_else(|| AppError::not_found("Profile not found"))?;
    Ok(ok(state.store().get_payments(&user.payment_ids)?))
}

/// Paid lessons the caller took as tutee and has not reviewed yet.
async fn reviewable_payments(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store()
        .get_user_by_id(&auth.user_id)?
        .ok_or_else(|| AppError::not_found("Profile not found"))?;

    let reviewable: Vec<Payment> = state
        .store()
        .get_payments(&user.payment_ids)?
        .into_iter()
        .filter(|p| p.is_paid && p.tutee_id == user.id && !user.has_reviewed_payment(&p.id))
        .collect();
    Ok(ok(reviewable))
}

/// Marks a lesson as paid once checkout succeeds. Repeated calls are no-ops.
async fn complete_payment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let payment = state
        .store()
        .get_payment(&payment_id)?
        .ok_or_else(|| AppError::not_found("Payment not found"))?;
    if payment.tutee_id != auth.user_id {
        return Err(AppError::forbidden("Only the paying tutee can complete this payment"));
    }
    if payment.is_paid {
        return Ok(ok(payment));
    }

    let payment = state.store().mark_payment_paid(&payment_id)?;
    tracing::info!(payment_id = %payment.id, "Payment completed");
    Ok(ok(payment))
}
