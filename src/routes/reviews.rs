use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::reviews::Review;
use crate::store::StoreError;
use crate::tutoring::rating::Rating;
use crate::validation::validate_free_text;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_review))
        .route("/user/:id", get(reviews_for_user))
}

/// Ratings arrive either as JSON numbers or numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RatingInput {
    Number(f64),
    Text(String),
}

impl RatingInput {
    fn parse(&self) -> Result<Rating, AppError> {
        let parsed = match self {
            Self::Number(v) => Rating::parse(&v.to_string()),
            Self::Text(s) => Rating::parse(s),
        };
        parsed.map_err(AppError::from)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateReviewRequest {
    payment_id: String,
    ratings: RatingInput,
    #[serde(default)]
    review_text: String,
}

/// The tutee of a paid lesson reviews its tutor, once per payment. The tutor's
/// aggregate is then recomputed and fanned out to their listings.
async fn create_review(
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    let rating = req.ratings.parse()?;
    validate_free_text(&req.review_text)
        .map_err(|msg| AppError::bad_request("VALIDATION_ERROR", msg))?;

    let tutee = state
        .store()
        .get_user_by_id(&auth.user_id)?
        .ok_or_else(|| AppError::bad_request("PROFILE_REQUIRED", "Create a profile first"))?;
    let payment = state
        .store()
        .get_payment(&req.payment_id)?
        .ok_or_else(|| AppError::not_found("Payment not found"))?;

    if payment.tutee_id != tutee.id {
        return Err(AppError::forbidden("Only the tutee of this lesson can review it"));
    }
    if !payment.is_paid {
        return Err(AppError::bad_request(
            "PAYMENT_NOT_PAID",
            "Lessons can be reviewed only after payment",
        ));
    }
    if tutee.has_reviewed_payment(&payment.id) {
        return Err(AppError::conflict(
            "REVIEW_EXISTS",
            "This lesson has already been reviewed",
        ));
    }

    let review = Review {
        id: uuid::Uuid::new_v4().to_string(),
        tutee_name: tutee.name.clone(),
        tutee_id: tutee.id.clone(),
        tutor_id: payment.tutor_id.clone(),
        review_text: req.review_text.trim().to_string(),
        ratings: rating.to_string(),
        payment_id: payment.id.clone(),
        created_at: Utc::now(),
    };
    state.store().create_review(&review).map_err(|e| match e {
        StoreError::Conflict { .. } => {
            AppError::conflict("REVIEW_EXISTS", "This lesson has already been reviewed")
        }
        other => other.into(),
    })?;

    tracing::info!(
        review_id = %review.id,
        tutor_id = %review.tutor_id,
        rating = rating.value(),
        "Review created"
    );

    match state.ratings().refresh(&payment.tutor_id) {
        Ok((summary, report)) => {
            state.events().publish_updates(&report.updated, &payment.tutor_id);
            tracing::debug!(
                tutor_id = %payment.tutor_id,
                review_count = summary.review_count,
                listings = report.updated.len(),
                "Tutor aggregate refreshed"
            );
        }
        Err(e) => {
            tracing::warn!(tutor_id = %payment.tutor_id, error = %e, "Rating refresh after review failed")
        }
    }

    Ok(created(review))
}

async fn reviews_for_user(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store()
        .get_user_by_id(&user_id)?
        .ok_or_else(|| AppError::not_found("Profile not found"))?;
    let mut reviews = state.store().get_reviews(&user.review_ids)?;
    reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(ok(reviews))
}
