use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::events::ListingEventKind;
use crate::extractors::{JsonBody, QueryParams};
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::listings::{Listing, ListingFilter};
use crate::store::operations::users::Role;
use crate::tutoring::matching::suggest_price;
use crate::tutoring::subjects::{canonical_set, canonicalize_subject, join_subjects, split_subjects};
use crate::validation::{validate_free_text, validate_listing_price, validate_subject_count};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(browse_listings).post(create_listing))
        .route("/mine", get(my_listings))
        .route("/price-suggestion", get(price_suggestion))
        .route("/:id", get(get_listing).delete(delete_listing))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateListingRequest {
    subjects: Vec<String>,
    price: Option<f64>,
    start_price: Option<f64>,
    end_price: Option<f64>,
    #[serde(default)]
    negotiable: bool,
    #[serde(default)]
    education: String,
    #[serde(default)]
    description: String,
}

/// Creates a listing seeded with the owner's stored aggregate, then recomputes the
/// aggregate and fans it out to all of the owner's listings. A failed recompute is
/// logged and does not fail the request.
async fn create_listing(
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateListingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let owner = state
        .store()
        .get_user_by_id(&auth.user_id)?
        .ok_or_else(|| AppError::bad_request("PROFILE_REQUIRED", "Create a profile first"))?;

    let subjects = canonical_set(&req.subjects);
    validate_subject_count(subjects.len(), state.config().limits.max_subjects_per_request)
        .map_err(|msg| AppError::bad_request("VALIDATION_ERROR", msg))?;
    validate_listing_price(req.price, req.start_price, req.end_price)
        .map_err(|msg| AppError::bad_request("LISTING_INVALID_PRICE", msg))?;
    for text in [&req.education, &req.description] {
        validate_free_text(text).map_err(|msg| AppError::bad_request("VALIDATION_ERROR", msg))?;
    }

    let now = Utc::now();
    let listing = Listing {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: owner.id.clone(),
        role: owner.role,
        name: owner.name.clone(),
        subjects: join_subjects(&subjects),
        price: req.price,
        start_price: req.start_price,
        end_price: req.end_price,
        negotiable: req.negotiable,
        education: req.education.trim().to_string(),
        description: req.description.trim().to_string(),
        review_count: owner.review_count,
        total_rating: owner.total_rating,
        created_at: now,
        updated_at: now,
    };
    state.store().create_listing(&listing)?;
    state
        .events()
        .publish(ListingEventKind::ListingCreated, &listing.id, &owner.id);
    tracing::info!(listing_id = %listing.id, user_id = %owner.id, "Listing created");

    match state.ratings().refresh(&owner.id) {
        Ok((_, report)) => {
            let others: Vec<String> = report
                .updated
                .into_iter()
                .filter(|id| id != &listing.id)
                .collect();
            state.events().publish_updates(&others, &owner.id);
        }
        Err(e) => {
            tracing::warn!(user_id = %owner.id, error = %e, "Rating refresh after listing creation failed")
        }
    }

    let stored = state.store().get_listing(&listing.id)?.unwrap_or(listing);
    Ok(created(stored))
}

#[derive(Debug, Deserialize)]
struct BrowseQuery {
    role: Option<Role>,
    subject: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn browse_listings(
    _auth: AuthUser,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<BrowseQuery>,
) -> Result<impl IntoResponse, AppError> {
    let max_page = state.config().limits.max_listings_page;
    let filter = ListingFilter {
        role: query.role,
        subject: query
            .subject
            .as_deref()
            .map(canonicalize_subject)
            .filter(|s| !s.is_empty()),
    };
    let limit = query.limit.unwrap_or(max_page).clamp(1, max_page);
    let listings = state
        .store()
        .list_listings(&filter, limit, query.offset.unwrap_or(0))?;
    Ok(ok(listings))
}

async fn my_listings(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.store().list_user_listings(&auth.user_id)?))
}

#[derive(Debug, Deserialize)]
struct PriceQuery {
    subjects: String,
    role: Option<Role>,
}

async fn price_suggestion(
    auth: AuthUser,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<PriceQuery>,
) -> Result<impl IntoResponse, AppError> {
    let subjects = split_subjects(&query.subjects);
    validate_subject_count(subjects.len(), state.config().limits.max_subjects_per_request)
        .map_err(|msg| AppError::bad_request("VALIDATION_ERROR", msg))?;

    let role = match query.role {
        Some(role) => role,
        None => state
            .store()
            .get_user_by_id(&auth.user_id)?
            .map(|u| u.role)
            .unwrap_or(Role::Tutor),
    };
    Ok(ok(suggest_price(state.store(), &subjects, role)?))
}

async fn get_listing(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(listing_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let listing = state
        .store()
        .get_listing(&listing_id)?
        .ok_or_else(|| AppError::not_found("Listing not found"))?;
    Ok(ok(listing))
}

async fn delete_listing(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(listing_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let listing = state
        .store()
        .get_listing(&listing_id)?
        .ok_or_else(|| AppError::not_found("Listing not found"))?;
    if listing.user_id != auth.user_id {
        return Err(AppError::forbidden("Only the owner can delete this listing"));
    }

    state.store().delete_listing(&listing)?;
    state
        .events()
        .publish(ListingEventKind::ListingDeleted, &listing.id, &listing.user_id);
    tracing::info!(listing_id = %listing.id, user_id = %listing.user_id, "Listing deleted");
    Ok(ok(serde_json::json!({ "deleted": listing.id })))
}
