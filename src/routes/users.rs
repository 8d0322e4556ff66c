use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::extractors::{JsonBody, QueryParams};
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::users::{Role, User};
use crate::tutoring::matching::rank_matches;
use crate::tutoring::personalization::PersonalizationRequest;
use crate::tutoring::vector::round_to;
use crate::validation::{
    validate_display_name, validate_free_text, validate_subject_count,
};

const DEFAULT_MATCH_LIMIT: usize = 10;
const MAX_MATCH_LIMIT: usize = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me).put(upsert_me))
        .route("/me/personalise", post(personalise_me))
        .route("/me/rating", get(my_rating))
        .route("/me/matches", get(my_matches))
        .route("/:id", get(get_public_profile))
}

/// Profile as returned to its owner. Embedding vectors are summarised, not echoed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub education_level: String,
    pub education_institute: String,
    pub achievements: String,
    pub subjects_to_teach: Vec<String>,
    pub subjects_to_learn: Vec<String>,
    pub teaching_level: Vec<String>,
    pub learning_level: Vec<String>,
    pub personalised: bool,
    pub embedding_dimension: Option<usize>,
    pub review_count: u64,
    pub total_rating: f64,
    pub average_rating: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_payment_ids: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileView {
    pub fn owner(user: &User) -> Self {
        Self {
            payment_ids: Some(user.payment_ids.clone()),
            reviewed_payment_ids: Some(user.reviewed_payment_ids.clone()),
            ..Self::public(user)
        }
    }

    pub fn public(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            role: user.role,
            name: user.name.clone(),
            education_level: user.education_level.clone(),
            education_institute: user.education_institute.clone(),
            achievements: user.achievements.clone(),
            subjects_to_teach: user.subjects_to_teach.clone(),
            subjects_to_learn: user.subjects_to_learn.clone(),
            teaching_level: user.teaching_level.clone(),
            learning_level: user.learning_level.clone(),
            personalised: user.personalised,
            embedding_dimension: user.subject_embedding().map(<[f64]>::len),
            review_count: user.review_count,
            total_rating: user.total_rating,
            average_rating: round_to(user.average_rating(), 2),
            payment_ids: None,
            reviewed_payment_ids: None,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

async fn get_me(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store()
        .get_user_by_id(&auth.user_id)?
        .ok_or_else(|| AppError::not_found("Profile not found"))?;
    Ok(ok(ProfileView::owner(&user)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertProfileRequest {
    role: Option<Role>,
    name: Option<String>,
    education_level: Option<String>,
    education_institute: Option<String>,
    achievements: Option<String>,
}

impl UpsertProfileRequest {
    fn validate(&self) -> Result<(), AppError> {
        if let Some(name) = &self.name {
            validate_display_name(name)
                .map_err(|msg| AppError::bad_request("USER_INVALID_NAME", msg))?;
        }
        for text in [
            &self.education_level,
            &self.education_institute,
            &self.achievements,
        ]
        .into_iter()
        .flatten()
        {
            validate_free_text(text)
                .map_err(|msg| AppError::bad_request("VALIDATION_ERROR", msg))?;
        }
        Ok(())
    }

    fn apply(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.trim().to_string();
        }
        if let Some(v) = &self.education_level {
            user.education_level = v.trim().to_string();
        }
        if let Some(v) = &self.education_institute {
            user.education_institute = v.trim().to_string();
        }
        if let Some(v) = &self.achievements {
            user.achievements = v.trim().to_string();
        }
    }
}

/// Creates the caller's profile on first call (role and name required), then
/// updates descriptive fields. The role is fixed once set.
async fn upsert_me(
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<UpsertProfileRequest>,
) -> Result<axum::response::Response, AppError> {
    req.validate()?;

    match state.store().get_user_by_id(&auth.user_id)? {
        Some(existing) => {
            if req.role.is_some_and(|role| role != existing.role) {
                return Err(AppError::conflict(
                    "USER_ROLE_IMMUTABLE",
                    "Role cannot be changed once the profile exists",
                ));
            }
            let user = state
                .store()
                .modify_user(&auth.user_id, |user| req.apply(user))?;
            Ok(ok(ProfileView::owner(&user)).into_response())
        }
        None => {
            let role = req
                .role
                .ok_or_else(|| AppError::bad_request("VALIDATION_ERROR", "role is required"))?;
            let name = req
                .name
                .clone()
                .ok_or_else(|| AppError::bad_request("VALIDATION_ERROR", "name is required"))?;
            let mut user = User::new(&auth.user_id, role, name.trim());
            req.apply(&mut user);
            state.store().create_user(&user)?;
            tracing::info!(user_id = %user.id, role = role.as_str(), "Profile created");
            Ok(created(ProfileView::owner(&user)).into_response())
        }
    }
}

async fn get_public_profile(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store()
        .get_user_by_id(&user_id)?
        .ok_or_else(|| AppError::not_found("Profile not found"))?;
    Ok(ok(ProfileView::public(&user)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonaliseRequest {
    subjects: Vec<String>,
    #[serde(default)]
    levels: Vec<String>,
}

async fn personalise_me(
    auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<PersonaliseRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_subject_count(
        req.subjects.len(),
        state.config().limits.max_subjects_per_request,
    )
    .map_err(|msg| AppError::bad_request("VALIDATION_ERROR", msg))?;

    let user = state
        .personalizer()
        .personalise(
            &auth.user_id,
            &PersonalizationRequest {
                subjects: req.subjects,
                levels: req.levels,
            },
        )
        .await?;
    Ok(ok(ProfileView::owner(&user)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RatingView {
    review_count: u64,
    total_rating: f64,
    average_rating: f64,
    unreadable_reviews: usize,
}

/// Recomputes the caller's aggregate from their reviews without writing it.
async fn my_rating(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    if state.store().get_user_by_id(&auth.user_id)?.is_none() {
        return Err(AppError::not_found("Profile not found"));
    }
    let summary = state
        .ratings()
        .aggregate(&auth.user_id)
        .map_err(|failure| AppError::internal(&failure.to_string()))?;

    Ok(ok(RatingView {
        review_count: summary.review_count,
        total_rating: summary.total_rating,
        average_rating: round_to(summary.average(), 2),
        unreadable_reviews: summary.failures.len(),
    }))
}

#[derive(Debug, Deserialize)]
struct MatchQuery {
    limit: Option<usize>,
}

async fn my_matches(
    auth: AuthUser,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<MatchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store()
        .get_user_by_id(&auth.user_id)?
        .ok_or_else(|| AppError::not_found("Profile not found"))?;
    if !user.personalised {
        return Err(AppError::bad_request(
            "USER_NOT_PERSONALISED",
            "Personalise your profile before requesting matches",
        ));
    }
    let limit = query
        .limit
        .unwrap_or(DEFAULT_MATCH_LIMIT)
        .clamp(1, MAX_MATCH_LIMIT);
    Ok(ok(rank_matches(state.store(), &user, limit)?))
}
