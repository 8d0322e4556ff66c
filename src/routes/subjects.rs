use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::operations::subjects::SubjectRow;
use crate::tutoring::subjects::{canonical_set, EnsureOutcome};
use crate::validation::validate_subject_count;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_subjects))
        .route("/embed", post(embed_subjects))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubjectView {
    name: String,
    dimension: usize,
    tutor_count: u64,
    tutee_count: u64,
}

impl From<SubjectRow> for SubjectView {
    fn from(row: SubjectRow) -> Self {
        Self {
            dimension: row.embedding.len(),
            name: row.name,
            tutor_count: row.tutor_count,
            tutee_count: row.tutee_count,
        }
    }
}

/// Subject catalogue, most used first.
async fn list_subjects(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let rows = state.subjects().list_subjects()?;
    Ok(ok(rows.into_iter().map(SubjectView::from).collect::<Vec<_>>()))
}

#[derive(Debug, Deserialize)]
struct EmbedRequest {
    subjects: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedResult {
    subject: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Ensures an embedding exists for each subject and reports a status per subject.
async fn embed_subjects(
    _auth: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<EmbedRequest>,
) -> Result<impl IntoResponse, AppError> {
    let subjects = canonical_set(&req.subjects);
    validate_subject_count(subjects.len(), state.config().limits.max_subjects_per_request)
        .map_err(|msg| AppError::bad_request("VALIDATION_ERROR", msg))?;

    let registry = state.subjects();
    let outcomes = join_all(subjects.iter().map(|s| registry.ensure_embedded(s))).await;

    let results: Vec<EmbedResult> = subjects
        .into_iter()
        .zip(outcomes)
        .map(|(subject, outcome)| match outcome {
            Ok(EnsureOutcome::Created) => EmbedResult {
                subject,
                status: "created",
                error: None,
            },
            Ok(EnsureOutcome::AlreadyPresent) => EmbedResult {
                subject,
                status: "existing",
                error: None,
            },
            Err(e) => {
                tracing::warn!(subject = %subject, error = %e, "Subject embedding failed");
                EmbedResult {
                    subject,
                    status: "failed",
                    error: Some(e.to_string()),
                }
            }
        })
        .collect();
    Ok(ok(results))
}
