//! Subject-based matching between tutors and tutees, and listing price suggestions.

use std::cmp::Ordering;

use serde::Serialize;

use crate::store::operations::listings::{Listing, ListingFilter};
use crate::store::operations::users::{Role, User};
use crate::store::{Store, StoreError};
use crate::tutoring::vector::{cosine_similarity, round_to};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    pub user_id: String,
    pub name: String,
    pub role: Role,
    pub subjects: Vec<String>,
    pub similarity: f64,
    pub review_count: u64,
    pub average_rating: f64,
}

fn counterpart(role: Role) -> Role {
    match role {
        Role::Tutor => Role::Tutee,
        Role::Tutee => Role::Tutor,
    }
}

/// Personalised users of the opposite role, most similar subject embedding first.
/// Returns an empty list when `user` has not been personalised.
pub fn rank_matches(
    store: &Store,
    user: &User,
    limit: usize,
) -> Result<Vec<MatchCandidate>, StoreError> {
    let Some(own) = user.subject_embedding() else {
        return Ok(Vec::new());
    };

    let mut candidates: Vec<MatchCandidate> = store
        .list_personalised_users(counterpart(user.role))?
        .into_iter()
        .filter(|other| other.id != user.id)
        .filter_map(|other| {
            let similarity = cosine_similarity(own, other.subject_embedding()?)?;
            let subjects = match other.role {
                Role::Tutor => other.subjects_to_teach.clone(),
                Role::Tutee => other.subjects_to_learn.clone(),
            };
            Some(MatchCandidate {
                average_rating: round_to(other.average_rating(), 2),
                user_id: other.id,
                name: other.name,
                role: other.role,
                subjects,
                similarity: round_to(similarity, 6),
                review_count: other.review_count,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.review_count.cmp(&a.review_count))
    });
    candidates.truncate(limit);
    Ok(candidates)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSuggestion {
    pub sample_size: usize,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub mean: f64,
}

/// Summarise the prices of existing `role` listings that share at least one of
/// `subjects`. `None` when no comparable listing has a price.
pub fn suggest_price(
    store: &Store,
    subjects: &[String],
    role: Role,
) -> Result<Option<PriceSuggestion>, StoreError> {
    let filter = ListingFilter {
        role: Some(role),
        subject: None,
    };
    let mut prices: Vec<f64> = store
        .list_listings(&filter, usize::MAX, 0)?
        .iter()
        .filter(|l| shares_subject(l, subjects))
        .filter_map(Listing::reference_price)
        .filter(|p| p.is_finite())
        .collect();

    if prices.is_empty() {
        return Ok(None);
    }
    prices.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let n = prices.len();
    let median = if n % 2 == 1 {
        prices[n / 2]
    } else {
        (prices[n / 2 - 1] + prices[n / 2]) / 2.0
    };
    let mean = prices.iter().sum::<f64>() / n as f64;

    Ok(Some(PriceSuggestion {
        sample_size: n,
        min: prices[0],
        max: prices[n - 1],
        median: round_to(median, 2),
        mean: round_to(mean, 2),
    }))
}

fn shares_subject(listing: &Listing, subjects: &[String]) -> bool {
    listing
        .subject_names()
        .any(|name| subjects.iter().any(|s| s == name))
}
