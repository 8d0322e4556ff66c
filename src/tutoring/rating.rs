//! Denormalized rating aggregates.
//!
//! A user's `reviewCount`/`totalRating` pair is recomputed from their review
//! references and copied onto every listing they own. Review fetch failures are
//! collected rather than aborting the recompute, so one broken review never
//! blocks the rest of the aggregate.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::store::operations::listings::AggregateWrite;
use crate::store::{Store, StoreError};

pub const MIN_RATING: f64 = 1.0;
pub const MAX_RATING: f64 = 5.0;

/// A validated review score in `[1, 5]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Rating(f64);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RatingError {
    #[error("rating is not a number: {0:?}")]
    NotNumeric(String),
    #[error("rating {0} is outside 1-5")]
    OutOfRange(f64),
}

impl Rating {
    pub fn parse(raw: &str) -> Result<Self, RatingError> {
        let value = parse_rating_value(raw).ok_or_else(|| RatingError::NotNumeric(raw.to_string()))?;
        if !(MIN_RATING..=MAX_RATING).contains(&value) {
            return Err(RatingError::OutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lenient numeric parse used for stored ratings; `None` for anything that is
/// not a finite number.
pub fn parse_rating_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// A single document that could not be read during aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("failed to fetch {entity} {key}: {reason}")]
pub struct FetchFailure {
    pub entity: &'static str,
    pub key: String,
    pub reason: String,
}

impl FetchFailure {
    fn new(entity: &'static str, key: &str, reason: impl ToString) -> Self {
        Self {
            entity,
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub review_count: u64,
    pub total_rating: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FetchFailure>,
}

impl RatingSummary {
    pub fn average(&self) -> f64 {
        if self.review_count == 0 {
            0.0
        } else {
            self.total_rating / self.review_count as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutReport {
    pub updated: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FetchFailure>,
}

impl FanOutReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct RatingAggregator {
    store: Arc<Store>,
}

impl RatingAggregator {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Recompute the aggregate for `user_id`.
    ///
    /// `review_count` is the number of review references; `total_rating` sums only
    /// ratings that parse as numbers. Reviews that cannot be loaded are reported in
    /// `failures` and still counted.
    pub fn aggregate(&self, user_id: &str) -> Result<RatingSummary, FetchFailure> {
        let user = match self.store.get_user_by_id(user_id) {
            Ok(Some(user)) => user,
            Ok(None) => return Err(FetchFailure::new("user", user_id, "not found")),
            Err(e) => return Err(FetchFailure::new("user", user_id, e)),
        };

        let mut total_rating = 0.0;
        let mut failures = Vec::new();
        for review_id in &user.review_ids {
            match self.store.get_review(review_id) {
                Ok(Some(review)) => match parse_rating_value(&review.ratings) {
                    Some(value) => total_rating += value,
                    None => tracing::debug!(
                        review_id = %review_id,
                        ratings = %review.ratings,
                        "Unparsable rating excluded from total"
                    ),
                },
                Ok(None) => failures.push(FetchFailure::new("review", review_id, "not found")),
                Err(e) => failures.push(FetchFailure::new("review", review_id, e)),
            }
        }

        if !failures.is_empty() {
            tracing::warn!(
                user_id,
                failed = failures.len(),
                "Some reviews could not be fetched while aggregating ratings"
            );
        }

        Ok(RatingSummary {
            review_count: user.review_ids.len() as u64,
            total_rating,
            failures,
        })
    }

    /// Write `summary` onto the user document and every listing the user owns.
    ///
    /// Listing updates are applied in one transaction; listings deleted meanwhile
    /// are skipped, and listings that cannot be read are skipped and reported.
    pub fn propagate(
        &self,
        user_id: &str,
        summary: &RatingSummary,
    ) -> Result<FanOutReport, StoreError> {
        self.store.modify_user(user_id, |user| {
            user.review_count = summary.review_count;
            user.total_rating = summary.total_rating;
        })?;

        let listing_ids = self.store.listing_ids_for_user(user_id)?;
        let outcomes = self.store.write_listing_aggregates(
            user_id,
            &listing_ids,
            summary.review_count,
            summary.total_rating,
        )?;

        let mut report = FanOutReport::default();
        for (listing_id, outcome) in outcomes {
            match outcome {
                AggregateWrite::Updated => report.updated.push(listing_id),
                AggregateWrite::Deleted => {
                    tracing::debug!(user_id, listing_id = %listing_id, "Listing deleted during fan-out")
                }
                AggregateWrite::Missing => report
                    .failed
                    .push(FetchFailure::new("listing", &listing_id, "not found")),
                AggregateWrite::Unreadable(reason) => report
                    .failed
                    .push(FetchFailure::new("listing", &listing_id, reason)),
            }
        }

        if !report.is_complete() {
            tracing::warn!(
                user_id,
                updated = report.updated.len(),
                failed = report.failed.len(),
                "Rating fan-out left some listings stale"
            );
        } else {
            tracing::debug!(user_id, updated = report.updated.len(), "Rating fan-out complete");
        }
        Ok(report)
    }

    /// Aggregate then propagate.
    pub fn refresh(&self, user_id: &str) -> Result<(RatingSummary, FanOutReport), RefreshError> {
        let summary = self.aggregate(user_id)?;
        let report = self.propagate(user_id, &summary)?;
        Ok((summary, report))
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchFailure),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::tempdir;

    use super::*;
    use crate::store::keys;
    use crate::store::operations::listings::Listing;
    use crate::store::operations::reviews::Review;
    use crate::store::operations::users::{Role, User};

    fn open_store(name: &str) -> (tempfile::TempDir, Arc<Store>) {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join(name).to_str().unwrap()).unwrap());
        (dir, store)
    }

    fn seed_reviews(store: &Store, user_id: &str, ratings: &[&str]) -> Vec<String> {
        ratings
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let review = Review {
                    id: format!("{user_id}-r{i}"),
                    tutee_name: "Bob".to_string(),
                    tutee_id: "tutee".to_string(),
                    tutor_id: user_id.to_string(),
                    review_text: String::new(),
                    ratings: r.to_string(),
                    payment_id: format!("{user_id}-p{i}"),
                    created_at: Utc::now(),
                };
                Store::put_doc(&store.reviews, &keys::review_key(&review.id), &review).unwrap();
                review.id
            })
            .collect()
    }

    fn listing(id: &str, user_id: &str) -> Listing {
        let now = Utc::now();
        Listing {
            id: id.to_string(),
            user_id: user_id.to_string(),
            role: Role::Tutor,
            name: "Alice".to_string(),
            subjects: "Math".to_string(),
            price: Some(30.0),
            start_price: None,
            end_price: None,
            negotiable: true,
            education: String::new(),
            description: String::new(),
            review_count: 0,
            total_rating: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn rating_parse_enforces_range() {
        assert_eq!(Rating::parse("4").unwrap().value(), 4.0);
        assert_eq!(Rating::parse(" 4.5 ").unwrap().value(), 4.5);
        assert!(matches!(Rating::parse("abc"), Err(RatingError::NotNumeric(_))));
        assert!(matches!(Rating::parse("0"), Err(RatingError::OutOfRange(_))));
        assert!(matches!(Rating::parse("6"), Err(RatingError::OutOfRange(_))));
        assert!(matches!(Rating::parse("NaN"), Err(RatingError::NotNumeric(_))));
    }

    #[test]
    fn unparsable_ratings_count_but_do_not_sum() {
        let (_dir, store) = open_store("agg_mixed");
        let mut user = User::new("tutor", Role::Tutor, "Alice");
        user.review_ids = seed_reviews(&store, "tutor", &["5", "4", "abc", "3"]);
        store.create_user(&user).unwrap();

        let summary = RatingAggregator::new(store).aggregate("tutor").unwrap();
        assert_eq!(summary.review_count, 4);
        assert_eq!(summary.total_rating, 12.0);
        assert!(summary.failures.is_empty());
        assert_eq!(summary.average(), 3.0);
    }

    #[test]
    fn missing_review_is_reported_and_aggregation_continues() {
        let (_dir, store) = open_store("agg_missing");
        let mut user = User::new("tutor", Role::Tutor, "Alice");
        user.review_ids = seed_reviews(&store, "tutor", &["5", "2"]);
        user.review_ids.insert(1, "ghost".to_string());
        store.create_user(&user).unwrap();

        let summary = RatingAggregator::new(store).aggregate("tutor").unwrap();
        assert_eq!(summary.review_count, 3);
        assert_eq!(summary.total_rating, 7.0);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].entity, "review");
        assert_eq!(summary.failures[0].key, "ghost");
    }

    #[test]
    fn missing_user_is_a_fetch_failure() {
        let (_dir, store) = open_store("agg_no_user");
        let err = RatingAggregator::new(store).aggregate("nobody").unwrap_err();
        assert_eq!(err.entity, "user");
    }

    #[test]
    fn refresh_updates_user_and_every_owned_listing() {
        let (_dir, store) = open_store("agg_refresh");
        let mut user = User::new("tutor", Role::Tutor, "Alice");
        user.review_ids = seed_reviews(&store, "tutor", &["5", "3"]);
        store.create_user(&user).unwrap();
        store.create_user(&User::new("other", Role::Tutor, "Carol")).unwrap();

        store.create_listing(&listing("l1", "tutor")).unwrap();
        store.create_listing(&listing("l2", "tutor")).unwrap();
        store.create_listing(&listing("l3", "other")).unwrap();

        let aggregator = RatingAggregator::new(store.clone());
        let (summary, report) = aggregator.refresh("tutor").unwrap();
        assert_eq!(summary.review_count, 2);
        assert!(report.is_complete());
        assert_eq!(report.updated.len(), 2);

        for id in ["l1", "l2"] {
            let l = store.get_listing(id).unwrap().unwrap();
            assert_eq!(l.review_count, 2);
            assert_eq!(l.total_rating, 8.0);
        }
        let untouched = store.get_listing("l3").unwrap().unwrap();
        assert_eq!(untouched.review_count, 0);

        let stored_user = store.require_user("tutor").unwrap();
        assert_eq!(stored_user.review_count, 2);
        assert_eq!(stored_user.total_rating, 8.0);
    }

    #[test]
    fn fan_out_reports_dangling_listing_and_updates_the_rest() {
        let (_dir, store) = open_store("agg_dangling");
        let mut user = User::new("tutor", Role::Tutor, "Alice");
        user.review_ids = seed_reviews(&store, "tutor", &["4"]);
        store.create_user(&user).unwrap();
        store.create_listing(&listing("l1", "tutor")).unwrap();
        store
            .listings_by_owner
            .insert(keys::listing_owner_index_key("tutor", "gone").as_bytes(), &[] as &[u8])
            .unwrap();

        let (_, report) = RatingAggregator::new(store.clone()).refresh("tutor").unwrap();
        assert_eq!(report.updated, vec!["l1".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key, "gone");
        assert_eq!(store.get_listing("l1").unwrap().unwrap().total_rating, 4.0);
    }

    #[test]
    fn concurrent_refresh_never_restores_deleted_listings() {
        let (_dir, store) = open_store("agg_delete_race");
        let mut user = User::new("tutor", Role::Tutor, "Alice");
        user.review_ids = seed_reviews(&store, "tutor", &["5"]);
        store.create_user(&user).unwrap();
        let aggregator = RatingAggregator::new(store.clone());

        for round in 0..100 {
            let doomed = listing(&format!("l{round}"), "tutor");
            store.create_listing(&doomed).unwrap();

            let refresher = {
                let aggregator = aggregator.clone();
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        aggregator.refresh("tutor").unwrap();
                    }
                })
            };
            store.delete_listing(&doomed).unwrap();
            refresher.join().unwrap();

            assert!(
                store.get_listing(&doomed.id).unwrap().is_none(),
                "listing {} came back after delete",
                doomed.id
            );
        }
    }
}

