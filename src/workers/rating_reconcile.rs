use crate::events::ListingEvents;
use crate::store::Store;
use crate::tutoring::rating::RatingAggregator;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub owners: usize,
    pub refreshed: usize,
    pub failed: usize,
    pub listings_updated: usize,
}

/// Re-run the rating refresh for every user that owns a listing, repairing
/// listings left stale by an earlier failed fan-out.
pub async fn run(store: &Store, aggregator: &RatingAggregator, events: &ListingEvents) -> ReconcileReport {
    let owners = match store.listing_owner_ids() {
        Ok(owners) => owners,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to list listing owners");
            return ReconcileReport::default();
        }
    };

    let mut report = ReconcileReport {
        owners: owners.len(),
        ..ReconcileReport::default()
    };

    for owner in &owners {
        match aggregator.refresh(owner) {
            Ok((_, fan_out)) => {
                report.refreshed += 1;
                report.listings_updated += fan_out.updated.len();
                events.publish_updates(&fan_out.updated, owner);
                if !fan_out.is_complete() {
                    report.failed += 1;
                }
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(user_id = %owner, error = %e, "Rating reconcile failed for owner");
            }
        }
        tokio::task::yield_now().await;
    }

    tracing::info!(
        owners = report.owners,
        refreshed = report.refreshed,
        failed = report.failed,
        listings = report.listings_updated,
        "Rating reconcile finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::store::operations::listings::Listing;
    use crate::store::operations::reviews::Review;
    use crate::store::operations::users::{Role, User};

    fn listing(id: &str, owner: &str) -> Listing {
        let now = Utc::now();
        Listing {
            id: id.to_string(),
            user_id: owner.to_string(),
            role: Role::Tutor,
            name: "Alice".to_string(),
            subjects: "Math".to_string(),
            price: Some(40.0),
            start_price: None,
            end_price: None,
            negotiable: false,
            education: String::new(),
            description: String::new(),
            review_count: 0,
            total_rating: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn stale_listing_aggregates_are_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("reconcile").to_str().unwrap()).unwrap());

        store.create_user(&User::new("t1", Role::Tutor, "Alice")).unwrap();
        store.create_user(&User::new("s1", Role::Tutee, "Bob")).unwrap();
        for (id, score) in [("r1", "5"), ("r2", "3")] {
            store
                .create_review(&Review {
                    id: id.to_string(),
                    tutee_name: "Bob".to_string(),
                    tutee_id: "s1".to_string(),
                    tutor_id: "t1".to_string(),
                    review_text: String::new(),
                    ratings: score.to_string(),
                    payment_id: format!("p-{id}"),
                    created_at: Utc::now(),
                })
                .unwrap();
        }
        store.create_listing(&listing("l1", "t1")).unwrap();
        store.create_listing(&listing("l2", "t1")).unwrap();

        let aggregator = RatingAggregator::new(store.clone());
        let events = ListingEvents::default();
        let mut rx = events.subscribe();

        let report = run(&store, &aggregator, &events).await;
        assert_eq!(report.owners, 1);
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.listings_updated, 2);
        assert_eq!(report.failed, 0);

        for id in ["l1", "l2"] {
            let l = store.get_listing(id).unwrap().unwrap();
            assert_eq!(l.review_count, 2);
            assert_eq!(l.total_rating, 8.0);
        }
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn missing_owner_profile_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("reconcile_orphan").to_str().unwrap()).unwrap());
        store.create_listing(&listing("l1", "ghost")).unwrap();

        let aggregator = RatingAggregator::new(store.clone());
        let report = run(&store, &aggregator, &ListingEvents::default()).await;
        assert_eq!(report.owners, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.refreshed, 0);
    }
}
