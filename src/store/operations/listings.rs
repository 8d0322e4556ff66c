use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::users::Role;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub user_id: String,
    pub role: Role,
    pub name: String,
    /// Comma-joined canonical subject names.
    pub subjects: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub start_price: Option<f64>,
    #[serde(default)]
    pub end_price: Option<f64>,
    #[serde(default)]
    pub negotiable: bool,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub review_count: u64,
    #[serde(default)]
    pub total_rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn subject_names(&self) -> impl Iterator<Item = &str> {
        self.subjects
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Midpoint of the advertised price, used when suggesting prices.
    pub fn reference_price(&self) -> Option<f64> {
        match (self.price, self.start_price, self.end_price) {
            (Some(p), _, _) => Some(p),
            (None, Some(lo), Some(hi)) => Some((lo + hi) / 2.0),
            (None, Some(lo), None) => Some(lo),
            (None, None, Some(hi)) => Some(hi),
            (None, None, None) => None,
        }
    }
}

/// Result of writing an aggregate onto one listing.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateWrite {
    Updated,
    /// The owner index entry is gone; the listing was deleted meanwhile.
    Deleted,
    /// Indexed but the document is absent.
    Missing,
    Unreadable(String),
}

#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    pub role: Option<Role>,
    pub subject: Option<String>,
}

impl ListingFilter {
    fn matches(&self, listing: &Listing) -> bool {
        if let Some(role) = self.role {
            if listing.role != role {
                return false;
            }
        }
        if let Some(subject) = &self.subject {
            if !listing.subject_names().any(|s| s == subject) {
                return false;
            }
        }
        true
    }
}

impl Store {
    /// Insert a listing together with its owner index entry.
    pub fn create_listing(&self, listing: &Listing) -> Result<(), StoreError> {
        let key = keys::listing_key(&listing.id);
        let index_key = keys::listing_owner_index_key(&listing.user_id, &listing.id);
        let bytes = Self::serialize(listing)?;

        (&self.listings, &self.listings_by_owner)
            .transaction(|(listings, owners)| {
                listings.insert(key.as_bytes(), bytes.as_slice())?;
                owners.insert(index_key.as_bytes(), &[] as &[u8])?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError<()>| match e {
                sled::transaction::TransactionError::Abort(()) => StoreError::Conflict {
                    entity: "listing".to_string(),
                    key: listing.id.clone(),
                },
                sled::transaction::TransactionError::Storage(se) => StoreError::Sled(se),
            })?;
        Ok(())
    }

    pub fn get_listing(&self, listing_id: &str) -> Result<Option<Listing>, StoreError> {
        Self::get_doc(&self.listings, &keys::listing_key(listing_id))
    }

    pub fn delete_listing(&self, listing: &Listing) -> Result<(), StoreError> {
        let key = keys::listing_key(&listing.id);
        let index_key = keys::listing_owner_index_key(&listing.user_id, &listing.id);

        (&self.listings, &self.listings_by_owner)
            .transaction(|(listings, owners)| {
                listings.remove(key.as_bytes())?;
                owners.remove(index_key.as_bytes())?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError<()>| match e {
                sled::transaction::TransactionError::Abort(()) => StoreError::Conflict {
                    entity: "listing".to_string(),
                    key: listing.id.clone(),
                },
                sled::transaction::TransactionError::Storage(se) => StoreError::Sled(se),
            })?;
        Ok(())
    }

    /// Copy a rating aggregate onto the given listings of `user_id` in one
    /// transaction. A listing is written only while its owner index entry still
    /// exists, so a concurrent delete is never undone.
    pub fn write_listing_aggregates(
        &self,
        user_id: &str,
        listing_ids: &[String],
        review_count: u64,
        total_rating: f64,
    ) -> Result<Vec<(String, AggregateWrite)>, StoreError> {
        let now = Utc::now();
        (&self.listings, &self.listings_by_owner)
            .transaction(|(listings, owners)| {
                let mut outcomes = Vec::with_capacity(listing_ids.len());
                for listing_id in listing_ids {
                    let index_key = keys::listing_owner_index_key(user_id, listing_id);
                    if owners.get(index_key.as_bytes())?.is_none() {
                        outcomes.push((listing_id.clone(), AggregateWrite::Deleted));
                        continue;
                    }
                    let key = keys::listing_key(listing_id);
                    let Some(raw) = listings.get(key.as_bytes())? else {
                        outcomes.push((listing_id.clone(), AggregateWrite::Missing));
                        continue;
                    };
                    let mut listing: Listing = match Self::deserialize(&raw) {
                        Ok(listing) => listing,
                        Err(e) => {
                            outcomes.push((listing_id.clone(), AggregateWrite::Unreadable(e.to_string())));
                            continue;
                        }
                    };
                    listing.review_count = review_count;
                    listing.total_rating = total_rating;
                    listing.updated_at = now;
                    let bytes = Self::serialize(&listing)
                        .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                    listings.insert(key.as_bytes(), bytes)?;
                    outcomes.push((listing_id.clone(), AggregateWrite::Updated));
                }
                Ok(outcomes)
            })
            .map_err(|e: sled::transaction::TransactionError<StoreError>| match e {
                sled::transaction::TransactionError::Abort(inner) => inner,
                sled::transaction::TransactionError::Storage(se) => StoreError::Sled(se),
            })
    }

    /// Ids of every listing owned by `user_id`, read from the owner index.
    pub fn listing_ids_for_user(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let prefix = keys::listing_owner_prefix(user_id);
        let mut ids = Vec::new();
        for item in self.listings_by_owner.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            if let Some(id) = keys::listing_id_from_owner_key(&k) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    pub fn list_user_listings(&self, user_id: &str) -> Result<Vec<Listing>, StoreError> {
        let mut listings = Vec::new();
        for id in self.listing_ids_for_user(user_id)? {
            match self.get_listing(&id)? {
                Some(listing) => listings.push(listing),
                None => tracing::warn!(listing_id = %id, user_id, "Dangling listing owner index entry"),
            }
        }
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listings)
    }

    pub fn list_listings(
        &self,
        filter: &ListingFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Listing>, StoreError> {
        let mut listings = Vec::new();
        for item in self.listings.iter() {
            let (_, v) = item?;
            let listing: Listing = Self::deserialize(&v)?;
            if filter.matches(&listing) {
                listings.push(listing);
            }
        }
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listings.into_iter().skip(offset).take(limit).collect())
    }

    /// Distinct owners across all listings.
    pub fn listing_owner_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut owners: Vec<String> = Vec::new();
        for item in self.listings_by_owner.iter() {
            let (k, _) = item?;
            let Some(sep) = k.iter().position(|b| *b == b':') else {
                continue;
            };
            let Ok(owner) = std::str::from_utf8(&k[..sep]) else {
                continue;
            };
            if owners.last().map(String::as_str) != Some(owner) {
                owners.push(owner.to_string());
            }
        }
        Ok(owners)
    }

    pub fn rebuild_listing_owner_index(&self) -> Result<u64, StoreError> {
        self.listings_by_owner.clear()?;
        let mut count = 0u64;
        for item in self.listings.iter() {
            let (_, v) = item?;
            let listing: Listing = Self::deserialize(&v)?;
            let index_key = keys::listing_owner_index_key(&listing.user_id, &listing.id);
            self.listings_by_owner.insert(index_key.as_bytes(), &[] as &[u8])?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn sample_listing(id: &str, user_id: &str, subjects: &str) -> Listing {
        let now = Utc::now();
        Listing {
            id: id.to_string(),
            user_id: user_id.to_string(),
            role: Role::Tutor,
            name: "Alice".to_string(),
            subjects: subjects.to_string(),
            price: Some(40.0),
            start_price: None,
            end_price: None,
            negotiable: false,
            education: "University".to_string(),
            description: String::new(),
            review_count: 0,
            total_rating: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owner_index_tracks_create_and_delete() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("listings").to_str().unwrap()).unwrap();

        let a = sample_listing("l1", "u1", "Math");
        let b = sample_listing("l2", "u1", "Physics");
        let c = sample_listing("l3", "u2", "Math");
        for l in [&a, &b, &c] {
            store.create_listing(l).unwrap();
        }

        let mut ids = store.listing_ids_for_user("u1").unwrap();
        ids.sort();
        assert_eq!(ids, vec!["l1".to_string(), "l2".to_string()]);
        assert_eq!(store.listing_owner_ids().unwrap(), vec!["u1", "u2"]);

        store.delete_listing(&a).unwrap();
        assert_eq!(store.listing_ids_for_user("u1").unwrap(), vec!["l2".to_string()]);
        assert!(store.get_listing("l1").unwrap().is_none());
    }

    #[test]
    fn filter_by_subject_uses_canonical_names() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("filter").to_str().unwrap()).unwrap();
        store.create_listing(&sample_listing("l1", "u1", "Math, Physics")).unwrap();
        store.create_listing(&sample_listing("l2", "u2", "Chemistry")).unwrap();

        let filter = ListingFilter {
            role: Some(Role::Tutor),
            subject: Some("Physics".to_string()),
        };
        let found = store.list_listings(&filter, 10, 0).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "l1");
    }

    #[test]
    fn reference_price_prefers_fixed_price() {
        let mut listing = sample_listing("l1", "u1", "Math");
        assert_eq!(listing.reference_price(), Some(40.0));

        listing.price = None;
        listing.start_price = Some(30.0);
        listing.end_price = Some(50.0);
        assert_eq!(listing.reference_price(), Some(40.0));
    }

    #[test]
    fn rebuild_index_restores_entries() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("rebuild").to_str().unwrap()).unwrap();
        store.create_listing(&sample_listing("l1", "u1", "Math")).unwrap();
        store.listings_by_owner.clear().unwrap();
        assert!(store.listing_ids_for_user("u1").unwrap().is_empty());

        assert_eq!(store.rebuild_listing_owner_index().unwrap(), 1);
        assert_eq!(store.listing_ids_for_user("u1").unwrap(), vec!["l1".to_string()]);
    }

    #[test]
    fn aggregate_write_skips_deleted_listings() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("agg_write").to_str().unwrap()).unwrap();
        let kept = sample_listing("l1", "u1", "Math");
        let removed = sample_listing("l2", "u1", "Math");
        store.create_listing(&kept).unwrap();
        store.create_listing(&removed).unwrap();

        let ids = store.listing_ids_for_user("u1").unwrap();
        store.delete_listing(&removed).unwrap();

        let outcomes = store.write_listing_aggregates("u1", &ids, 3, 12.0).unwrap();
        assert_eq!(
            outcomes,
            vec![
                ("l1".to_string(), AggregateWrite::Updated),
                ("l2".to_string(), AggregateWrite::Deleted),
            ]
        );
        assert!(store.get_listing("l2").unwrap().is_none());
        let updated = store.get_listing("l1").unwrap().unwrap();
        assert_eq!(updated.review_count, 3);
        assert_eq!(updated.total_rating, 12.0);
    }
}
